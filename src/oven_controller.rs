use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use crate::config::{OvenConfig, TimeBase};
use crate::error::{ActuatorError, ConfigError, OvenError};
use crate::heater::Heater;
use crate::inputs::{DoorSensor, NoDoorSensor};
use crate::outputs::{NullOutput, Output};
use crate::pid::PidController;
use crate::profile::Profile;
use crate::{OvenShared, OvenState, ResetReason, RunMode};

/// The actuators and door switch of one oven.
pub struct OvenIo<H, C, A, D> {
    pub heat: H,
    pub cool: C,
    pub air: A,
    pub door: D,
}

impl OvenIo<NullOutput, NullOutput, NullOutput, NoDoorSensor> {
    /// No hardware: every output is accepted and dropped, the door is unknown.
    pub fn simulated() -> Self {
        Self {
            heat: NullOutput,
            cool: NullOutput,
            air: NullOutput,
            door: NoDoorSensor,
        }
    }
}

pub type SimulatedOven<'a, Dl> =
    OvenController<'a, NullOutput, NullOutput, NullOutput, NoDoorSensor, Dl>;

/// The control task of one oven.
///
/// Each tick reads the shared temperature once, evaluates the profile, runs
/// the PID and drives the outputs. Heater duty-cycling is awaited inside the
/// tick, so a tick is never cut short; `abort` lands on the next tick.
pub struct OvenController<'a, H, C, A, D, Dl> {
    config: OvenConfig,
    shared: &'a OvenShared,
    heater: Heater<H>,
    cool: C,
    air: A,
    door: D,
    delay: Dl,
    pid: PidController,
    profile: Option<Profile>,
    state: OvenState,
    start_time: Instant,
    /// Ticks since the run started (simulated time base).
    ticks: u32,
    /// Consecutive heating ticks without any temperature change.
    stall_ticks: u32,
    last_temperature: f32,
}

impl<'a, H, C, A, D, Dl> OvenController<'a, H, C, A, D, Dl>
where
    H: Output,
    C: Output,
    A: Output,
    D: DoorSensor,
    Dl: DelayNs,
{
    pub fn new(
        config: OvenConfig,
        shared: &'a OvenShared,
        io: OvenIo<H, C, A, D>,
        delay: Dl,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut controller = Self {
            pid: PidController::from_config(&config),
            config,
            shared,
            heater: Heater::new(io.heat),
            cool: io.cool,
            air: io.air,
            door: io.door,
            delay,
            profile: None,
            state: OvenState::idle(),
            start_time: Instant::from_ticks(0),
            ticks: 0,
            stall_ticks: 0,
            last_temperature: 0.0,
        };
        controller.state.measured_temperature = shared.temperature.get();
        controller.reset(None);
        Ok(controller)
    }

    pub fn config(&self) -> &OvenConfig {
        &self.config
    }

    pub fn get_state(&self) -> OvenState {
        self.state
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Start a run. Refused while a run is active.
    pub fn submit_profile(&mut self, profile: Profile) -> Result<(), OvenError> {
        if self.state.run_mode == RunMode::Running {
            warn!(
                "Cannot start {}: profile {} is running",
                profile.name(),
                self.profile.as_ref().map_or("?", |p| p.name())
            );
            return Err(OvenError::AlreadyRunning);
        }

        info!("Running profile {}", profile.name());
        self.pid = PidController::from_config(&self.config);
        self.pid.set_ki_threshold(profile.ki_threshold());
        self.state.total_time = profile.duration();
        self.state.runtime = 0.0;
        self.state.target_temperature = 0.0;
        self.state.run_mode = RunMode::Running;
        self.start_time = Instant::now();
        self.ticks = 0;
        self.stall_ticks = 0;
        self.last_temperature = self.shared.temperature.get();
        self.profile = Some(profile);
        self.shared.publish(self.state);
        info!("Starting");
        Ok(())
    }

    /// Stop the run, if any. An abort while idle still forces every output off
    /// but keeps the reason of the last real stop.
    pub fn abort(&mut self) {
        let reason = if self.state.run_mode == RunMode::Running {
            info!("Aborting run at {}s", self.state.runtime);
            Some(ResetReason::Aborted)
        } else {
            None
        };
        self.reset(reason);
    }

    /// One control cycle. Returns how long to sleep before the next one.
    pub async fn tick(&mut self) -> Duration {
        self.handle_requests();

        let measured = self.shared.temperature.get();
        self.state.measured_temperature = measured;
        self.state.door_state = self.door.read();

        let pause = match self.state.run_mode {
            RunMode::Running => self.running(measured).await,
            RunMode::Idle => self.config.tick(),
        };

        self.shared.publish(self.state);
        pause
    }

    /// Tick forever. Never returns; the task lives as long as the executor.
    pub async fn run(&mut self) -> ! {
        info!("Starting oven controller");
        loop {
            let pause = self.tick().await;
            crate::sleep(&mut self.delay, pause).await;
        }
    }

    fn handle_requests(&mut self) {
        if self.shared.take_abort_request() {
            while let Some(pending) = self.shared.take_submitted() {
                warn!("Discarding profile {} submitted before abort", pending.name());
            }
            self.abort();
        }
        if let Some(profile) = self.shared.take_submitted() {
            if let Err(e) = self.submit_profile(profile) {
                warn!("Submitted profile rejected: {}", e);
            }
        }
    }

    async fn running(&mut self, measured: f32) -> Duration {
        let tick = self.config.tick();

        let now = self.advance_runtime();
        let lookahead = self.state.runtime + self.config.previsioning;

        let target = match &self.profile {
            Some(profile) => profile.target_temperature(lookahead),
            None => {
                error!("Running without a profile");
                self.reset(Some(ResetReason::Aborted));
                return tick;
            }
        };
        self.state.target_temperature = target;

        let drive = self.pid.compute(target, measured, now);

        info!(
            "running at {} deg C (Target: {}), pid {}, cool {}, air {}, door {:?} ({}s/{})",
            measured,
            target,
            drive,
            self.state.cool_level,
            self.state.air_level,
            self.state.door_state,
            self.state.runtime,
            self.state.total_time
        );

        if let Err(e) = self.set_cool(drive <= -1.0) {
            self.actuator_fault(e);
            return tick;
        }

        // Heat on but the reading does not move at all: the sensor is gone.
        if drive > 0.0 {
            if measured.to_bits() == self.last_temperature.to_bits() {
                self.stall_ticks += 1;
            } else {
                self.stall_ticks = 0;
            }
            if self.stall_ticks > self.config.stall_tick_limit {
                error!("Error reading sensor, oven temp not responding to heat.");
                self.reset(Some(ResetReason::StallDetected));
                return tick;
            }
        } else {
            self.stall_ticks = 0;
        }
        self.last_temperature = measured;

        self.state.heat_level = if drive > 0.0 { drive } else { 0.0 };
        // The simulator reads the heat level while the pulse runs.
        self.shared.publish(self.state);
        if let Err(e) = self.heater.pulse(drive, tick, &mut self.delay).await {
            error!("Heater output failed: {:?}", e);
            self.actuator_fault(ActuatorError::Heat);
            return tick;
        }

        let air = if measured > self.config.air_off_above {
            Some(false)
        } else if measured < self.config.air_on_below {
            Some(true)
        } else {
            None
        };
        if let Some(on) = air {
            if let Err(e) = self.set_air(on) {
                self.actuator_fault(e);
                return tick;
            }
        }

        if lookahead >= self.state.total_time {
            info!("Profile complete after {}s", self.state.runtime);
            self.reset(Some(ResetReason::Completed));
        }

        if drive > 0.0 {
            Duration::from_micros((tick.as_micros() as f32 * (1.0 - drive)) as u64)
        } else {
            tick
        }
    }

    /// Move the run clock forward and return the instant the PID should see.
    fn advance_runtime(&mut self) -> Instant {
        match self.config.time_base {
            TimeBase::Simulated => {
                self.ticks += 1;
                self.state.runtime = self.ticks as f32 * self.config.tick_secs();
                self.start_time + self.config.tick() * self.ticks
            }
            TimeBase::WallClock => {
                let now = Instant::now();
                self.state.runtime =
                    now.saturating_duration_since(self.start_time).as_micros() as f32 / 1_000_000.0;
                now
            }
        }
    }

    fn set_cool(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.cool.set(on).map_err(|e| {
            error!("Cooling output failed: {:?}", e);
            ActuatorError::Cool
        })?;
        self.state.cool_level = if on { 1.0 } else { 0.0 };
        Ok(())
    }

    fn set_air(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.air.set(on).map_err(|e| {
            error!("Air output failed: {:?}", e);
            ActuatorError::Air
        })?;
        self.state.air_level = if on { 1.0 } else { 0.0 };
        Ok(())
    }

    fn actuator_fault(&mut self, e: ActuatorError) {
        error!("Stopping run: {}", e);
        self.reset(Some(ResetReason::ActuatorFault));
    }

    /// Back to idle: no profile, everything off, fresh PID.
    fn reset(&mut self, reason: Option<ResetReason>) {
        self.profile = None;
        self.start_time = Instant::from_ticks(0);
        self.ticks = 0;
        self.stall_ticks = 0;
        self.state.runtime = 0.0;
        self.state.total_time = 0.0;
        self.state.target_temperature = 0.0;
        self.state.door_state = self.door.read();
        self.state.run_mode = RunMode::Idle;

        // Outputs are forced off even if one of them fails.
        let _ = self.heater.off();
        if let Err(e) = self.cool.set(false) {
            error!("Cooling output failed during reset: {:?}", e);
        }
        if let Err(e) = self.air.set(false) {
            error!("Air output failed during reset: {:?}", e);
        }
        self.state.heat_level = 0.0;
        self.state.cool_level = 0.0;
        self.state.air_level = 0.0;

        self.pid = PidController::from_config(&self.config);
        if reason.is_some() {
            self.state.last_reset_reason = reason;
        }
        self.shared.publish(self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Point;
    use crate::DoorState;
    use embassy_futures::block_on;

    struct NoDelay;

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    #[derive(Default)]
    struct CountingDelay {
        total_us: u64,
    }

    impl DelayNs for CountingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_us += ns as u64 / 1000;
        }

        async fn delay_us(&mut self, us: u32) {
            self.total_us += us as u64;
        }
    }

    struct BrokenOutput;

    impl Output for BrokenOutput {
        type Error = ();

        fn set(&mut self, _on: bool) -> Result<(), Self::Error> {
            Err(())
        }
    }

    fn test_config() -> OvenConfig {
        OvenConfig {
            kp: 0.1,
            ki: 0.0,
            kd: 0.0,
            ..OvenConfig::simulated()
        }
    }

    fn test_profile() -> Profile {
        Profile::new(
            "test",
            &[
                Point::new(0.0, 20.0),
                Point::new(60.0, 200.0),
                Point::new(120.0, 200.0),
                Point::new(180.0, 0.0),
            ],
            0.0,
        )
        .unwrap()
    }

    fn flat_profile(temperature: f32) -> Profile {
        Profile::new(
            "flat",
            &[Point::new(0.0, temperature), Point::new(3600.0, temperature)],
            0.0,
        )
        .unwrap()
    }

    fn controller(shared: &OvenShared, config: OvenConfig) -> SimulatedOven<'_, NoDelay> {
        OvenController::new(config, shared, OvenIo::simulated(), NoDelay).unwrap()
    }

    fn assert_idle_and_off(state: &OvenState) {
        assert_eq!(state.run_mode, RunMode::Idle);
        assert_eq!(state.heat_level, 0.0);
        assert_eq!(state.cool_level, 0.0);
        assert_eq!(state.air_level, 0.0);
        assert_eq!(state.runtime, 0.0);
        assert_eq!(state.target_temperature, 0.0);
    }

    #[test]
    fn test_starts_idle() {
        let shared = OvenShared::new();
        let oven = controller(&shared, test_config());
        assert_idle_and_off(&oven.get_state());
        assert_eq!(oven.get_state().door_state, DoorState::Unknown);
        assert_eq!(oven.get_state().last_reset_reason, None);
        assert!(oven.profile().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let shared = OvenShared::new();
        let config = OvenConfig {
            tick_millis: 0,
            ..test_config()
        };
        let result = OvenController::new(config, &shared, OvenIo::simulated(), NoDelay);
        assert!(matches!(result, Err(ConfigError::InvalidTick)));
    }

    #[test]
    fn test_submit_starts_run_and_rejects_second() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());

        oven.submit_profile(test_profile()).unwrap();
        let state = oven.get_state();
        assert_eq!(state.run_mode, RunMode::Running);
        assert_eq!(state.total_time, 180.0);
        assert_eq!(shared.state().run_mode, RunMode::Running);

        assert_eq!(
            oven.submit_profile(flat_profile(100.0)),
            Err(OvenError::AlreadyRunning)
        );
        assert_eq!(oven.profile().map(|p| p.name()), Some("test"));
    }

    #[test]
    fn test_schedule_scenario() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(test_profile()).unwrap();

        for i in 1..=360u32 {
            shared.temperature.set(100.0 + (i % 7) as f32);
            block_on(oven.tick());
            let state = oven.get_state();
            match i {
                60 => {
                    assert_eq!(state.runtime, 30.0);
                    assert!((state.target_temperature - 110.0).abs() < 1e-3);
                }
                300 => {
                    assert_eq!(state.runtime, 150.0);
                    assert!((state.target_temperature - 100.0).abs() < 1e-3);
                }
                359 => assert_eq!(state.run_mode, RunMode::Running),
                360 => {
                    assert_idle_and_off(&state);
                    assert_eq!(state.last_reset_reason, Some(ResetReason::Completed));
                }
                _ => {}
            }
        }
        assert_idle_and_off(&shared.state());
    }

    #[test]
    fn test_previsioning_shifts_schedule() {
        let shared = OvenShared::new();
        let config = OvenConfig {
            previsioning: 10.0,
            ..test_config()
        };
        let mut oven = controller(&shared, config);
        oven.submit_profile(test_profile()).unwrap();

        for i in 1..=40u32 {
            shared.temperature.set(50.0 + (i % 3) as f32);
            block_on(oven.tick());
        }
        // runtime 20 + 10 lookahead
        assert!((oven.get_state().target_temperature - 110.0).abs() < 1e-3);

        // Completes once runtime + 10 reaches 180.
        for i in 41..=340u32 {
            shared.temperature.set(50.0 + (i % 3) as f32);
            block_on(oven.tick());
        }
        assert_eq!(oven.get_state().run_mode, RunMode::Idle);
    }

    #[test]
    fn test_stall_resets_by_twenty_first_tick() {
        let shared = OvenShared::new();
        shared.temperature.set(20.0);
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(flat_profile(500.0)).unwrap();

        for _ in 0..20 {
            block_on(oven.tick());
            assert_eq!(oven.get_state().run_mode, RunMode::Running);
            assert!(oven.get_state().heat_level > 0.0);
        }
        block_on(oven.tick());
        let state = oven.get_state();
        assert_idle_and_off(&state);
        assert_eq!(state.last_reset_reason, Some(ResetReason::StallDetected));
    }

    #[test]
    fn test_stall_counter_cleared_by_movement() {
        let shared = OvenShared::new();
        shared.temperature.set(20.0);
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(flat_profile(500.0)).unwrap();

        for _ in 0..15 {
            block_on(oven.tick());
        }
        shared.temperature.set(20.5);
        for _ in 0..20 {
            block_on(oven.tick());
        }
        assert_eq!(oven.get_state().run_mode, RunMode::Running);
    }

    #[test]
    fn test_no_stall_while_not_heating() {
        let shared = OvenShared::new();
        shared.temperature.set(400.0);
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(flat_profile(100.0)).unwrap();

        for _ in 0..50 {
            block_on(oven.tick());
        }
        let state = oven.get_state();
        assert_eq!(state.run_mode, RunMode::Running);
        assert_eq!(state.heat_level, 0.0);
    }

    #[test]
    fn test_cooling_only_at_negative_saturation() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(flat_profile(100.0)).unwrap();

        // error -5 -> drive -0.5
        shared.temperature.set(105.0);
        block_on(oven.tick());
        assert_eq!(oven.get_state().cool_level, 0.0);

        // error -50 -> clamped to -1
        shared.temperature.set(150.0);
        block_on(oven.tick());
        assert_eq!(oven.get_state().cool_level, 1.0);

        shared.temperature.set(99.0);
        block_on(oven.tick());
        assert_eq!(oven.get_state().cool_level, 0.0);
    }

    #[test]
    fn test_air_dead_band() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(flat_profile(300.0)).unwrap();

        let steps = [
            (150.0, 1.0),
            (190.0, 1.0),
            (199.9, 1.0),
            (200.5, 0.0),
            (190.0, 0.0),
            (180.0, 0.0),
            (179.5, 1.0),
            (195.0, 1.0),
        ];
        for (temperature, air) in steps {
            shared.temperature.set(temperature);
            block_on(oven.tick());
            assert_eq!(oven.get_state().air_level, air, "at {temperature}");
        }
    }

    #[test]
    fn test_heat_duty_and_tick_shortening() {
        let shared = OvenShared::new();
        shared.temperature.set(95.0);
        let mut oven =
            OvenController::new(test_config(), &shared, OvenIo::simulated(), CountingDelay::default())
                .unwrap();
        oven.submit_profile(flat_profile(100.0)).unwrap();

        // error 5 -> drive 0.5 of a 500 ms tick
        let pause = block_on(oven.tick());
        assert_eq!(oven.get_state().heat_level, 0.5);
        assert_eq!(oven.delay.total_us, 250_000);
        assert_eq!(pause, Duration::from_millis(250));
    }

    #[test]
    fn test_full_tick_when_not_heating() {
        let shared = OvenShared::new();
        shared.temperature.set(120.0);
        let mut oven = controller(&shared, test_config());
        assert_eq!(block_on(oven.tick()), Duration::from_millis(500));
        oven.submit_profile(flat_profile(100.0)).unwrap();
        assert_eq!(block_on(oven.tick()), Duration::from_millis(500));
    }

    #[test]
    fn test_abort_returns_to_idle() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(test_profile()).unwrap();
        shared.temperature.set(30.0);
        block_on(oven.tick());

        oven.abort();
        let state = oven.get_state();
        assert_idle_and_off(&state);
        assert_eq!(state.last_reset_reason, Some(ResetReason::Aborted));
        assert!(oven.profile().is_none());

        // A new run can start afterwards.
        oven.submit_profile(test_profile()).unwrap();
    }

    #[test]
    fn test_handle_requests_are_picked_up_next_tick() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        let handle = shared.handle();

        handle.submit_profile(test_profile()).unwrap();
        assert_eq!(handle.get_state().run_mode, RunMode::Idle);
        assert_eq!(handle.submit_profile(test_profile()), Err(OvenError::Busy));

        shared.temperature.set(25.0);
        block_on(oven.tick());
        assert_eq!(handle.get_state().run_mode, RunMode::Running);
        assert_eq!(
            handle.submit_profile(test_profile()),
            Err(OvenError::AlreadyRunning)
        );

        handle.abort();
        block_on(oven.tick());
        let state = handle.get_state();
        assert_idle_and_off(&state);
        assert_eq!(state.last_reset_reason, Some(ResetReason::Aborted));
    }

    #[test]
    fn test_abort_discards_pending_submission() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        let handle = shared.handle();

        handle.submit_profile(test_profile()).unwrap();
        handle.abort();
        block_on(oven.tick());
        assert_eq!(handle.get_state().run_mode, RunMode::Idle);
    }

    #[test]
    fn test_submit_after_abort_is_refused_until_handled() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        let handle = shared.handle();

        handle.abort();
        assert_eq!(
            handle.submit_profile(test_profile()),
            Err(OvenError::AbortPending)
        );
        block_on(oven.tick());

        handle.submit_profile(test_profile()).unwrap();
        block_on(oven.tick());
        assert_eq!(handle.get_state().run_mode, RunMode::Running);
    }

    #[test]
    fn test_idle_abort_keeps_last_reason() {
        let shared = OvenShared::new();
        shared.temperature.set(20.0);
        let mut oven = controller(&shared, test_config());
        oven.submit_profile(flat_profile(500.0)).unwrap();
        for _ in 0..21 {
            block_on(oven.tick());
        }
        assert_eq!(
            shared.state().last_reset_reason,
            Some(ResetReason::StallDetected)
        );

        shared.handle().abort();
        block_on(oven.tick());
        let state = shared.state();
        assert_idle_and_off(&state);
        assert_eq!(state.last_reset_reason, Some(ResetReason::StallDetected));

        oven.abort();
        assert_eq!(
            oven.get_state().last_reset_reason,
            Some(ResetReason::StallDetected)
        );
    }

    #[test]
    fn test_idle_abort_on_fresh_oven_records_nothing() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        oven.abort();
        assert_eq!(oven.get_state().last_reset_reason, None);
    }

    #[test]
    fn test_wall_clock_run_completes() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, OvenConfig::default());
        assert_eq!(oven.config().time_base, TimeBase::WallClock);
        let profile = Profile::new(
            "short",
            &[Point::new(0.0, 100.0), Point::new(1.0, 100.0)],
            0.0,
        )
        .unwrap();
        oven.submit_profile(profile).unwrap();

        shared.temperature.set(50.0);
        block_on(oven.tick());
        let first = oven.get_state().runtime;
        assert!(first < 0.3, "runtime {first}");

        std::thread::sleep(std::time::Duration::from_millis(300));
        shared.temperature.set(51.0);
        block_on(oven.tick());
        let state = oven.get_state();
        assert_eq!(state.run_mode, RunMode::Running);
        assert!(state.runtime >= 0.3, "runtime {}", state.runtime);
        assert!(state.runtime < 1.0, "runtime {}", state.runtime);

        std::thread::sleep(std::time::Duration::from_millis(800));
        shared.temperature.set(52.0);
        block_on(oven.tick());
        let state = oven.get_state();
        assert_idle_and_off(&state);
        assert_eq!(state.last_reset_reason, Some(ResetReason::Completed));
    }

    #[test]
    fn test_actuator_failure_stops_run() {
        let shared = OvenShared::new();
        let io = OvenIo {
            heat: NullOutput,
            cool: NullOutput,
            air: BrokenOutput,
            door: NoDoorSensor,
        };
        let mut oven = OvenController::new(test_config(), &shared, io, NoDelay).unwrap();
        oven.submit_profile(flat_profile(100.0)).unwrap();

        // Below 180: air must switch on, and that write fails.
        shared.temperature.set(90.0);
        block_on(oven.tick());
        let state = oven.get_state();
        assert_idle_and_off(&state);
        assert_eq!(state.last_reset_reason, Some(ResetReason::ActuatorFault));
    }

    #[test]
    fn test_idle_tick_tracks_temperature() {
        let shared = OvenShared::new();
        let mut oven = controller(&shared, test_config());
        shared.temperature.set(42.0);
        block_on(oven.tick());
        assert_eq!(shared.state().measured_temperature, 42.0);
        assert_idle_and_off(&shared.state());
    }
}
