//! PID regulator for the kiln.
//!
//! - Uses `f32` math
//! - Caller supplies the sample instant to `compute`
//! - Output clamped to [-1, 1]
//! - Integral term clamped to [-1, 1] on its own and only active above a
//!   setpoint gate
//! - Derivative on error
//!
//! Example
//! ```ignore
//! let mut pid = PidController::new(0.5, 0.0025, 0.1, Duration::from_millis(500));
//! let drive = pid.compute(target_c, measured_c, Instant::now());
//! ```

use embassy_time::{Duration, Instant};

use crate::config::{OvenConfig, INTEGRAL_GATE_TEMPERATURE};

#[derive(Debug, Clone)]
pub struct PidController {
    // Gains
    kp: f32,
    ki: f32,
    kd: f32,

    /// Setpoints at or below this leave the integral term out.
    integral_gate: f32,
    /// Carried from the profile. Not used for gating.
    ki_threshold: f32,

    /// Used as `dt` on the first sample and whenever no time has passed.
    nominal_dt: f32,

    // State
    integral_error: f32,
    last_error: f32,
    last_sample_time: Option<Instant>,
}

impl PidController {
    pub fn new(kp: f32, ki: f32, kd: f32, nominal_dt: Duration) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_gate: INTEGRAL_GATE_TEMPERATURE,
            ki_threshold: 0.0,
            nominal_dt: nominal_dt.as_micros() as f32 / 1_000_000.0,
            integral_error: 0.0,
            last_error: 0.0,
            last_sample_time: None,
        }
    }

    pub fn from_config(config: &OvenConfig) -> Self {
        Self::new(config.kp, config.ki, config.kd, config.tick()).with_integral_gate(config.integral_gate)
    }

    /// Builder: setpoint above which the integral term is applied.
    pub fn with_integral_gate(mut self, gate: f32) -> Self {
        self.integral_gate = gate;
        self
    }

    pub fn set_ki_threshold(&mut self, threshold: f32) {
        self.ki_threshold = threshold;
    }

    pub fn ki_threshold(&self) -> f32 {
        self.ki_threshold
    }

    /// Run one PID step and return the drive signal in [-1, 1].
    ///
    /// Call once per control tick; every call moves the time base.
    pub fn compute(&mut self, setpoint: f32, measured: f32, now: Instant) -> f32 {
        let dt = match self.last_sample_time {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last).as_micros() as f32 / 1_000_000.0;
                if elapsed > 0.0 {
                    elapsed
                } else {
                    self.nominal_dt
                }
            }
            None => self.nominal_dt,
        };

        let error = setpoint - measured;
        self.integral_error += error * dt;

        let iterm = if setpoint > self.integral_gate {
            clamp(self.integral_error * self.ki, -1.0, 1.0)
        } else {
            0.0
        };

        let derivative = (error - self.last_error) / dt;

        let output = clamp(self.kp * error + iterm + self.kd * derivative, -1.0, 1.0);

        self.last_error = error;
        self.last_sample_time = Some(now);

        output
    }

    pub fn integral_error(&self) -> f32 {
        self.integral_error
    }

    /// Current gains.
    pub fn gains(&self) -> (f32, f32, f32) {
        (self.kp, self.ki, self.kd)
    }
}

/// Clamp that also maps NaN to 0 so a bad sample can never drive the heater.
#[inline]
fn clamp(x: f32, min: f32, max: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else if x < min {
        min
    } else if x > max {
        max
    } else {
        x
    }
}
