//! Oven configuration.
//!
//! Everything the controller and the simulator need is passed in explicitly
//! through these structs. `Default` carries the stock values; front ends may
//! deserialize overrides from JSON.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Setpoints above this enable the integral term.
pub const INTEGRAL_GATE_TEMPERATURE: f32 = 190.0;
/// Consecutive frozen heating ticks tolerated before a safety reset.
pub const STALL_TICK_LIMIT: u32 = 20;
/// Ventilation switches on below this temperature.
pub const AIR_ON_BELOW: f32 = 180.0;
/// Ventilation switches off above this temperature.
pub const AIR_OFF_ABOVE: f32 = 200.0;
/// Longest accepted control tick or sampling interval.
pub const MAX_TICK_MILLIS: u32 = 3_600_000;

/// How the controller measures elapsed run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBase {
    /// Runtime is wall-clock time since the run started.
    WallClock,
    /// Runtime advances by exactly one tick per loop iteration.
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OvenConfig {
    // --- PID ---
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Lookahead (seconds) added to runtime before reading the schedule.
    pub previsioning: f32,
    pub integral_gate: f32,

    // --- Timing ---
    /// Control tick in milliseconds.
    pub tick_millis: u32,
    /// Temperature sampling interval in milliseconds.
    pub sensor_interval_millis: u32,
    pub time_base: TimeBase,

    // --- Safety ---
    pub stall_tick_limit: u32,

    // --- Ventilation ---
    pub air_on_below: f32,
    pub air_off_above: f32,
}

impl Default for OvenConfig {
    fn default() -> Self {
        Self {
            kp: 0.5,
            ki: 0.0025,
            kd: 0.1,
            previsioning: 0.0,
            integral_gate: INTEGRAL_GATE_TEMPERATURE,

            tick_millis: 500,
            sensor_interval_millis: 500,
            time_base: TimeBase::WallClock,

            stall_tick_limit: STALL_TICK_LIMIT,

            air_on_below: AIR_ON_BELOW,
            air_off_above: AIR_OFF_ABOVE,
        }
    }
}

impl OvenConfig {
    /// Stock configuration for a simulated oven.
    pub fn simulated() -> Self {
        Self {
            time_base: TimeBase::Simulated,
            ..Self::default()
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.into())
    }

    pub fn tick_secs(&self) -> f32 {
        self.tick_millis as f32 / 1000.0
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_millis.into())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tick_range = 1..=MAX_TICK_MILLIS;
        if !tick_range.contains(&self.tick_millis)
            || !tick_range.contains(&self.sensor_interval_millis)
        {
            return Err(ConfigError::InvalidTick);
        }
        if !(self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite())
            || !self.integral_gate.is_finite()
        {
            return Err(ConfigError::InvalidGain);
        }
        if !self.previsioning.is_finite() || self.previsioning < 0.0 {
            return Err(ConfigError::InvalidPrevisioning);
        }
        if self.stall_tick_limit == 0 {
            return Err(ConfigError::InvalidStallLimit);
        }
        if !(self.air_on_below <= self.air_off_above) {
            return Err(ConfigError::InvalidAirBand);
        }
        Ok(())
    }
}

/// Lumped two-body thermal model of the kiln.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Ambient temperature, °C.
    pub t_env: f32,
    /// Heat capacity of the heating element, J/K.
    pub c_heat: f32,
    /// Heat capacity of the oven cavity, J/K.
    pub c_oven: f32,
    /// Heating power at full duty, W.
    pub p_heat: f32,
    /// Thermal resistance oven -> environment, K/W.
    pub r_o_nocool: f32,
    pub r_o_cool: f32,
    /// Thermal resistance heating element -> oven, K/W.
    pub r_ho_noair: f32,
    pub r_ho_air: f32,
    /// Integration step in seconds.
    pub time_step: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t_env: 25.0,
            c_heat: 100.0,
            c_oven: 2000.0,
            p_heat: 3500.0,
            r_o_nocool: 1.0,
            r_o_cool: 0.05,
            r_ho_noair: 0.1,
            r_ho_air: 0.05,
            time_step: 0.5,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("c_heat", self.c_heat),
            ("c_oven", self.c_oven),
            ("r_o_nocool", self.r_o_nocool),
            ("r_o_cool", self.r_o_cool),
            ("r_ho_noair", self.r_ho_noair),
            ("r_ho_air", self.r_ho_air),
            ("time_step", self.time_step),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidSimulation(field));
            }
        }
        if !(self.p_heat.is_finite() && self.p_heat >= 0.0) {
            return Err(ConfigError::InvalidSimulation("p_heat"));
        }
        if !self.t_env.is_finite() {
            return Err(ConfigError::InvalidSimulation("t_env"));
        }
        Ok(())
    }
}
