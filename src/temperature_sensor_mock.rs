//! Simulated temperature source.
//!
//! Two lumped bodies, heating element and oven cavity, integrated with
//! forward Euler:
//!
//! ```text
//!   P_heat·heat ──▶ element ──R_ho(air)──▶ cavity ──R_o(cool)──▶ ambient
//! ```

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{debug, info};

use crate::config::SimulationConfig;
use crate::error::ConfigError;
use crate::OvenShared;

#[derive(Debug, Clone)]
pub struct ThermalModel {
    params: SimulationConfig,
    /// Cavity temperature, °C.
    oven: f32,
    /// Heating element temperature, °C.
    element: f32,
}

impl ThermalModel {
    /// Both bodies start at ambient.
    pub fn new(params: SimulationConfig) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            oven: params.t_env,
            element: params.t_env,
        })
    }

    pub fn temperature(&self) -> f32 {
        self.oven
    }

    pub fn element_temperature(&self) -> f32 {
        self.element
    }

    /// Advance one time step with the given actuator levels and return the
    /// new cavity temperature.
    pub fn step(&mut self, heat: f32, cool: bool, air: bool) -> f32 {
        let p = &self.params;
        let dt = p.time_step;

        // heating energy into the element
        let q_heat = p.p_heat * dt * heat;
        self.element += q_heat / p.c_heat;

        // element -> cavity
        let r_ho = if air { p.r_ho_air } else { p.r_ho_noair };
        let p_ho = (self.element - self.oven) / r_ho;
        self.oven += p_ho * dt / p.c_oven;
        self.element -= p_ho * dt / p.c_heat;

        // cavity -> ambient
        let r_o = if cool { p.r_o_cool } else { p.r_o_nocool };
        let p_env = (self.oven - p.t_env) / r_o;
        self.oven -= p_env * dt / p.c_oven;

        debug!(
            "energy sim: -> {}W heater: {} -> {}W oven: {} -> {}W env",
            (p.p_heat * heat) as i32,
            self.element as i32,
            p_ho as i32,
            self.oven as i32,
            p_env as i32
        );

        self.oven
    }
}

/// Simulated temperature source: integrates a [`ThermalModel`] against the
/// actuator levels the controller last published.
pub struct Simulator<D> {
    model: ThermalModel,
    delay: D,
    interval: Duration,
}

impl<D: DelayNs> Simulator<D> {
    pub fn new(model: ThermalModel, delay: D, interval: Duration) -> Self {
        Self {
            model,
            delay,
            interval,
        }
    }

    /// One integration step driven by the current oven state.
    pub fn step(&mut self, shared: &OvenShared) -> f32 {
        let state = shared.state();
        let temperature = self.model.step(
            state.heat_level,
            state.cool_level > 0.0,
            state.air_level > 0.0,
        );
        shared.temperature.set(temperature);
        temperature
    }

    pub async fn run(mut self, shared: &OvenShared) -> ! {
        info!(
            "Starting simulated temperature sensor (ambient {} deg C, {} W)",
            self.model.params.t_env, self.model.params.p_heat
        );
        shared.temperature.set(self.model.temperature());
        loop {
            self.step(shared);
            crate::sleep(&mut self.delay, self.interval).await;
        }
    }
}
