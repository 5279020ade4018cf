//! Proportional heater drive by duty-cycling a relay within one tick.
//!
//! For a level `x` in (0, 1] the relay is closed for `x` of the tick period
//! and then opened. The delay is awaited in place, so the caller's task is
//! busy for that fraction of the tick and cannot be interrupted.

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::error;

use crate::outputs::Output;

pub struct Heater<O> {
    output: O,
    level: f32,
}

impl<O: Output> Heater<O> {
    pub fn new(output: O) -> Self {
        Self { output, level: 0.0 }
    }

    /// Level commanded by the last call, 0 when off.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Time the relay stays closed within `period` for `level`.
    pub fn on_time(level: f32, period: Duration) -> Duration {
        if level > 0.0 {
            let fraction = if level > 1.0 { 1.0 } else { level };
            Duration::from_micros((period.as_micros() as f32 * fraction) as u64)
        } else {
            Duration::from_ticks(0)
        }
    }

    /// Drive the heater at `level` for one `period`.
    ///
    /// Returns once the ON portion has elapsed and the relay is open again;
    /// the OFF remainder is left to the caller.
    pub async fn pulse<D: DelayNs>(
        &mut self,
        level: f32,
        period: Duration,
        delay: &mut D,
    ) -> Result<(), O::Error> {
        let on_time = Self::on_time(level, period);
        if on_time.as_micros() == 0 {
            self.level = 0.0;
            return self.output.set(false);
        }

        self.level = if level > 1.0 { 1.0 } else { level };
        self.output.set(true)?;
        crate::sleep(delay, on_time).await;
        self.output.set(false)
    }

    /// Open the relay.
    pub fn off(&mut self) -> Result<(), O::Error> {
        self.level = 0.0;
        self.output.set(false).map_err(|e| {
            error!("Heater off failed: {:?}", e);
            e
        })
    }
}
