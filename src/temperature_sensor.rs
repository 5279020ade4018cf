use embassy_time::{with_timeout, Duration};
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info};
use portable_atomic::{AtomicU32, Ordering};

use crate::error::SensorReadError;

/// The latest oven temperature, shared between the sampling task (writer) and
/// the control task (reader).
///
/// Stored as the bit pattern of an `f32` in one atomic word, so a read never
/// sees half of a write.
pub struct SharedTemperature {
    bits: AtomicU32,
}

impl SharedTemperature {
    pub fn new(initial: f32) -> Self {
        Self {
            bits: AtomicU32::new(initial.to_bits()),
        }
    }

    /// 0.0 °C; the all-zero bit pattern.
    pub const fn zeroed() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, temperature: f32) {
        self.bits.store(temperature.to_bits(), Ordering::Release);
    }
}

/// A thermocouple or RTD front end, in °C.
#[allow(async_fn_in_trait)]
pub trait TemperatureReader {
    async fn read(&mut self) -> Result<f32, SensorReadError>;
}

/// Hardware-backed temperature source: polls a [`TemperatureReader`] on a
/// fixed interval and publishes every good sample.
///
/// A failed or late read leaves the previous value in place.
pub struct Sampler<R, D> {
    reader: R,
    delay: D,
    interval: Duration,
}

impl<R, D> Sampler<R, D>
where
    R: TemperatureReader,
    D: DelayNs,
{
    pub fn new(reader: R, delay: D, interval: Duration) -> Self {
        Self {
            reader,
            delay,
            interval,
        }
    }

    /// Take one sample. Returns the stored value, if a new one was stored.
    pub async fn sample(&mut self, target: &SharedTemperature) -> Option<f32> {
        let reading = with_timeout(self.interval * 2, self.reader.read()).await;
        let temperature = match reading {
            Ok(Ok(t)) => t,
            Ok(Err(e)) => {
                error!("Problem reading temperature: {}", e);
                return None;
            }
            Err(_) => {
                error!("Problem reading temperature: {}", SensorReadError::Timeout);
                return None;
            }
        };
        debug!("Sampled {} deg C", temperature);
        target.set(temperature);
        Some(temperature)
    }

    pub async fn run(mut self, target: &SharedTemperature) -> ! {
        info!("Starting temperature sensor task");
        loop {
            self.sample(target).await;
            crate::sleep(&mut self.delay, self.interval).await;
        }
    }
}
