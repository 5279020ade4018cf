use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use heapless::String;
use log::{info, warn};
use serde_json_core::ser::to_string;

use crate::{OvenShared, OvenState};

/// Large enough for an `OvenState` with every float at full precision.
pub const STATUS_JSON_CAPACITY: usize = 512;

pub type StatusJson = String<STATUS_JSON_CAPACITY>;

pub fn state_to_json(state: &OvenState) -> Result<StatusJson, serde_json_core::ser::Error> {
    to_string(state)
}

/// Periodically logs the published oven state as JSON.
pub struct StatusReporter<D> {
    delay: D,
    interval: Duration,
}

impl<D: DelayNs> StatusReporter<D> {
    pub fn new(delay: D, interval: Duration) -> Self {
        Self { delay, interval }
    }

    pub fn report(&self, shared: &OvenShared) -> Option<StatusJson> {
        match state_to_json(&shared.state()) {
            Ok(json) => {
                info!("{}", json);
                Some(json)
            }
            Err(e) => {
                warn!("Could not serialize oven state: {:?}", e);
                None
            }
        }
    }

    pub async fn run(mut self, shared: &OvenShared) -> ! {
        info!("Starting status reporter");
        loop {
            self.report(shared);
            crate::sleep(&mut self.delay, self.interval).await;
        }
    }
}
