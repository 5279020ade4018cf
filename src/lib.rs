#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod config;
pub mod error;
pub mod heater;
pub mod inputs;
pub mod oven_controller;
pub mod outputs;
pub mod pid;
pub mod profile;
pub mod profile_reader;
pub mod status;
pub mod temperature_sensor;
pub mod temperature_sensor_mock;

pub use log;

pub static VERSION: &str = "v0.1";

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use portable_atomic::{AtomicBool, Ordering};
use serde::{Deserialize, Serialize};

use crate::error::OvenError;
use crate::profile::Profile;
use crate::temperature_sensor::SharedTemperature;

/// Depth of the queue of submitted profiles waiting for the control task.
pub const SUBMIT_QUEUE_DEPTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DoorState {
    Open,
    Closed,
    Unknown,
}

/// Why the controller last fell back to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetReason {
    Completed,
    Aborted,
    StallDetected,
    ActuatorFault,
}

/// Snapshot of one oven, published by the control task after every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OvenState {
    pub run_mode: RunMode,
    pub runtime: f32,
    pub total_time: f32,
    pub target_temperature: f32,
    pub measured_temperature: f32,
    /// Duty fraction commanded for the current tick. Stays set after the relay
    /// opens within the tick.
    pub heat_level: f32,
    /// 1 while cooling is on, else 0.
    pub cool_level: f32,
    /// 1 while ventilation is on, else 0.
    pub air_level: f32,
    pub door_state: DoorState,
    pub last_reset_reason: Option<ResetReason>,
}

impl OvenState {
    pub const fn idle() -> Self {
        Self {
            run_mode: RunMode::Idle,
            runtime: 0.0,
            total_time: 0.0,
            target_temperature: 0.0,
            measured_temperature: 0.0,
            heat_level: 0.0,
            cool_level: 0.0,
            air_level: 0.0,
            door_state: DoorState::Unknown,
            last_reset_reason: None,
        }
    }
}

impl Default for OvenState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Everything the tasks of one oven share.
///
/// The sampling task writes `temperature`; the control task reads it and is
/// the only writer of `state`. Front ends reach the control task through an
/// [`OvenHandle`]: submitted profiles are queued, an abort is a flag so it can
/// never be lost to a full queue.
pub struct OvenShared {
    pub temperature: SharedTemperature,
    state: Mutex<CriticalSectionRawMutex, RefCell<OvenState>>,
    submitted: Channel<CriticalSectionRawMutex, Profile, SUBMIT_QUEUE_DEPTH>,
    abort_requested: AtomicBool,
}

impl OvenShared {
    pub const fn new() -> Self {
        Self {
            temperature: SharedTemperature::zeroed(),
            state: Mutex::new(RefCell::new(OvenState::idle())),
            submitted: Channel::new(),
            abort_requested: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> OvenHandle<'_> {
        OvenHandle { shared: self }
    }

    pub fn state(&self) -> OvenState {
        self.state.lock(|state| *state.borrow())
    }

    pub(crate) fn publish(&self, snapshot: OvenState) {
        self.state.lock(|state| *state.borrow_mut() = snapshot);
    }

    pub(crate) fn take_submitted(&self) -> Option<Profile> {
        self.submitted.try_receive().ok()
    }

    pub(crate) fn take_abort_request(&self) -> bool {
        self.abort_requested.swap(false, Ordering::AcqRel)
    }
}

impl Default for OvenShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Front-end access to a running oven.
///
/// Requests are picked up at the start of the control task's next tick.
#[derive(Clone, Copy)]
pub struct OvenHandle<'a> {
    shared: &'a OvenShared,
}

impl<'a> OvenHandle<'a> {
    /// Queue a profile for the control task.
    ///
    /// Refused while an abort is still pending, so a run is never started by a
    /// submission that the pending abort would discard.
    pub fn submit_profile(&self, profile: Profile) -> Result<(), OvenError> {
        if self.shared.state().run_mode == RunMode::Running {
            return Err(OvenError::AlreadyRunning);
        }
        if self.shared.abort_requested.load(Ordering::Acquire) {
            return Err(OvenError::AbortPending);
        }
        self.shared
            .submitted
            .try_send(profile)
            .map_err(|_| OvenError::Busy)
    }

    pub fn abort(&self) {
        self.shared.abort_requested.store(true, Ordering::Release);
    }

    pub fn get_state(&self) -> OvenState {
        self.shared.state()
    }

    pub fn temperature(&self) -> f32 {
        self.shared.temperature.get()
    }
}

/// Sleep for `duration`, in as many `delay_us` calls as it takes.
pub async fn sleep<D: DelayNs>(delay: &mut D, duration: Duration) {
    let mut remaining = duration.as_micros();
    while remaining > 0 {
        let chunk = remaining.min(u32::MAX as u64);
        delay.delay_us(chunk as u32).await;
        remaining -= chunk;
    }
}
