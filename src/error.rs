//! Error types for the kiln controller.
//!
//! One small `Copy` enum per concern. Sensor errors never leave the sampling
//! task, actuator errors end the run, profile and config errors are raised
//! before anything starts heating.

use core::fmt;

/// The temperature sensor could not produce a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorReadError {
    /// Bus or chip communication failed.
    Bus,
    /// Thermocouple open circuit.
    OpenCircuit,
    /// Thermocouple shorted to ground or supply.
    ShortCircuit,
    /// The read did not finish within the sampling deadline.
    Timeout,
}

impl fmt::Display for SensorReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "sensor bus error"),
            Self::OpenCircuit => write!(f, "thermocouple open circuit"),
            Self::ShortCircuit => write!(f, "thermocouple short circuit"),
            Self::Timeout => write!(f, "sensor read timed out"),
        }
    }
}

/// An actuator output could not be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    Heat,
    Cool,
    Air,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heat => write!(f, "heater output failed"),
            Self::Cool => write!(f, "cooling output failed"),
            Self::Air => write!(f, "air output failed"),
        }
    }
}

/// A firing schedule was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileError {
    /// The JSON record could not be parsed.
    Parse,
    /// Fewer than two points.
    TooFewPoints,
    /// More points than the profile can hold.
    TooManyPoints,
    /// The name does not fit.
    NameTooLong,
    /// Two points share a timestamp.
    DuplicateTime,
    /// A time is negative or a value is not finite.
    InvalidPoint,
    /// No built-in profile with that name.
    NotFound,
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "profile parse error"),
            Self::TooFewPoints => write!(f, "profile needs at least two points"),
            Self::TooManyPoints => write!(f, "profile has too many points"),
            Self::NameTooLong => write!(f, "profile name too long"),
            Self::DuplicateTime => write!(f, "profile has duplicate timestamps"),
            Self::InvalidPoint => write!(f, "profile point out of range"),
            Self::NotFound => write!(f, "profile not found"),
        }
    }
}

/// Controller or simulation configuration is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    InvalidTick,
    InvalidGain,
    InvalidPrevisioning,
    InvalidStallLimit,
    InvalidAirBand,
    InvalidSimulation(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTick => write!(f, "tick interval must be between 1 ms and 1 h"),
            Self::InvalidGain => write!(f, "PID gains must be finite"),
            Self::InvalidPrevisioning => write!(f, "previsioning must be finite and >= 0"),
            Self::InvalidStallLimit => write!(f, "stall tick limit must be positive"),
            Self::InvalidAirBand => write!(f, "air on threshold must not exceed air off threshold"),
            Self::InvalidSimulation(field) => write!(f, "simulation parameter {field} must be positive"),
        }
    }
}

/// A front-end request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvenError {
    /// A run is already active; profiles are never replaced mid-run.
    AlreadyRunning,
    /// A previously submitted profile has not been picked up yet.
    Busy,
    /// An abort has been requested and not yet carried out.
    AbortPending,
}

impl fmt::Display for OvenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "a run is already active"),
            Self::Busy => write!(f, "a profile submission is already pending"),
            Self::AbortPending => write!(f, "an abort is pending"),
        }
    }
}
