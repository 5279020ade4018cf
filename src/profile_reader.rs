//! Firing schedules from their persisted JSON form.
//!
//! ```json
//! {"name": "test", "data": [[0, 20], [60, 200], [120, 200], [180, 0]], "Ki_Threshold": 0}
//! ```
//!
//! `Ki_Threshold` is optional and falls back to 0.

use heapless::Vec;
use log::{error, info, warn};
use serde::Deserialize;

use crate::error::ProfileError;
use crate::profile::{Point, Profile, MAX_POINTS};

#[derive(Debug, Deserialize)]
struct ProfileRecord<'a> {
    name: &'a str,
    data: Vec<(f32, f32), MAX_POINTS>,
    #[serde(rename = "Ki_Threshold", default)]
    ki_threshold: Option<f32>,
}

const BUILTIN_PROFILES: [(&str, &str); 3] = [
    (
        "bisque",
        r#"{"name":"bisque","data":[[0,20],[7200,120],[10800,120],[28800,600],[36000,1000],[36600,1000],[43200,0]]}"#,
    ),
    (
        "glaze",
        r#"{"name":"glaze","data":[[0,20],[10800,600],[21600,1220],[22200,1220],[25200,1000],[28800,0]],"Ki_Threshold":1000}"#,
    ),
    (
        "test",
        r#"{"name":"test","data":[[0,20],[60,200],[120,200],[180,0]]}"#,
    ),
];

/// Parse a profile from its JSON record.
pub fn parse_profile(json: &str) -> Result<Profile, ProfileError> {
    let (record, _) = serde_json_core::from_str::<ProfileRecord>(json).map_err(|e| {
        error!("Invalid profile JSON: {:?}", e);
        ProfileError::Parse
    })?;

    let ki_threshold = match record.ki_threshold {
        Some(threshold) => threshold,
        None => {
            warn!("No Ki threshold set in profile {}, using 0", record.name);
            0.0
        }
    };

    let points: Vec<Point, MAX_POINTS> = record
        .data
        .iter()
        .map(|&(time, temperature)| Point::new(time, temperature))
        .collect();

    Profile::new(record.name, &points, ki_threshold)
}

/// Names of the built-in firing schedules.
pub fn list_profiles() -> impl Iterator<Item = &'static str> {
    BUILTIN_PROFILES.iter().map(|(name, _)| *name)
}

/// Load one of the built-in firing schedules.
pub fn read_profile(name: &str) -> Result<Profile, ProfileError> {
    info!("Reading profile: {}", name);
    match BUILTIN_PROFILES.iter().find(|(n, _)| *n == name) {
        Some((_, json)) => parse_profile(json),
        None => {
            error!("Profile not found: {}", name);
            Err(ProfileError::NotFound)
        }
    }
}
