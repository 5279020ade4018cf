use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

pub const MAX_POINTS: usize = 64;
pub const MAX_NAME_LEN: usize = 64;

/// One schedule entry: at `time` seconds into the run the kiln should be at
/// `temperature`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub time: f32,
    pub temperature: f32,
}

impl Point {
    pub const fn new(time: f32, temperature: f32) -> Self {
        Self { time, temperature }
    }
}

/// A firing schedule, sorted by time and immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String<MAX_NAME_LEN>,
    points: Vec<Point, MAX_POINTS>,
    ki_threshold: f32,
    duration: f32,
}

impl Profile {
    /// Build a profile from unsorted points.
    ///
    /// Points are sorted by time. At least two points are required, times must
    /// be finite, non-negative and distinct, temperatures finite.
    pub fn new(name: &str, points: &[Point], ki_threshold: f32) -> Result<Self, ProfileError> {
        let mut profile_name = String::new();
        profile_name
            .push_str(name)
            .map_err(|_| ProfileError::NameTooLong)?;

        if points.len() < 2 {
            return Err(ProfileError::TooFewPoints);
        }
        let mut sorted: Vec<Point, MAX_POINTS> =
            Vec::from_slice(points).map_err(|_| ProfileError::TooManyPoints)?;

        if sorted
            .iter()
            .any(|p| !p.time.is_finite() || p.time < 0.0 || !p.temperature.is_finite())
        {
            return Err(ProfileError::InvalidPoint);
        }
        if !ki_threshold.is_finite() {
            return Err(ProfileError::InvalidPoint);
        }

        // Equal times are rejected below, so stability does not matter.
        sorted.sort_unstable_by(|a, b| a.time.total_cmp(&b.time));

        if sorted.windows(2).any(|w| w[0].time == w[1].time) {
            return Err(ProfileError::DuplicateTime);
        }

        let duration = sorted[sorted.len() - 1].time;

        Ok(Self {
            name: profile_name,
            points: sorted,
            ki_threshold,
            duration,
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn ki_threshold(&self) -> f32 {
        self.ki_threshold
    }

    /// Time of the last point, in seconds.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// The schedule points bracketing `time`.
    ///
    /// Before the first point both sides are the first point. At or past the
    /// last point there is nothing to bracket.
    pub fn surrounding_points(&self, time: f32) -> Option<(Point, Point)> {
        if time > self.duration {
            return None;
        }
        let first = self.points[0];
        if time < first.time {
            return Some((first, first));
        }
        self.points
            .windows(2)
            .find(|w| time < w[1].time)
            .map(|w| (w[0], w[1]))
    }

    /// Target temperature at `time` seconds into the run; 0 once the schedule
    /// has ended.
    pub fn target_temperature(&self, time: f32) -> f32 {
        if time >= self.duration {
            return 0.0;
        }
        match self.surrounding_points(time) {
            Some((prev, next)) if next.time > prev.time => {
                let incline = (next.temperature - prev.temperature) / (next.time - prev.time);
                prev.temperature + (time - prev.time) * incline
            }
            Some((prev, _)) => prev.temperature,
            None => 0.0,
        }
    }

    pub fn is_rising(&self, time: f32) -> bool {
        match self.surrounding_points(time) {
            Some((prev, next)) => next.temperature > prev.temperature,
            None => false,
        }
    }
}
