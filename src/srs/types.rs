use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::srs::config::SchedulerConfig;

pub const MIN_QUALITY: u8 = 0;
pub const MAX_QUALITY: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SrsError {
    #[error("qualityRating must be an integer between 0 and 5, got {0}")]
    InvalidQuality(i64),
}

/// Self-assessed recall quality, guaranteed to lie in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct QualityRating(u8);

impl QualityRating {
    pub fn new(value: u8) -> Result<Self, SrsError> {
        Self::try_from(i64::from(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_passing(self, config: &SchedulerConfig) -> bool {
        self.0 >= config.passing_quality
    }
}

impl TryFrom<i64> for QualityRating {
    type Error = SrsError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (i64::from(MIN_QUALITY)..=i64::from(MAX_QUALITY)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SrsError::InvalidQuality(value))
        }
    }
}

impl From<QualityRating> for i64 {
    fn from(value: QualityRating) -> Self {
        i64::from(value.0)
    }
}

/// Scheduling parameters carried from one review to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetition_count: u32,
}

impl SchedulingState {
    /// State of a card that has never been reviewed.
    pub fn new_card(config: &SchedulerConfig) -> Self {
        Self {
            interval_days: config.initial_interval_days,
            ease_factor: config.initial_ease_factor,
            repetition_count: 0,
        }
    }
}
