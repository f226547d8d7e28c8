use serde::{Deserialize, Serialize};

use crate::config::env_or_parse;

/// Numeric policy of the SM-2 scheduler.
///
/// Defaults reproduce the classic SM-2 constants. Every field can be tuned
/// through `SRS_*` environment variables without touching the algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Ease factor never drops below this floor.
    pub min_ease_factor: f64,
    /// Ease factor of a card that has never been reviewed.
    pub initial_ease_factor: f64,
    /// Interval carried by a card that has never been reviewed.
    pub initial_interval_days: i64,
    /// Interval after the first successful review of a new or lapsed card.
    pub first_interval_days: i64,
    /// Interval after the second consecutive successful review.
    pub second_interval_days: i64,
    /// Ease reduction applied on a lapse.
    pub lapse_ease_penalty: f64,
    /// Lowest quality rating that counts as a successful recall.
    pub passing_quality: u8,
    /// Upper bound on any computed interval.
    #[serde(default = "default_max_interval_days")]
    pub max_interval_days: i64,
}

fn default_max_interval_days() -> i64 {
    36_500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_ease_factor: 1.3,
            initial_ease_factor: 2.5,
            initial_interval_days: 1,
            first_interval_days: 1,
            second_interval_days: 6,
            lapse_ease_penalty: 0.2,
            passing_quality: 3,
            max_interval_days: default_max_interval_days(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cfg = Self {
            min_ease_factor: env_or_parse("SRS_MIN_EASE_FACTOR", defaults.min_ease_factor),
            initial_ease_factor: env_or_parse(
                "SRS_INITIAL_EASE_FACTOR",
                defaults.initial_ease_factor,
            ),
            initial_interval_days: defaults.initial_interval_days,
            first_interval_days: defaults.first_interval_days,
            second_interval_days: env_or_parse(
                "SRS_SECOND_INTERVAL_DAYS",
                defaults.second_interval_days,
            ),
            lapse_ease_penalty: env_or_parse(
                "SRS_LAPSE_EASE_PENALTY",
                defaults.lapse_ease_penalty,
            ),
            passing_quality: env_or_parse("SRS_PASSING_QUALITY", defaults.passing_quality),
            max_interval_days: env_or_parse("SRS_MAX_INTERVAL_DAYS", defaults.max_interval_days),
        };

        match cfg.validate() {
            Ok(()) => cfg,
            Err(reason) => {
                tracing::warn!(reason, "Invalid SRS configuration, using defaults");
                defaults
            }
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.min_ease_factor.is_finite() && self.min_ease_factor > 0.0) {
            return Err("min_ease_factor must be a positive number");
        }
        if !self.initial_ease_factor.is_finite() || self.initial_ease_factor < self.min_ease_factor
        {
            return Err("initial_ease_factor must not be below min_ease_factor");
        }
        if !(self.lapse_ease_penalty.is_finite() && self.lapse_ease_penalty >= 0.0) {
            return Err("lapse_ease_penalty must be non-negative");
        }
        if self.initial_interval_days < 1
            || self.first_interval_days < 1
            || self.second_interval_days < 1
        {
            return Err("intervals must be at least one day");
        }
        if self.max_interval_days < self.second_interval_days {
            return Err("max_interval_days must not be below second_interval_days");
        }
        if self.passing_quality > 5 {
            return Err("passing_quality must be within 0..=5");
        }
        Ok(())
    }
}
