use chrono::{DateTime, Duration, Utc};

use crate::srs::config::SchedulerConfig;
use crate::srs::types::{QualityRating, SchedulingState, MAX_QUALITY};

/// SM-2 interval scheduler. Stateless between calls: everything it needs is
/// passed in as the prior `SchedulingState`.
#[derive(Debug, Clone, Default)]
pub struct ReviewScheduler {
    config: SchedulerConfig,
}

impl ReviewScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Compute the state produced by a review of quality `quality`.
    /// `prior` is `None` for a card that has never been reviewed.
    pub fn next_state(
        &self,
        prior: Option<&SchedulingState>,
        quality: QualityRating,
    ) -> SchedulingState {
        let cfg = &self.config;
        let prior = prior
            .copied()
            .unwrap_or_else(|| SchedulingState::new_card(cfg));

        if !quality.is_passing(cfg) {
            return SchedulingState {
                interval_days: cfg.first_interval_days,
                ease_factor: (prior.ease_factor - cfg.lapse_ease_penalty).max(cfg.min_ease_factor),
                repetition_count: 0,
            };
        }

        let interval_days = match prior.repetition_count {
            0 => cfg.first_interval_days,
            1 => cfg.second_interval_days,
            _ => {
                let grown = (prior.interval_days as f64 * prior.ease_factor).round();
                if grown.is_finite() {
                    (grown as i64).clamp(1, cfg.max_interval_days)
                } else {
                    cfg.max_interval_days
                }
            }
        };

        SchedulingState {
            interval_days: interval_days.min(cfg.max_interval_days),
            ease_factor: (prior.ease_factor + ease_delta(quality)).max(cfg.min_ease_factor),
            repetition_count: prior.repetition_count.saturating_add(1),
        }
    }

    pub fn next_review_at(&self, reviewed_at: DateTime<Utc>, state: &SchedulingState) -> DateTime<Utc> {
        reviewed_at + Duration::days(state.interval_days)
    }
}

/// SM-2 ease adjustment: +0.1 at quality 5, 0 at quality 4, -0.14 at quality 3.
fn ease_delta(quality: QualityRating) -> f64 {
    let miss = f64::from(MAX_QUALITY - quality.value());
    0.1 - miss * (0.08 + miss * 0.02)
}

/// A card is due when it has never been reviewed or its scheduled time has arrived.
pub fn is_due(next_review_at: Option<DateTime<Utc>>, at: DateTime<Utc>) -> bool {
    match next_review_at {
        None => true,
        Some(due_at) => due_at <= at,
    }
}
