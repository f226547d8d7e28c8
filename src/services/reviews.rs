use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::clock::Clock;
use crate::srs::{is_due, QualityRating, ReviewScheduler, SchedulingState};
use crate::store::operations::flashcards::Flashcard;
use crate::store::operations::reviews::ReviewRecord;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("flashcard not found: {0}")]
    FlashcardNotFound(String),
    #[error("flashcard {0} was reviewed concurrently")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A flashcard joined with its latest review, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardWithReview {
    pub flashcard: Flashcard,
    pub latest_review: Option<ReviewRecord>,
}

impl FlashcardWithReview {
    pub fn is_due(&self, at: DateTime<Utc>) -> bool {
        is_due(self.latest_review.as_ref().map(|r| r.next_review_at), at)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub flashcard_id: String,
    pub state: SchedulingState,
    pub next_review_at: Option<DateTime<Utc>>,
    pub is_due: bool,
    pub review_count: usize,
}

/// A review scored against the card's current head, not yet persisted.
#[derive(Debug, Clone)]
pub struct PendingReview {
    record: ReviewRecord,
}

impl PendingReview {
    pub fn record(&self) -> &ReviewRecord {
        &self.record
    }
}

/// Scores one review of `flashcard_id` and appends the resulting record.
///
/// Ownership is checked first; a card owned by someone else is reported as
/// not found.
pub fn record_review(
    store: &Store,
    scheduler: &ReviewScheduler,
    clock: &dyn Clock,
    user_id: &str,
    flashcard_id: &str,
    quality: QualityRating,
) -> Result<ReviewRecord, ReviewError> {
    let pending = prepare_review(store, scheduler, clock, user_id, flashcard_id, quality)?;
    commit_review(store, pending)
}

/// Reads the latest record and computes the next one without writing.
pub fn prepare_review(
    store: &Store,
    scheduler: &ReviewScheduler,
    clock: &dyn Clock,
    user_id: &str,
    flashcard_id: &str,
    quality: QualityRating,
) -> Result<PendingReview, ReviewError> {
    match store.get_flashcard_owner(flashcard_id)? {
        Some(owner) if owner == user_id => {}
        _ => return Err(ReviewError::FlashcardNotFound(flashcard_id.to_string())),
    }

    let prior = store.get_latest_review_record(flashcard_id, user_id)?;
    let next = scheduler.next_state(prior.as_ref().map(ReviewRecord::state).as_ref(), quality);
    let now = clock.now();

    Ok(PendingReview {
        record: ReviewRecord {
            id: uuid::Uuid::new_v4().to_string(),
            flashcard_id: flashcard_id.to_string(),
            user_id: user_id.to_string(),
            quality_rating: quality,
            interval_days: next.interval_days,
            ease_factor: next.ease_factor,
            repetition_count: next.repetition_count,
            next_review_at: scheduler.next_review_at(now, &next),
            created_at: now,
            previous_record_id: prior.map(|r| r.id),
        },
    })
}

/// Appends a prepared review. The append is conditional on the head the
/// review was scored against; if another review landed in between, nothing
/// is written and `ReviewError::Conflict` is returned.
pub fn commit_review(store: &Store, pending: PendingReview) -> Result<ReviewRecord, ReviewError> {
    let record = pending.record;
    let saved = store
        .append_review_record(&record, record.previous_record_id.as_deref())
        .map_err(|e| match e {
            StoreError::Conflict { key, .. } => ReviewError::Conflict(key),
            StoreError::NotFound { key, .. } => ReviewError::FlashcardNotFound(key),
            other => ReviewError::Store(other),
        })?;

    tracing::info!(
        user_id = %saved.user_id,
        flashcard_id = %saved.flashcard_id,
        quality = saved.quality_rating.value(),
        interval_days = saved.interval_days,
        ease_factor = saved.ease_factor,
        repetition_count = saved.repetition_count,
        lapse = saved.repetition_count == 0,
        "Review recorded"
    );

    Ok(saved)
}

/// All cards of `user_id` joined with their latest review, oldest card first.
pub fn list_flashcards_with_reviews(
    store: &Store,
    user_id: &str,
) -> Result<Vec<FlashcardWithReview>, ReviewError> {
    let cards = store.list_user_flashcards(user_id)?;
    let mut out = Vec::with_capacity(cards.len());
    for flashcard in cards {
        let latest_review = store.get_latest_review_record(&flashcard.id, user_id)?;
        out.push(FlashcardWithReview {
            flashcard,
            latest_review,
        });
    }
    Ok(out)
}

/// Keeps the cards due at `at`: never-reviewed cards first (oldest card
/// first), then reviewed ones by `nextReviewAt` ascending.
pub fn filter_due(mut items: Vec<FlashcardWithReview>, at: DateTime<Utc>) -> Vec<FlashcardWithReview> {
    items.retain(|item| item.is_due(at));
    items.sort_by(|a, b| {
        let a_key = a.latest_review.as_ref().map(|r| r.next_review_at);
        let b_key = b.latest_review.as_ref().map(|r| r.next_review_at);
        a_key
            .cmp(&b_key)
            .then_with(|| a.flashcard.created_at.cmp(&b.flashcard.created_at))
    });
    items
}

pub fn list_due_flashcards(
    store: &Store,
    clock: &dyn Clock,
    user_id: &str,
    limit: usize,
) -> Result<Vec<FlashcardWithReview>, ReviewError> {
    let all = list_flashcards_with_reviews(store, user_id)?;
    let mut due = filter_due(all, clock.now());
    due.truncate(limit);
    Ok(due)
}

pub fn schedule_for(
    store: &Store,
    scheduler: &ReviewScheduler,
    clock: &dyn Clock,
    user_id: &str,
    flashcard_id: &str,
) -> Result<ScheduleView, ReviewError> {
    if store.get_user_flashcard(user_id, flashcard_id)?.is_none() {
        return Err(ReviewError::FlashcardNotFound(flashcard_id.to_string()));
    }

    let latest = store.get_latest_review_record(flashcard_id, user_id)?;
    let next_review_at = latest.as_ref().map(|r| r.next_review_at);
    let state = latest
        .as_ref()
        .map(ReviewRecord::state)
        .unwrap_or_else(|| SchedulingState::new_card(scheduler.config()));

    Ok(ScheduleView {
        flashcard_id: flashcard_id.to_string(),
        state,
        next_review_at,
        is_due: is_due(next_review_at, clock.now()),
        review_count: store.count_review_records(flashcard_id)?,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::response::AppError;
    use crate::services::clock::FixedClock;
    use crate::store::operations::flashcards::CardDifficulty;

    fn open_store(dir: &tempfile::TempDir, name: &str) -> Store {
        Store::open(dir.path().join(name).to_str().unwrap()).unwrap()
    }

    fn seed_card(store: &Store, id: &str, user_id: &str, created_at: DateTime<Utc>) {
        store
            .create_flashcard(&Flashcard {
                id: id.to_string(),
                user_id: user_id.to_string(),
                front: "Derivative of x^2".to_string(),
                back: "2x".to_string(),
                tags: vec!["calculus".to_string()],
                subject_id: Some("math-101".to_string()),
                difficulty: CardDifficulty::Medium,
                ai_generated: false,
                created_at,
                updated_at: created_at,
            })
            .unwrap();
    }

    fn q(value: u8) -> QualityRating {
        QualityRating::new(value).unwrap()
    }

    #[test]
    fn first_review_of_new_card() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-1");
        let t0 = Utc::now();
        let clock = FixedClock::new(t0);
        seed_card(&store, "c1", "u1", t0);

        let record =
            record_review(&store, &ReviewScheduler::default(), &clock, "u1", "c1", q(4)).unwrap();

        assert_eq!(record.interval_days, 1);
        assert_eq!(record.repetition_count, 1);
        assert!((record.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(record.created_at, t0);
        assert_eq!(record.next_review_at, t0 + Duration::days(1));
        assert!(record.previous_record_id.is_none());
    }

    #[test]
    fn state_is_carried_forward_from_latest_record() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-2");
        let t0 = Utc::now();
        let clock = FixedClock::new(t0);
        let scheduler = ReviewScheduler::default();
        seed_card(&store, "c1", "u1", t0);

        let intervals: Vec<i64> = (0..3)
            .map(|_| {
                let r = record_review(&store, &scheduler, &clock, "u1", "c1", q(4)).unwrap();
                clock.advance(Duration::days(r.interval_days));
                r.interval_days
            })
            .collect();

        // quality 4 leaves ease at 2.5, third interval = round(6 * 2.5)
        assert_eq!(intervals, vec![1, 6, 15]);
    }

    #[test]
    fn n_reviews_produce_n_unchanged_records() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-3");
        let t0 = Utc::now();
        let clock = FixedClock::new(t0);
        let scheduler = ReviewScheduler::default();
        seed_card(&store, "c1", "u1", t0);

        let mut written = Vec::new();
        for quality in [5, 3, 1, 4, 4] {
            written.push(record_review(&store, &scheduler, &clock, "u1", "c1", q(quality)).unwrap());
            clock.advance(Duration::hours(1));
        }

        let history = store.list_review_records("c1", "u1", 100).unwrap();
        let history_ids: Vec<&str> = history.iter().map(|r| r.id.as_str()).collect();
        let written_ids: Vec<&str> = written.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(history_ids, written_ids);
        for (stored, original) in history.iter().zip(&written) {
            assert_eq!(stored.interval_days, original.interval_days);
            assert_eq!(stored.repetition_count, original.repetition_count);
            assert_eq!(stored.quality_rating, original.quality_rating);
            assert_eq!(stored.created_at, original.created_at);
        }
        for pair in history.windows(2) {
            assert_eq!(pair[1].previous_record_id.as_deref(), Some(pair[0].id.as_str()));
        }
    }

    #[test]
    fn foreign_or_missing_card_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-4");
        let clock = FixedClock::new(Utc::now());
        let scheduler = ReviewScheduler::default();
        seed_card(&store, "c1", "owner", Utc::now());

        let err = record_review(&store, &scheduler, &clock, "intruder", "c1", q(5)).unwrap_err();
        assert!(matches!(err, ReviewError::FlashcardNotFound(_)));
        let err = record_review(&store, &scheduler, &clock, "owner", "ghost", q(5)).unwrap_err();
        assert!(matches!(err, ReviewError::FlashcardNotFound(_)));
        assert_eq!(store.count_review_records("c1").unwrap(), 0);
    }

    #[test]
    fn concurrent_review_of_same_head_conflicts() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-8");
        let t0 = Utc::now();
        let clock = FixedClock::new(t0);
        let scheduler = ReviewScheduler::default();
        seed_card(&store, "c1", "u1", t0);
        record_review(&store, &scheduler, &clock, "u1", "c1", q(4)).unwrap();

        let first = prepare_review(&store, &scheduler, &clock, "u1", "c1", q(5)).unwrap();
        let second = prepare_review(&store, &scheduler, &clock, "u1", "c1", q(2)).unwrap();
        assert_eq!(
            first.record().previous_record_id,
            second.record().previous_record_id
        );

        let saved = commit_review(&store, first).unwrap();
        let err = commit_review(&store, second).unwrap_err();
        assert!(matches!(err, ReviewError::Conflict(ref id) if id == "c1"));

        assert_eq!(store.count_review_records("c1").unwrap(), 2);
        let head = store.get_latest_review_record("c1", "u1").unwrap().unwrap();
        assert_eq!(head.id, saved.id);

        let app_err = AppError::from(err);
        assert_eq!(app_err.status, StatusCode::CONFLICT);
        assert_eq!(app_err.code, "REVIEW_CONFLICT");
    }

    #[test]
    fn due_set_follows_next_review_at() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-5");
        let t0 = Utc::now();
        let clock = FixedClock::new(t0);
        let scheduler = ReviewScheduler::default();
        seed_card(&store, "c1", "u1", t0);

        assert_eq!(list_due_flashcards(&store, &clock, "u1", 10).unwrap().len(), 1);

        // Two successful reviews put the card six days out.
        record_review(&store, &scheduler, &clock, "u1", "c1", q(4)).unwrap();
        let second = record_review(&store, &scheduler, &clock, "u1", "c1", q(4)).unwrap();
        assert_eq!(second.next_review_at, t0 + Duration::days(6));

        clock.set(t0 + Duration::days(6) - Duration::seconds(1));
        assert!(list_due_flashcards(&store, &clock, "u1", 10).unwrap().is_empty());

        clock.set(t0 + Duration::days(6));
        let due = list_due_flashcards(&store, &clock, "u1", 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].latest_review.as_ref().unwrap().id, second.id);
    }

    #[test]
    fn due_ordering_puts_new_cards_first() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-6");
        let t0 = Utc::now();
        let clock = FixedClock::new(t0);
        let scheduler = ReviewScheduler::default();
        seed_card(&store, "reviewed", "u1", t0 - Duration::days(3));
        seed_card(&store, "new-b", "u1", t0 - Duration::days(1));
        seed_card(&store, "new-a", "u1", t0 - Duration::days(2));

        record_review(&store, &scheduler, &clock, "u1", "reviewed", q(2)).unwrap();
        clock.advance(Duration::days(2));

        let due = list_due_flashcards(&store, &clock, "u1", 10).unwrap();
        let ids: Vec<&str> = due.iter().map(|d| d.flashcard.id.as_str()).collect();
        assert_eq!(ids, vec!["new-a", "new-b", "reviewed"]);

        let limited = list_due_flashcards(&store, &clock, "u1", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn schedule_view_of_new_card() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "svc-7");
        let clock = FixedClock::new(Utc::now());
        let scheduler = ReviewScheduler::default();
        seed_card(&store, "c1", "u1", Utc::now());

        let view = schedule_for(&store, &scheduler, &clock, "u1", "c1").unwrap();
        assert!(view.is_due);
        assert!(view.next_review_at.is_none());
        assert_eq!(view.review_count, 0);
        assert_eq!(view.state, SchedulingState::new_card(scheduler.config()));
    }
}
