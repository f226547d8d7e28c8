use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionResult;
use sled::Transactional;

use crate::srs::{QualityRating, SchedulingState};
use crate::store::keys;
use crate::store::{Store, StoreError};

/// One review event. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: String,
    pub flashcard_id: String,
    pub user_id: String,
    pub quality_rating: QualityRating,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetition_count: u32,
    pub next_review_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub previous_record_id: Option<String>,
}

impl ReviewRecord {
    pub fn state(&self) -> SchedulingState {
        SchedulingState {
            interval_days: self.interval_days,
            ease_factor: self.ease_factor,
            repetition_count: self.repetition_count,
        }
    }
}

impl Store {
    /// Latest review of a card, as named by the head index. Records of a
    /// different user read as absent.
    pub fn get_latest_review_record(
        &self,
        flashcard_id: &str,
        user_id: &str,
    ) -> Result<Option<ReviewRecord>, StoreError> {
        let key = keys::review_head_key(flashcard_id)?;
        match self.review_heads.get(key.as_bytes())? {
            Some(raw) => {
                let record: ReviewRecord = Self::deserialize(&raw)?;
                Ok((record.user_id == user_id).then_some(record))
            }
            None => Ok(None),
        }
    }

    /// Appends `record` to the card's ledger and moves the head to it.
    ///
    /// The write only happens if the current head is `expected_prior_id`
    /// (`None` meaning the card has no review yet) and the card still exists.
    /// A stale expectation fails with `StoreError::Conflict` and writes nothing.
    pub fn append_review_record(
        &self,
        record: &ReviewRecord,
        expected_prior_id: Option<&str>,
    ) -> Result<ReviewRecord, StoreError> {
        if record.interval_days < 1 {
            return Err(StoreError::Validation(
                "intervalDays must be at least 1".to_string(),
            ));
        }
        if !record.ease_factor.is_finite() {
            return Err(StoreError::Validation(
                "easeFactor must be a finite number".to_string(),
            ));
        }

        let seq = self.raw_db().generate_id()?;
        let record_key = keys::review_record_key(
            &record.flashcard_id,
            record.created_at.timestamp_millis(),
            seq,
            &record.id,
        )?;
        let head_key = keys::review_head_key(&record.flashcard_id)?;
        let card_key = keys::flashcard_key(&record.flashcard_id)?;
        let bytes = Self::serialize(record)?;

        let result: TransactionResult<(), StoreError> =
            (&self.flashcards, &self.review_records, &self.review_heads).transaction(
                |(tx_cards, tx_records, tx_heads)| {
                    if tx_cards.get(card_key.as_bytes())?.is_none() {
                        return sled::transaction::abort(StoreError::NotFound {
                            entity: "flashcard".to_string(),
                            key: record.flashcard_id.clone(),
                        });
                    }

                    let current_head_id = match tx_heads.get(head_key.as_bytes())? {
                        Some(raw) => {
                            let head: ReviewRecord = serde_json::from_slice(&raw).map_err(|e| {
                                sled::transaction::ConflictableTransactionError::Abort(
                                    StoreError::Serialization(e),
                                )
                            })?;
                            Some(head.id)
                        }
                        None => None,
                    };

                    if current_head_id.as_deref() != expected_prior_id {
                        return sled::transaction::abort(StoreError::Conflict {
                            entity: "review_head".to_string(),
                            key: record.flashcard_id.clone(),
                        });
                    }

                    tx_records.insert(record_key.as_bytes(), bytes.as_slice())?;
                    tx_heads.insert(head_key.as_bytes(), bytes.as_slice())?;
                    Ok(())
                },
            );
        result?;

        Ok(record.clone())
    }

    /// Review history of a card, oldest first, at most `limit` entries.
    pub fn list_review_records(
        &self,
        flashcard_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, StoreError> {
        let prefix = keys::review_record_prefix(flashcard_id)?;
        let mut records = Vec::new();
        for item in self.review_records.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let record: ReviewRecord = Self::deserialize(&value)?;
            if record.user_id != user_id {
                continue;
            }
            records.push(record);
            if records.len() >= limit {
                break;
            }
        }
        Ok(records)
    }

    pub fn count_review_records(&self, flashcard_id: &str) -> Result<usize, StoreError> {
        let prefix = keys::review_record_prefix(flashcard_id)?;
        let mut count = 0usize;
        for item in self.review_records.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }
}
