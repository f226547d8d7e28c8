use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionResult;
use sled::{IVec, Transactional};

use crate::store::keys;
use crate::store::{Store, StoreError};

const DELETE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CardDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: String,
    pub user_id: String,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub subject_id: Option<String>,
    #[serde(default)]
    pub difficulty: CardDifficulty,
    #[serde(default)]
    pub ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn create_flashcard(&self, card: &Flashcard) -> Result<(), StoreError> {
        let key = keys::flashcard_key(&card.id)?;
        let index_key = keys::flashcard_user_index_key(&card.user_id, &card.id)?;
        let bytes = Self::serialize(card)?;

        let result: TransactionResult<(), StoreError> = self.flashcards.transaction(|tx| {
            if tx.get(key.as_bytes())?.is_some() {
                return sled::transaction::abort(StoreError::Conflict {
                    entity: "flashcard".to_string(),
                    key: card.id.clone(),
                });
            }
            tx.insert(key.as_bytes(), bytes.as_slice())?;
            tx.insert(index_key.as_bytes(), &[] as &[u8])?;
            Ok(())
        });
        result?;
        Ok(())
    }

    /// An id that cannot form a key (empty, or containing ':') names no
    /// stored card, so it reads as absent rather than as a validation error.
    pub fn get_flashcard(&self, flashcard_id: &str) -> Result<Option<Flashcard>, StoreError> {
        let Ok(key) = keys::flashcard_key(flashcard_id) else {
            return Ok(None);
        };
        match self.flashcards.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Card lookup scoped to its owner. Cards of other users read as absent.
    pub fn get_user_flashcard(
        &self,
        user_id: &str,
        flashcard_id: &str,
    ) -> Result<Option<Flashcard>, StoreError> {
        Ok(self
            .get_flashcard(flashcard_id)?
            .filter(|card| card.user_id == user_id))
    }

    pub fn get_flashcard_owner(&self, flashcard_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_flashcard(flashcard_id)?.map(|card| card.user_id))
    }

    pub fn update_flashcard(&self, card: &Flashcard) -> Result<(), StoreError> {
        let existing = self
            .get_flashcard(&card.id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "flashcard".to_string(),
                key: card.id.clone(),
            })?;

        if existing.user_id != card.user_id {
            return Err(StoreError::Validation(
                "flashcard ownership cannot change".to_string(),
            ));
        }

        let key = keys::flashcard_key(&card.id)?;
        self.flashcards
            .insert(key.as_bytes(), Self::serialize(card)?)?;
        Ok(())
    }

    /// Deletes the card together with its review ledger and head entry.
    ///
    /// The ledger is scanned outside the transaction, so a review appended
    /// after the scan moves the head and forces a rescan.
    pub fn delete_flashcard(&self, flashcard_id: &str) -> Result<bool, StoreError> {
        let Some(card) = self.get_flashcard(flashcard_id)? else {
            return Ok(false);
        };
        let head_key = keys::review_head_key(flashcard_id)?;
        let record_prefix = keys::review_record_prefix(flashcard_id)?;

        for attempt in 1..=DELETE_ATTEMPTS {
            let head = self.review_heads.get(head_key.as_bytes())?;
            let record_keys = self
                .review_records
                .scan_prefix(record_prefix.as_bytes())
                .keys()
                .collect::<Result<Vec<_>, _>>()?;

            match self.remove_card_with_ledger(&card, head.as_ref(), &record_keys) {
                Ok(()) => {
                    tracing::debug!(
                        flashcard_id,
                        review_records = record_keys.len(),
                        "Flashcard deleted with its review history"
                    );
                    return Ok(true);
                }
                Err(StoreError::NotFound { .. }) => return Ok(false),
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(flashcard_id, attempt, "Review landed during delete, rescanning");
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::Conflict {
            entity: "review_head".to_string(),
            key: flashcard_id.to_string(),
        })
    }

    /// Removes `card`, its index entry, its head and `record_keys` atomically,
    /// provided the head still equals `expected_head`.
    fn remove_card_with_ledger(
        &self,
        card: &Flashcard,
        expected_head: Option<&IVec>,
        record_keys: &[IVec],
    ) -> Result<(), StoreError> {
        let key = keys::flashcard_key(&card.id)?;
        let index_key = keys::flashcard_user_index_key(&card.user_id, &card.id)?;
        let head_key = keys::review_head_key(&card.id)?;

        let result: TransactionResult<(), StoreError> =
            (&self.flashcards, &self.review_records, &self.review_heads).transaction(
                |(tx_cards, tx_records, tx_heads)| {
                    if tx_cards.get(key.as_bytes())?.is_none() {
                        return sled::transaction::abort(StoreError::NotFound {
                            entity: "flashcard".to_string(),
                            key: card.id.clone(),
                        });
                    }
                    if tx_heads.get(head_key.as_bytes())?.as_ref() != expected_head {
                        return sled::transaction::abort(StoreError::Conflict {
                            entity: "review_head".to_string(),
                            key: card.id.clone(),
                        });
                    }

                    tx_cards.remove(key.as_bytes())?;
                    tx_cards.remove(index_key.as_bytes())?;
                    tx_heads.remove(head_key.as_bytes())?;
                    for record_key in record_keys {
                        tx_records.remove(record_key.clone())?;
                    }
                    Ok(())
                },
            );
        Ok(result?)
    }

    /// Cards owned by `user_id`, oldest first.
    pub fn list_user_flashcards(&self, user_id: &str) -> Result<Vec<Flashcard>, StoreError> {
        let prefix = keys::flashcard_user_index_prefix(user_id)?;
        let mut cards = Vec::new();
        for item in self.flashcards.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let key_text = String::from_utf8_lossy(&k);
            let Some(card_id) = key_text.rsplit(':').next() else {
                continue;
            };
            if let Some(card) = self.get_flashcard(card_id)? {
                cards.push(card);
            }
        }
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(cards)
    }

    pub fn count_user_flashcards(&self, user_id: &str) -> Result<usize, StoreError> {
        let prefix = keys::flashcard_user_index_prefix(user_id)?;
        let mut count = 0usize;
        for item in self.flashcards.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }
}
