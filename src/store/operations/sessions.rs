use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionResult;

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Store {
    pub fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let key = keys::session_key(&session.token_hash)?;
        let index_key = keys::session_user_index_key(&session.user_id, &session.token_hash)?;
        let session_bytes = Self::serialize(session)?;

        let result: TransactionResult<(), StoreError> = self.sessions.transaction(|tx| {
            tx.insert(key.as_bytes(), session_bytes.as_slice())?;
            tx.insert(index_key.as_bytes(), &[] as &[u8])?;
            Ok(())
        });
        result?;
        Ok(())
    }

    /// Returns `None` for unknown or expired sessions. Expired entries are
    /// left for `cleanup_expired_sessions`.
    pub fn get_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        let key = keys::session_key(token_hash)?;
        let Some(raw) = self.sessions.get(key.as_bytes())? else {
            return Ok(None);
        };

        let session = Self::deserialize::<Session>(&raw)?;
        if session.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        let key = keys::session_key(token_hash)?;
        let index_key = self
            .sessions
            .get(key.as_bytes())?
            .and_then(|raw| Self::deserialize::<Session>(&raw).ok())
            .and_then(|session| keys::session_user_index_key(&session.user_id, token_hash).ok());

        let result: TransactionResult<(), StoreError> = self.sessions.transaction(|tx| {
            if let Some(idx_key) = &index_key {
                tx.remove(idx_key.as_bytes())?;
            }
            tx.remove(key.as_bytes())?;
            Ok(())
        });
        result?;
        Ok(())
    }

    pub fn count_user_sessions(&self, user_id: &str) -> Result<usize, StoreError> {
        let prefix = keys::session_user_index_prefix(user_id)?;
        let mut count = 0usize;
        for item in self.sessions.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }

    /// Drops the oldest sessions of a user until at most `max_sessions` remain.
    pub fn cleanup_oldest_user_sessions(
        &self,
        user_id: &str,
        max_sessions: usize,
    ) -> Result<(), StoreError> {
        let prefix = keys::session_user_index_prefix(user_id)?;
        let mut sessions: Vec<(String, DateTime<Utc>)> = Vec::new();

        for item in self.sessions.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let Ok(key_str) = String::from_utf8(k.to_vec()) else {
                continue;
            };
            let Some(hash) = key_str.rsplit(':').next() else {
                continue;
            };
            let session_key = keys::session_key(hash)?;
            if let Some(raw) = self.sessions.get(session_key.as_bytes())? {
                if let Ok(session) = Self::deserialize::<Session>(&raw) {
                    sessions.push((hash.to_string(), session.created_at));
                }
            }
        }

        if sessions.len() <= max_sessions {
            return Ok(());
        }

        sessions.sort_by_key(|(_, created_at)| *created_at);

        let to_remove = sessions.len() - max_sessions;
        for (hash, _) in sessions.into_iter().take(to_remove) {
            self.delete_session(&hash)?;
        }

        Ok(())
    }

    /// Removes up to 1000 expired sessions per call and returns how many went.
    pub fn cleanup_expired_sessions(&self) -> Result<u32, StoreError> {
        const MAX_BATCH_SIZE: usize = 1000;

        let now = Utc::now();
        let mut expired = Vec::new();
        for item in self.sessions.iter() {
            let (k, v) = item?;
            if k.starts_with(b"user:") {
                continue;
            }
            let session: Session = Self::deserialize(&v)?;
            if session.expires_at <= now {
                expired.push(session.token_hash);
                if expired.len() >= MAX_BATCH_SIZE {
                    break;
                }
            }
        }

        let count = expired.len() as u32;
        for token_hash in expired {
            self.delete_session(&token_hash)?;
        }

        Ok(count)
    }
}
