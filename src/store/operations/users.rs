use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionResult;

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Account of a student. The email index maps the lowercased address to the
/// user id and lives in the same tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Writes the user and claims its email in one transaction. A taken
    /// email or id aborts with `Conflict` and writes nothing.
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let email_key = keys::user_email_index_key(&user.email);
        let user_key = keys::user_key(&user.id)?;
        let user_bytes = Self::serialize(user)?;

        let result: TransactionResult<(), StoreError> = self.users.transaction(|tx| {
            if tx.get(email_key.as_bytes())?.is_some() {
                return sled::transaction::abort(StoreError::Conflict {
                    entity: "user_email".to_string(),
                    key: user.email.to_lowercase(),
                });
            }
            if tx.get(user_key.as_bytes())?.is_some() {
                return sled::transaction::abort(StoreError::Conflict {
                    entity: "user".to_string(),
                    key: user.id.clone(),
                });
            }
            tx.insert(email_key.as_bytes(), user.id.as_bytes())?;
            tx.insert(user_key.as_bytes(), user_bytes.as_slice())?;
            Ok(())
        });
        Ok(result?)
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let key = keys::user_key(user_id)?;
        self.users
            .get(key.as_bytes())?
            .map(|raw| Self::deserialize(&raw))
            .transpose()
    }

    /// Case-insensitive lookup through the email index.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let index_key = keys::user_email_index_key(email);
        let Some(raw_id) = self.users.get(index_key.as_bytes())? else {
            return Ok(None);
        };
        match std::str::from_utf8(&raw_id) {
            Ok(user_id) => self.get_user_by_id(user_id),
            Err(e) => {
                tracing::warn!(email_key = %index_key, error = %e, "Email index holds a non-UTF-8 user id");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("users.sled").to_str().unwrap()).unwrap()
    }

    fn student(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            display_name: "Aluno".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn email_lookup_ignores_case() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.create_user(&student("u1", "Maria@UFAM.edu.br")).unwrap();
        assert_eq!(store.get_user_by_id("u1").unwrap().unwrap().display_name, "Aluno");
        let found = store.get_user_by_email("maria@ufam.edu.br").unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert!(store.get_user_by_email("joao@ufam.edu.br").unwrap().is_none());
    }

    #[test]
    fn taken_email_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.create_user(&student("u1", "dup@ufam.edu.br")).unwrap();
        let err = store
            .create_user(&student("u2", "DUP@ufam.edu.br"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref entity, .. } if entity == "user_email"));
        assert!(store.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn reused_id_leaves_no_dangling_email() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.create_user(&student("u1", "first@ufam.edu.br")).unwrap();
        let err = store
            .create_user(&student("u1", "second@ufam.edu.br"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref entity, .. } if entity == "user"));
        assert!(store.get_user_by_email("second@ufam.edu.br").unwrap().is_none());
        assert_eq!(
            store.get_user_by_email("first@ufam.edu.br").unwrap().unwrap().id,
            "u1"
        );
    }
}
