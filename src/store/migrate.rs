use std::collections::HashMap;

use crate::store::keys;
use crate::store::operations::reviews::ReviewRecord;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_review_heads", m002_review_heads),
    ]
}

pub fn latest_version() -> u32 {
    migrations().len() as u32
}

/// Applies every migration newer than the stored version.
///
/// Each migration must be idempotent: a crash between running it and
/// persisting the new version means it runs again on the next start.
/// The version is persisted after every step and never moves backwards.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;

    for (index, (name, func)) in migrations().iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt version marker of {} bytes", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuilds the per-card head index from the review ledger. Ledger keys sort
/// by card then time, so the last record seen per card is its latest.
fn m002_review_heads(store: &Store) -> Result<(), StoreError> {
    let mut latest: HashMap<String, sled::IVec> = HashMap::new();
    for item in store.review_records.iter() {
        let (_, value) = item?;
        let record: ReviewRecord = Store::deserialize(&value)?;
        latest.insert(record.flashcard_id, value);
    }

    let mut rebuilt = 0usize;
    for (flashcard_id, value) in latest {
        let head_key = keys::review_head_key(&flashcard_id)?;
        if store.review_heads.get(head_key.as_bytes())?.as_ref() != Some(&value) {
            store.review_heads.insert(head_key.as_bytes(), value)?;
            rebuilt += 1;
        }
    }

    tracing::info!(rebuilt, "Review head index rebuilt");
    Ok(())
}
