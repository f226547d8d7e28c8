use crate::store::StoreError;

/// Key segments are joined with ':' so they must not contain it.
fn segment<'a>(name: &str, value: &'a str) -> Result<&'a str, StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{name} must not be empty")));
    }
    if value.contains(':') {
        return Err(StoreError::Validation(format!(
            "{name} must not contain ':'"
        )));
    }
    Ok(value)
}

pub fn user_key(user_id: &str) -> Result<String, StoreError> {
    Ok(segment("user_id", user_id)?.to_string())
}

pub fn user_email_index_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn session_key(token_hash: &str) -> Result<String, StoreError> {
    Ok(segment("token_hash", token_hash)?.to_string())
}

pub fn session_user_index_key(user_id: &str, token_hash: &str) -> Result<String, StoreError> {
    Ok(format!(
        "user:{}:{}",
        segment("user_id", user_id)?,
        segment("token_hash", token_hash)?
    ))
}

pub fn session_user_index_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("user:{}:", segment("user_id", user_id)?))
}

pub fn flashcard_key(flashcard_id: &str) -> Result<String, StoreError> {
    Ok(segment("flashcard_id", flashcard_id)?.to_string())
}

pub fn flashcard_user_index_key(user_id: &str, flashcard_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "user:{}:{}",
        segment("user_id", user_id)?,
        segment("flashcard_id", flashcard_id)?
    ))
}

pub fn flashcard_user_index_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("user:{}:", segment("user_id", user_id)?))
}

/// Review records sort chronologically (oldest first) under a card prefix.
/// `seq` breaks ties between records written in the same millisecond.
pub fn review_record_key(
    flashcard_id: &str,
    timestamp_ms: i64,
    seq: u64,
    record_id: &str,
) -> Result<String, StoreError> {
    let ts = timestamp_ms.max(0) as u64;
    Ok(format!(
        "{}:{:020}:{:020}:{}",
        segment("flashcard_id", flashcard_id)?,
        ts,
        seq,
        segment("record_id", record_id)?
    ))
}

pub fn review_record_prefix(flashcard_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", segment("flashcard_id", flashcard_id)?))
}

pub fn review_head_key(flashcard_id: &str) -> Result<String, StoreError> {
    Ok(segment("flashcard_id", flashcard_id)?.to_string())
}
