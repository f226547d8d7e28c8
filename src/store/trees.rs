pub const USERS: &str = "users";
pub const SESSIONS: &str = "sessions";
pub const FLASHCARDS: &str = "flashcards";
pub const REVIEW_RECORDS: &str = "review_records";
pub const REVIEW_HEADS: &str = "review_heads";
pub const META: &str = "meta";
