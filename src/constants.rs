/// Default page size of list endpoints.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Upper bound on `perPage`.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Default and maximum `limit` of the due-card queue.
pub const DEFAULT_DUE_LIMIT: usize = 50;
pub const MAX_DUE_LIMIT: usize = 200;

/// Default and maximum `limit` of a card's review history.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Cards accepted by one batch create.
pub const MAX_BATCH_CARDS: usize = 100;

/// Live sessions kept per user; older ones are evicted on login.
pub const MAX_SESSIONS_PER_USER: usize = 10;
