pub mod config;
pub mod scheduler;
pub mod types;

pub use config::SchedulerConfig;
pub use scheduler::{is_due, ReviewScheduler};
pub use types::{QualityRating, SchedulingState, SrsError};
