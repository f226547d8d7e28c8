pub mod clock;
pub mod reviews;
