pub mod flashcards;
pub mod reviews;
pub mod sessions;
pub mod users;
