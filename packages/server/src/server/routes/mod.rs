// HTTP routes
pub mod groups;
pub mod health;
pub mod matching;
pub mod sessions;
pub mod stream;
