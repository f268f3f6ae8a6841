// Business domains
pub mod groups;
pub mod matching;
pub mod session;
