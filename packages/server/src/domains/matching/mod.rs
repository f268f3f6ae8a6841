pub mod badges;
pub mod candidates;
pub mod decisions;
pub mod events;
pub mod models;

pub use badges::MatchBadgeCounter;
pub use candidates::{CandidatePage, CandidateQuery};
pub use decisions::DecisionEngine;
pub use events::MatchCreated;
