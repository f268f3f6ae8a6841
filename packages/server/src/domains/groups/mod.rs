pub mod events;
pub mod formation;
pub mod models;

pub use events::{BubbleFormed, MemberSummary};
pub use formation::FormationDetector;
