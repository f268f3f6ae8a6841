pub mod decision;
pub mod match_record;

pub use decision::{EdgeWrite, LikeResult};
pub use match_record::{ordered_pair, ChatRoom, Match, Promotion};
