use serde::Serialize;

use crate::common::{ChatRoomId, MatchId};
use crate::domains::matching::models::match_record::Match;

/// Whether a like/pass edge write created a row or found one already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWrite {
    Created,
    AlreadyExists,
}

/// Result of `like(from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikeResult {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_room_id: Option<ChatRoomId>,
}

impl LikeResult {
    pub fn pending() -> Self {
        Self {
            matched: false,
            match_id: None,
            chat_room_id: None,
        }
    }

    pub fn matched(record: &Match) -> Self {
        Self {
            matched: true,
            match_id: Some(record.id),
            chat_room_id: Some(record.chat_room_id),
        }
    }
}
