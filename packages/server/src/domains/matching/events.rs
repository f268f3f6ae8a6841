use serde::Serialize;

use crate::common::{ChatRoomId, GroupId, MatchId};
use crate::domains::matching::models::Match;

/// Two groups liked each other; their chat room is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCreated {
    pub match_id: MatchId,
    pub chat_room_id: ChatRoomId,
    pub group_a_id: GroupId,
    pub group_b_id: GroupId,
}

impl From<&Match> for MatchCreated {
    fn from(record: &Match) -> Self {
        Self {
            match_id: record.id,
            chat_room_id: record.chat_room_id,
            group_a_id: record.group_a_id,
            group_b_id: record.group_b_id,
        }
    }
}

impl bubble_bus::Event for MatchCreated {
    const NAME: &'static str = "MATCH_CREATED";
}
