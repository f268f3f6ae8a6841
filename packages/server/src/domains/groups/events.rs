use serde::Serialize;

use crate::common::{GroupId, MemberId};
use crate::domains::groups::models::{Group, Member};

/// Member as shown in a formation announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub id: MemberId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl From<&Member> for MemberSummary {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            name: member.name.clone(),
            avatar_ref: member.avatar_ref.clone(),
        }
    }
}

/// A group just reached its target size. Published once per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BubbleFormed {
    pub group_id: GroupId,
    pub group_name: String,
    pub members: Vec<MemberSummary>,
}

impl BubbleFormed {
    pub fn for_group(group: &Group) -> Self {
        Self {
            group_id: group.id,
            group_name: group.name.clone(),
            members: group.members.iter().map(MemberSummary::from).collect(),
        }
    }
}

impl bubble_bus::Event for BubbleFormed {
    const NAME: &'static str = "BUBBLE_FORMED";
}
