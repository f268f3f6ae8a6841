//! Typed ids for the matchmaking entities.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker for groups (bubbles in the making).
pub struct GroupEntity;

/// Marker for people committed to a group.
pub struct MemberEntity;

/// Marker for mutual matches between two groups.
pub struct MatchEntity;

/// Marker for the chat room opened by a match.
pub struct ChatRoomEntity;

// ============================================================================
// Type aliases
// ============================================================================

pub type GroupId = Id<GroupEntity>;
pub type MemberId = Id<MemberEntity>;
pub type MatchId = Id<MatchEntity>;
pub type ChatRoomId = Id<ChatRoomEntity>;
