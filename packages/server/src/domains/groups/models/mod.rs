pub mod group;

pub use group::{
    FormationState, Group, Member, MembershipChange, MembershipChangeKind, NewGroup, TargetSize,
};
