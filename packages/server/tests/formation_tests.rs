//! Bubble formation: single-fire under concurrency, membership rules, and
//! the membership feed reaching the stream hub.

mod common;

use std::time::Duration;

use bubble_core::common::MatchmakingError;
use bubble_core::domains::groups::models::{Member, NewGroup, TargetSize};
use bubble_core::kernel::stream_hub::{group_topic, MATCHMAKING_TOPIC};
use test_context::test_context;

use crate::common::TestHarness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_fire_bubble_formed_once() {
    for _ in 0..20 {
        let ctx = TestHarness::new();
        let group = ctx.forming_group("crowd", TargetSize::Four).await;

        // Six people race for three open seats.
        let mut joins = Vec::new();
        for i in 0..6 {
            let formation = ctx.deps.formation.clone();
            joins.push(tokio::spawn(async move {
                formation
                    .add_member(group.id, Member::new(format!("racer-{}", i)))
                    .await
            }));
        }

        let mut accepted = 0;
        for join in joins {
            match join.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(MatchmakingError::InvalidTransition(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(ctx.events.formed().len(), 1);
        let stored = ctx.deps.formation.get_group(group.id).await.unwrap();
        assert_eq!(stored.member_count(), 4);
        assert!(stored.completed_at.is_some());
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn group_created_full_emits_exactly_one_event(ctx: &TestHarness) {
    let group = ctx.complete_group("instant", TargetSize::Three).await;

    let formed = ctx.events.formed();
    assert_eq!(formed.len(), 1);
    assert_eq!(formed[0].group_id, group.id);
    assert_eq!(formed[0].group_name, "instant");
    assert_eq!(formed[0].members.len(), 3);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn no_event_for_partial_or_repeated_joins(ctx: &TestHarness) {
    let group = ctx.forming_group("slow", TargetSize::Four).await;
    let second = Member::new("second").with_avatar("avatars/2.png");

    ctx.deps
        .formation
        .add_member(group.id, second.clone())
        .await
        .unwrap();
    ctx.deps.formation.add_member(group.id, second).await.unwrap();
    assert!(ctx.events.formed().is_empty());
    assert_eq!(
        ctx.deps.formation.get_group(group.id).await.unwrap().member_count(),
        2
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn member_is_in_one_active_group_until_dissolved(ctx: &TestHarness) {
    let shared = Member::new("Rin");
    let first = ctx
        .deps
        .formation
        .create_group(NewGroup::new("first", TargetSize::Two, vec![shared.clone()]))
        .await
        .unwrap();
    let second = ctx.forming_group("second", TargetSize::Two).await;

    let err = ctx
        .deps
        .formation
        .add_member(second.id, shared.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, MatchmakingError::InvalidTransition(_)));

    ctx.deps.formation.dissolve_group(first.id).await.unwrap();
    let joined = ctx
        .deps
        .formation
        .add_member(second.id, shared)
        .await
        .unwrap();
    assert!(joined.is_complete());
    assert_eq!(ctx.events.formed().len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn matched_members_stay_bound_until_dissolved(ctx: &TestHarness) {
    let founders = vec![Member::new("x"), Member::new("y")];
    let a = ctx
        .deps
        .formation
        .create_group(NewGroup::new("a", TargetSize::Two, founders.clone()))
        .await
        .unwrap();
    let b = ctx.complete_group("b", TargetSize::Two).await;
    let c = ctx.complete_group("c", TargetSize::Two).await;

    ctx.deps.decisions.like(a.id, b.id).await.unwrap();
    assert!(ctx.deps.decisions.like(b.id, a.id).await.unwrap().matched);

    // Same people cannot reappear as a second matchable group.
    let err = ctx
        .deps
        .formation
        .create_group(NewGroup::new("a-again", TargetSize::Two, founders.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, MatchmakingError::InvalidTransition(_)));

    // The matched group is still one candidate among others for third groups.
    let seen = ctx.all_candidates(c.id, 10).await;
    assert_eq!(seen.iter().filter(|id| **id == a.id).count(), 1);
    assert_eq!(seen.len(), 2);

    ctx.deps.formation.dissolve_group(a.id).await.unwrap();
    let again = ctx
        .deps
        .formation
        .create_group(NewGroup::new("a-again", TargetSize::Two, founders))
        .await
        .unwrap();
    assert!(again.is_complete());
    assert!(!ctx.all_candidates(c.id, 10).await.contains(&a.id));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn dissolved_group_leaves_candidate_lists(ctx: &TestHarness) {
    let me = ctx.complete_group("me", TargetSize::Two).await;
    let other = ctx.complete_group("other", TargetSize::Two).await;
    assert_eq!(ctx.all_candidates(me.id, 10).await, vec![other.id]);

    ctx.deps.formation.dissolve_group(other.id).await.unwrap();
    assert!(ctx.all_candidates(me.id, 10).await.is_empty());

    let err = ctx.deps.decisions.like(me.id, other.id).await.unwrap_err();
    assert!(matches!(err, MatchmakingError::InvalidState(_)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn formation_events_reach_the_stream_hub(ctx: &TestHarness) {
    let _relay = ctx.deps.spawn_relays();
    let mut all = ctx.deps.stream_hub.subscribe(MATCHMAKING_TOPIC);

    let group = ctx.forming_group("live", TargetSize::Two).await;
    let mut mine = ctx.deps.stream_hub.subscribe(&group_topic(group.id));
    ctx.deps
        .formation
        .add_member(group.id, Member::new("late"))
        .await
        .unwrap();

    let mut types = Vec::new();
    while types.len() < 3 {
        let value = tokio::time::timeout(Duration::from_secs(1), all.recv())
            .await
            .expect("stream event")
            .unwrap();
        types.push(value["type"].as_str().unwrap().to_string());
    }
    assert!(types.contains(&"bubble_formed".to_string()));
    assert_eq!(
        types.iter().filter(|t| *t == "membership_changed").count(),
        2
    );

    let own = tokio::time::timeout(Duration::from_secs(1), mine.recv())
        .await
        .expect("group event")
        .unwrap();
    assert_eq!(own["group_id"], group.id.to_string());
}
