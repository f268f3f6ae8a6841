//! Postgres-backed candidate store.
//!
//! Every mutation runs in one transaction. Calls that touch a pair of groups
//! lock both `groups` rows in id order first, so a like, a pass and a
//! promotion for the same pair never interleave.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tokio::sync::broadcast;
use tracing::debug;

use crate::common::{ChatRoomId, GroupId, MatchId, MatchmakingError, MemberId, Result};
use crate::domains::groups::models::{
    Group, Member, MembershipChange, MembershipChangeKind, NewGroup, TargetSize,
};
use crate::domains::matching::models::{ordered_pair, EdgeWrite, Match, Promotion};
use crate::kernel::BaseCandidateStore;

const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: GroupId,
    name: String,
    target_size: i16,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    dissolved_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    group_id: GroupId,
    id: MemberId,
    name: String,
    avatar_ref: Option<String>,
}

impl GroupRow {
    fn into_group(self, members: Vec<Member>) -> Result<Group> {
        let target_size = TargetSize::try_from(self.target_size).map_err(|e| {
            MatchmakingError::Internal(format!("group {} has bad target size: {}", self.id, e))
        })?;
        Ok(Group {
            id: self.id,
            name: self.name,
            target_size,
            members,
            created_at: self.created_at,
            completed_at: self.completed_at,
            dissolved_at: self.dissolved_at,
        })
    }
}

const GROUP_COLUMNS: &str = "id, name, target_size, created_at, completed_at, dissolved_at";

// =============================================================================
// Query helpers
// =============================================================================

async fn lock_group(conn: &mut PgConnection, id: GroupId) -> Result<GroupRow> {
    sqlx::query_as::<_, GroupRow>(&format!(
        "SELECT {} FROM groups WHERE id = $1 FOR UPDATE",
        GROUP_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| MatchmakingError::not_found(format!("group {}", id)))
}

/// Lock both group rows in id order.
async fn lock_pair(conn: &mut PgConnection, a: GroupId, b: GroupId) -> Result<()> {
    let (low, high) = ordered_pair(a, b);
    let locked: Vec<GroupId> =
        sqlx::query_scalar("SELECT id FROM groups WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(vec![low, high])
            .fetch_all(&mut *conn)
            .await?;

    for id in [low, high] {
        if !locked.contains(&id) {
            return Err(MatchmakingError::not_found(format!("group {}", id)));
        }
    }
    Ok(())
}

async fn load_members(
    conn: &mut PgConnection,
    group_ids: &[GroupId],
) -> Result<HashMap<GroupId, Vec<Member>>> {
    let rows = sqlx::query_as::<_, MemberRow>(
        "SELECT gm.group_id, m.id, m.name, m.avatar_ref
         FROM group_members gm
         JOIN members m ON m.id = gm.member_id
         WHERE gm.group_id = ANY($1)
         ORDER BY gm.group_id, gm.position",
    )
    .bind(group_ids.to_vec())
    .fetch_all(&mut *conn)
    .await?;

    let mut by_group: HashMap<GroupId, Vec<Member>> = HashMap::new();
    for row in rows {
        by_group.entry(row.group_id).or_default().push(Member {
            id: row.id,
            name: row.name,
            avatar_ref: row.avatar_ref,
        });
    }
    Ok(by_group)
}

async fn assemble(conn: &mut PgConnection, rows: Vec<GroupRow>) -> Result<Vec<Group>> {
    let ids: Vec<GroupId> = rows.iter().map(|r| r.id).collect();
    let mut members = load_members(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let group_members = members.remove(&row.id).unwrap_or_default();
            row.into_group(group_members)
        })
        .collect()
}

/// Upsert the member row and point it at `group_id`.
///
/// Fails with `InvalidTransition` when the member is already active elsewhere.
async fn claim_member(conn: &mut PgConnection, member: &Member, group_id: GroupId) -> Result<()> {
    sqlx::query(
        "INSERT INTO members (id, name, avatar_ref)
         VALUES ($1, $2, $3)
         ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, avatar_ref = EXCLUDED.avatar_ref",
    )
    .bind(member.id)
    .bind(&member.name)
    .bind(&member.avatar_ref)
    .execute(&mut *conn)
    .await?;

    let claimed: Option<MemberId> = sqlx::query_scalar(
        "UPDATE members SET active_group_id = $2
         WHERE id = $1 AND (active_group_id IS NULL OR active_group_id = $2)
         RETURNING id",
    )
    .bind(member.id)
    .bind(group_id)
    .fetch_optional(&mut *conn)
    .await?;

    match claimed {
        Some(_) => Ok(()),
        None => Err(MatchmakingError::invalid_transition(format!(
            "member {} already belongs to another active group",
            member.id
        ))),
    }
}

async fn release_members(conn: &mut PgConnection, group_id: GroupId) -> Result<()> {
    sqlx::query("UPDATE members SET active_group_id = NULL WHERE active_group_id = $1")
        .bind(group_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_membership(
    conn: &mut PgConnection,
    group_id: GroupId,
    member_id: MemberId,
    position: usize,
) -> Result<()> {
    sqlx::query("INSERT INTO group_members (group_id, member_id, position) VALUES ($1, $2, $3)")
        .bind(group_id)
        .bind(member_id)
        .bind(position as i16)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn select_match(conn: &mut PgConnection, a: GroupId, b: GroupId) -> Result<Option<Match>> {
    let (low, high) = ordered_pair(a, b);
    Ok(sqlx::query_as::<_, Match>(
        "SELECT id, group_a_id, group_b_id, chat_room_id, created_at
         FROM matches WHERE group_a_id = $1 AND group_b_id = $2",
    )
    .bind(low)
    .bind(high)
    .fetch_optional(&mut *conn)
    .await?)
}

async fn edge_exists(
    conn: &mut PgConnection,
    table: &str,
    from: GroupId,
    to: GroupId,
) -> Result<bool> {
    Ok(sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE from_group_id = $1 AND to_group_id = $2)",
        table
    ))
    .bind(from)
    .bind(to)
    .fetch_one(&mut *conn)
    .await?)
}

/// Insert a like or pass edge after checking the opposite decision is absent.
async fn write_edge(
    pool: &PgPool,
    table: &str,
    opposite: &str,
    from: GroupId,
    to: GroupId,
) -> Result<EdgeWrite> {
    let mut tx = pool.begin().await?;
    lock_pair(&mut tx, from, to).await?;

    if edge_exists(&mut tx, opposite, from, to).await? {
        return Err(MatchmakingError::invalid_transition(format!(
            "group {} already decided on {}",
            from, to
        )));
    }

    let inserted = sqlx::query(&format!(
        "INSERT INTO {} (from_group_id, to_group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        table
    ))
    .bind(from)
    .bind(to)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    Ok(if inserted == 1 {
        EdgeWrite::Created
    } else {
        EdgeWrite::AlreadyExists
    })
}

// =============================================================================
// PgCandidateStore
// =============================================================================

#[derive(Clone)]
pub struct PgCandidateStore {
    pool: PgPool,
    changes: broadcast::Sender<MembershipChange>,
}

impl PgCandidateStore {
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn announce(&self, change: &MembershipChange) {
        let _ = self.changes.send(change.clone());
    }
}

#[async_trait]
impl BaseCandidateStore for PgCandidateStore {
    async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {} FROM groups WHERE id = $1",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(assemble(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn insert_group(&self, new_group: NewGroup) -> Result<MembershipChange> {
        new_group.validate()?;
        let complete = new_group.founders.len() == new_group.target_size.get();

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "INSERT INTO groups (id, name, target_size, completed_at)
             VALUES ($1, $2, $3, CASE WHEN $4 THEN NOW() END)
             ON CONFLICT (id) DO NOTHING
             RETURNING {}",
            GROUP_COLUMNS
        ))
        .bind(new_group.id)
        .bind(new_group.name.trim())
        .bind(new_group.target_size.get() as i16)
        .bind(complete)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            MatchmakingError::invalid_transition(format!("group {} already exists", new_group.id))
        })?;

        for (position, founder) in new_group.founders.iter().enumerate() {
            claim_member(&mut tx, founder, new_group.id).await?;
            insert_membership(&mut tx, new_group.id, founder.id, position).await?;
        }
        tx.commit().await?;

        let change = MembershipChange {
            kind: MembershipChangeKind::Created,
            previous_count: 0,
            group: row.into_group(new_group.founders)?,
        };
        debug!(group_id = %change.group.id, members = change.group.member_count(), "group inserted");
        self.announce(&change);
        Ok(change)
    }

    async fn add_member(&self, group_id: GroupId, member: Member) -> Result<MembershipChange> {
        let mut tx = self.pool.begin().await?;
        let row = lock_group(&mut tx, group_id).await?;
        let members = load_members(&mut tx, &[group_id])
            .await?
            .remove(&group_id)
            .unwrap_or_default();
        let mut group = row.into_group(members)?;
        let previous_count = group.member_count();

        if group.is_dissolved() {
            return Err(MatchmakingError::invalid_state(format!(
                "group {} is dissolved",
                group_id
            )));
        }
        if group.has_member(member.id) {
            return Ok(MembershipChange {
                kind: MembershipChangeKind::Unchanged,
                previous_count,
                group,
            });
        }
        if group.is_complete() {
            return Err(MatchmakingError::invalid_transition(format!(
                "group {} already has {} members",
                group_id,
                group.target_size.get()
            )));
        }

        claim_member(&mut tx, &member, group_id).await?;
        insert_membership(&mut tx, group_id, member.id, previous_count).await?;
        group.members.push(member);

        if group.is_complete() {
            let completed_at: DateTime<Utc> = sqlx::query_scalar(
                "UPDATE groups SET completed_at = NOW() WHERE id = $1 RETURNING completed_at",
            )
            .bind(group_id)
            .fetch_one(&mut *tx)
            .await?;
            group.completed_at = Some(completed_at);
        }
        tx.commit().await?;

        let change = MembershipChange {
            kind: MembershipChangeKind::MemberAdded,
            previous_count,
            group,
        };
        self.announce(&change);
        Ok(change)
    }

    async fn dissolve_group(&self, id: GroupId) -> Result<MembershipChange> {
        let mut tx = self.pool.begin().await?;
        let row = lock_group(&mut tx, id).await?;
        let members = load_members(&mut tx, &[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        let mut group = row.into_group(members)?;
        let previous_count = group.member_count();

        if group.is_dissolved() {
            return Ok(MembershipChange {
                kind: MembershipChangeKind::Unchanged,
                previous_count,
                group,
            });
        }

        let dissolved_at: DateTime<Utc> = sqlx::query_scalar(
            "UPDATE groups SET dissolved_at = NOW() WHERE id = $1 RETURNING dissolved_at",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        release_members(&mut tx, id).await?;
        tx.commit().await?;

        group.dissolved_at = Some(dissolved_at);
        let change = MembershipChange {
            kind: MembershipChangeKind::Dissolved,
            previous_count,
            group,
        };
        self.announce(&change);
        Ok(change)
    }

    async fn query_candidates(
        &self,
        group_id: GroupId,
        after: Option<GroupId>,
        limit: usize,
    ) -> Result<Vec<Group>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT g.id, g.name, g.target_size, g.created_at, g.completed_at, g.dissolved_at
             FROM groups g
             WHERE g.id <> $1
               AND g.completed_at IS NOT NULL
               AND g.dissolved_at IS NULL
               AND ($2::uuid IS NULL OR g.id > $2)
               AND NOT EXISTS (
                   SELECT 1 FROM group_likes l
                   WHERE l.from_group_id = $1 AND l.to_group_id = g.id
               )
               AND NOT EXISTS (
                   SELECT 1 FROM group_passes p
                   WHERE p.from_group_id = $1 AND p.to_group_id = g.id
               )
               AND NOT EXISTS (
                   SELECT 1 FROM matches m
                   WHERE (m.group_a_id = $1 AND m.group_b_id = g.id)
                      OR (m.group_b_id = $1 AND m.group_a_id = g.id)
               )
             ORDER BY g.id
             LIMIT $3",
        )
        .bind(group_id)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;

        assemble(&mut conn, rows).await
    }

    async fn create_like_edge(&self, from: GroupId, to: GroupId) -> Result<EdgeWrite> {
        write_edge(&self.pool, "group_likes", "group_passes", from, to).await
    }

    async fn create_pass_edge(&self, from: GroupId, to: GroupId) -> Result<EdgeWrite> {
        write_edge(&self.pool, "group_passes", "group_likes", from, to).await
    }

    async fn try_promote_match(&self, a: GroupId, b: GroupId) -> Result<Promotion> {
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, a, b).await?;

        if let Some(existing) = select_match(&mut tx, a, b).await? {
            return Ok(Promotion::Existing(existing));
        }

        let likes: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM group_likes
             WHERE (from_group_id = $1 AND to_group_id = $2)
                OR (from_group_id = $2 AND to_group_id = $1)",
        )
        .bind(a)
        .bind(b)
        .fetch_one(&mut *tx)
        .await?;
        if likes < 2 {
            return Ok(Promotion::NotMutual);
        }

        let (low, high) = ordered_pair(a, b);
        let record = sqlx::query_as::<_, Match>(
            "INSERT INTO matches (id, group_a_id, group_b_id, chat_room_id)
             VALUES ($1, $2, $3, $4)
             RETURNING id, group_a_id, group_b_id, chat_room_id, created_at",
        )
        .bind(MatchId::new())
        .bind(low)
        .bind(high)
        .bind(ChatRoomId::new())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chat_rooms (id, match_id, created_at) VALUES ($1, $2, $3)")
            .bind(record.chat_room_id)
            .bind(record.id)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(match_id = %record.id, "match row created");
        Ok(Promotion::Created(record))
    }

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>> {
        Ok(sqlx::query_as::<_, Match>(
            "SELECT id, group_a_id, group_b_id, chat_room_id, created_at
             FROM matches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_match_between(&self, a: GroupId, b: GroupId) -> Result<Option<Match>> {
        let mut conn = self.pool.acquire().await?;
        select_match(&mut conn, a, b).await
    }

    fn on_membership_changed(&self) -> broadcast::Receiver<MembershipChange> {
        self.changes.subscribe()
    }
}
