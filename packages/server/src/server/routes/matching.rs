//! Candidate discovery, like/pass and match lookup.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::common::{GroupId, MatchId, PageArgs};
use crate::domains::matching::models::{LikeResult, Match};
use crate::domains::matching::CandidatePage;
use crate::server::app::AppState;
use crate::server::error::ApiResult;

/// `GET /groups/:group_id/candidates?first=&after=`
///
/// `first` defaults to the configured page size and is clamped to 1..=50;
/// `after` is the `next_cursor` of the previous page.
pub async fn list_candidates(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
    Query(args): Query<PageArgs>,
) -> ApiResult<Json<CandidatePage>> {
    let args = PageArgs {
        first: args.first.or(Some(state.deps.page_size as i64)),
        after: args.after,
    }
    .validate()?;

    let page = state
        .deps
        .candidates
        .fetch_candidates(group_id, args.limit, args.cursor.as_ref())
        .await?;
    Ok(Json(page))
}

pub async fn like(
    Extension(state): Extension<AppState>,
    Path((group_id, target_id)): Path<(GroupId, GroupId)>,
) -> ApiResult<Json<LikeResult>> {
    let result = state.deps.decisions.like(group_id, target_id).await?;
    Ok(Json(result))
}

pub async fn pass(
    Extension(state): Extension<AppState>,
    Path((group_id, target_id)): Path<(GroupId, GroupId)>,
) -> ApiResult<StatusCode> {
    state.deps.decisions.pass(group_id, target_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_match(
    Extension(state): Extension<AppState>,
    Path(match_id): Path<MatchId>,
) -> ApiResult<Json<Match>> {
    let record = state.deps.decisions.get_match(match_id).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
pub struct BadgeResponse {
    group_id: GroupId,
    unseen_matches: usize,
}

pub async fn get_badge(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> Json<BadgeResponse> {
    Json(BadgeResponse {
        group_id,
        unseen_matches: state.deps.badges.unseen(group_id),
    })
}

pub async fn clear_badge(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> StatusCode {
    state.deps.badges.clear(group_id);
    StatusCode::NO_CONTENT
}
