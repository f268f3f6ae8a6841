//! Browsing-session endpoints.
//!
//! Every call answers with the session snapshot after the operation, so a
//! client can render straight from the response.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::common::GroupId;
use crate::domains::matching::models::LikeResult;
use crate::domains::session::SessionState;
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Serialize)]
pub struct LikeResponse {
    #[serde(flatten)]
    pub result: LikeResult,
    pub session: SessionState,
}

/// Open (or reuse) the group's session and load its first page.
pub async fn open_session(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<SessionState>> {
    let (session, created) = state.deps.sessions.open_tracked(group_id);
    if let Err(e) = session.load().await {
        // Drop a session this call created if it never loaded; one that
        // already existed belongs to someone else.
        if created {
            state.deps.sessions.discard(&session);
        }
        return Err(e.into());
    }
    Ok(Json(session.snapshot()))
}

pub async fn get_session(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<SessionState>> {
    let session = state.deps.sessions.get(group_id)?;
    Ok(Json(session.snapshot()))
}

pub async fn load_more(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<SessionState>> {
    let session = state.deps.sessions.get(group_id)?;
    session.load_more().await?;
    Ok(Json(session.snapshot()))
}

pub async fn refetch(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<SessionState>> {
    let session = state.deps.sessions.get(group_id)?;
    session.refetch().await?;
    Ok(Json(session.snapshot()))
}

pub async fn like(
    Extension(state): Extension<AppState>,
    Path((group_id, target_id)): Path<(GroupId, GroupId)>,
) -> ApiResult<Json<LikeResponse>> {
    let session = state.deps.sessions.get(group_id)?;
    let result = session.like_group(target_id).await?;
    Ok(Json(LikeResponse {
        result,
        session: session.snapshot(),
    }))
}

/// The pass itself completes in the background.
pub async fn pass(
    Extension(state): Extension<AppState>,
    Path((group_id, target_id)): Path<(GroupId, GroupId)>,
) -> ApiResult<(StatusCode, Json<SessionState>)> {
    let session = state.deps.sessions.get(group_id)?;
    // Detached; failures are logged by the session.
    let _ = session.pass_group(target_id)?;
    Ok((StatusCode::ACCEPTED, Json(session.snapshot())))
}

pub async fn close_session(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> StatusCode {
    if state.deps.sessions.close(group_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
