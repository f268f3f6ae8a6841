//! Group formation endpoints.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::common::{GroupId, MemberId};
use crate::domains::groups::models::{FormationState, Group, Member, NewGroup, TargetSize};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct MemberInput {
    /// Existing member id; a new one is minted when absent.
    pub id: Option<MemberId>,
    pub name: String,
    pub avatar_ref: Option<String>,
}

impl From<MemberInput> for Member {
    fn from(input: MemberInput) -> Self {
        Member {
            id: input.id.unwrap_or_default(),
            name: input.name,
            avatar_ref: input.avatar_ref,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub target_size: TargetSize,
    pub members: Vec<MemberInput>,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    #[serde(flatten)]
    pub group: Group,
    pub formation: FormationState,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            formation: group.formation_state(),
            group,
        }
    }
}

pub async fn create_group(
    Extension(state): Extension<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<GroupResponse>)> {
    let founders = request.members.into_iter().map(Member::from).collect();
    let group = state
        .deps
        .formation
        .create_group(NewGroup::new(request.name, request.target_size, founders))
        .await?;
    Ok((StatusCode::CREATED, Json(group.into())))
}

pub async fn add_member(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
    Json(member): Json<MemberInput>,
) -> ApiResult<Json<GroupResponse>> {
    let group = state
        .deps
        .formation
        .add_member(group_id, member.into())
        .await?;
    Ok(Json(group.into()))
}

pub async fn get_group(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<GroupResponse>> {
    let group = state.deps.formation.get_group(group_id).await?;
    Ok(Json(group.into()))
}

pub async fn dissolve_group(
    Extension(state): Extension<AppState>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<GroupResponse>> {
    let group = state.deps.formation.dissolve_group(group_id).await?;
    // Its browsing session, if any, is over.
    state.deps.sessions.close(group_id);
    Ok(Json(group.into()))
}
