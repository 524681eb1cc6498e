/// Group chat administration
///
/// - `GET    /api/groups`
/// - `POST   /api/groups`
/// - `GET    /api/groups/:id`
/// - `PUT    /api/groups/:id`
/// - `DELETE /api/groups/:id`
/// - `POST   /api/groups/:id/members`
/// - `DELETE /api/groups/:id/members/:user_id`
///
/// A group is administered by its admins (the creator to begin with) or by
/// anyone holding `groups:manage`. Any participant may leave.

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use nexusflow_shared::{
    auth::{
        authorization::{load_principal, require_active_member, AuthzError},
        middleware::AuthContext,
    },
    models::{
        chat::{ChatParticipant, ChatRoom, ChatRoomKind, ChatRoomSummary},
        role::Permission,
        user::User,
    },
};
use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

use super::chat::RoomDetail;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "Group name must be 1-100 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 200, message = "Too many members"))]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RenameGroupRequest {
    #[validate(length(min = 1, max = 100, message = "Group name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMembersRequest {
    #[validate(length(min = 1, max = 200, message = "Provide 1-200 user IDs"))]
    pub user_ids: Vec<Uuid>,
}

fn distinct(ids: &[Uuid]) -> Vec<Uuid> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Rejects ID lists naming anyone outside the organization or deactivated
async fn require_colleagues(state: &AppState, organization_id: Uuid, ids: &[Uuid]) -> ApiResult<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let found = User::count_members(&state.db, organization_id, ids).await?;
    if found != ids.len() as i64 {
        return Err(ApiError::invalid(
            "member_ids",
            "Every member must be an active user of your organization",
        ));
    }
    Ok(())
}

/// Loads a group of the caller's organization. Every per-group handler goes
/// through here, so a deactivated caller is refused before any admin check.
async fn find_group(state: &AppState, auth: &AuthContext, group_id: Uuid) -> ApiResult<ChatRoom> {
    require_active_member(&state.db, auth).await?;

    ChatRoom::find_by_id_and_org(&state.db, group_id, auth.organization_id)
        .await?
        .filter(|room| room.kind == ChatRoomKind::Group)
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))
}

async fn can_administer(state: &AppState, auth: &AuthContext, group: &ChatRoom) -> ApiResult<bool> {
    if ChatParticipant::is_admin(&state.db, group.id, auth.user_id).await? {
        return Ok(true);
    }
    Ok(load_principal(&state.db, auth).await?.can(Permission::GroupsManage))
}

async fn require_admin(state: &AppState, auth: &AuthContext, group: &ChatRoom) -> ApiResult<()> {
    if can_administer(state, auth, group).await? {
        Ok(())
    } else {
        Err(AuthzError::NotAuthorized.into())
    }
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ChatRoomSummary>>> {
    require_active_member(&state.db, &auth).await?;
    let groups = ChatRoom::list_for_user(&state.db, auth.user_id, Some(ChatRoomKind::Group)).await?;
    Ok(Json(groups))
}

/// Create a group
///
/// ```text
/// POST /api/groups
/// { "name": "Design", "member_ids": ["uuid", "uuid"] }
/// ```
///
/// The caller joins as admin. Members must be active users of the caller's
/// organization; duplicates and the caller's own ID are ignored.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: bad name, or a member outside the organization
pub async fn create_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<RoomDetail>)> {
    validate_request(&req)?;
    require_active_member(&state.db, &auth).await?;

    let members: Vec<Uuid> = distinct(&req.member_ids)
        .into_iter()
        .filter(|id| *id != auth.user_id)
        .collect();
    require_colleagues(&state, auth.organization_id, &members).await?;

    let room = ChatRoom::create_group(
        &state.db,
        auth.organization_id,
        auth.user_id,
        req.name.trim(),
        &members,
    )
    .await?;

    tracing::info!(
        group_id = %room.id,
        organization_id = %auth.organization_id,
        members = members.len() + 1,
        "Group created"
    );

    let participants = ChatParticipant::list(&state.db, room.id).await?;
    Ok((StatusCode::CREATED, Json(RoomDetail { room, participants })))
}

pub async fn get_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<RoomDetail>> {
    let group = find_group(&state, &auth, group_id).await?;

    if !ChatParticipant::is_participant(&state.db, group.id, auth.user_id).await? {
        require_admin(&state, &auth, &group).await?;
    }

    let participants = ChatParticipant::list(&state.db, group.id).await?;
    Ok(Json(RoomDetail {
        room: group,
        participants,
    }))
}

pub async fn rename_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<RenameGroupRequest>,
) -> ApiResult<Json<ChatRoom>> {
    validate_request(&req)?;
    let group = find_group(&state, &auth, group_id).await?;
    require_admin(&state, &auth, &group).await?;

    let renamed = ChatRoom::rename(&state.db, group.id, req.name.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))?;

    Ok(Json(renamed))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let group = find_group(&state, &auth, group_id).await?;
    require_admin(&state, &auth, &group).await?;

    ChatRoom::delete(&state.db, group.id).await?;
    tracing::info!(group_id = %group.id, deleted_by = %auth.user_id, "Group deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<AddMembersRequest>,
) -> ApiResult<Json<Vec<ChatParticipant>>> {
    validate_request(&req)?;
    let group = find_group(&state, &auth, group_id).await?;
    require_admin(&state, &auth, &group).await?;

    let ids = distinct(&req.user_ids);
    require_colleagues(&state, auth.organization_id, &ids).await?;

    let added = ChatParticipant::add(&state.db, group.id, &ids, false).await?;
    tracing::debug!(group_id = %group.id, added, "Members added");

    Ok(Json(ChatParticipant::list(&state.db, group.id).await?))
}

/// Remove a member; participants may always remove themselves
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let group = find_group(&state, &auth, group_id).await?;

    if user_id != auth.user_id {
        require_admin(&state, &auth, &group).await?;
    }

    if !ChatParticipant::remove(&state.db, group.id, user_id).await? {
        return Err(ApiError::NotFound("Member not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_sorts_and_dedups() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ids = distinct(&[a, b, a, b, a]);

        assert_eq!(ids.len(), 2);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_create_group_validation() {
        let req: CreateGroupRequest = serde_json::from_str(r#"{"name":""}"#).unwrap();
        assert!(req.validate().is_err());

        let req: CreateGroupRequest = serde_json::from_str(r#"{"name":"Design"}"#).unwrap();
        assert!(req.validate().is_ok());
        assert!(req.member_ids.is_empty());

        let req = AddMembersRequest { user_ids: vec![] };
        assert!(req.validate().is_err());
    }
}
