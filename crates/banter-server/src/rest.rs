//! REST surface.
//!
//! Thin read-through wrappers over the routing engine's query surface plus
//! the administrative group/member/message operations. Typed engine errors
//! map to 400 with a JSON error body (validation, conflict, authorization);
//! backend failures map to 500.

use crate::handlers::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use banter_core::{
    DirectoryError, EngineError, GroupUpdate, User, Visibility,
};
use banter_protocol::{ChatEvent, EventId, GroupId, GroupSummary};
use banter_store::LogError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// All REST routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat/history", get(chat_history))
        .route("/api/chat/history/recent", get(chat_recent))
        .route("/api/chat/history/public", get(chat_public))
        .route("/api/chat/history/private/:user1/:user2", get(chat_private))
        .route("/api/users", post(register_user))
        .route("/api/users/online", get(online_users))
        .route("/api/users/online/count", get(online_count))
        .route("/api/users/search", get(search_users))
        .route("/api/groups", post(create_group))
        .route("/api/groups/public", get(public_groups))
        .route("/api/groups/public/search", get(search_public_groups))
        .route("/api/groups/user/:username", get(user_groups))
        .route(
            "/api/groups/:id",
            get(get_group).put(update_group).delete(delete_group),
        )
        .route(
            "/api/groups/:id/members",
            post(add_member).delete(remove_member),
        )
        .route("/api/groups/:id/members/count", get(member_count))
        .route("/api/groups/:id/members/:username", get(check_membership))
        .route("/api/groups/:id/messages", get(group_messages))
        .route("/api/groups/:id/messages/recent", get(group_messages_recent))
        .route("/api/groups/:id/messages/since", get(group_messages_since))
        .route("/api/groups/:id/messages/search", get(group_messages_search))
        .route("/api/groups/:id/messages/count", get(group_messages_count))
        .route("/api/messages/:id", put(edit_message).delete(delete_message))
}

/// API error: a status code plus a JSON error body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let status = match &error {
            // Backend failures are the only unexpected errors.
            EngineError::Storage(LogError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(error: DirectoryError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, error = %self.message, "Request failed");
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;
type Events = Json<Vec<Arc<ChatEvent>>>;

// ---- Chat history -----------------------------------------------------------

async fn chat_history(State(state): State<Arc<AppState>>) -> ApiResult<Events> {
    Ok(Json(state.engine.history().await?))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: usize,
    size: Option<usize>,
}

async fn chat_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Events> {
    let size = query
        .size
        .unwrap_or(state.config.limits.history_page_size)
        .min(state.config.limits.max_history_page_size);
    Ok(Json(state.engine.recent(query.page, size).await?))
}

async fn chat_public(State(state): State<Arc<AppState>>) -> ApiResult<Events> {
    Ok(Json(state.engine.public_history().await?))
}

async fn chat_private(
    State(state): State<Arc<AppState>>,
    Path((user1, user2)): Path<(String, String)>,
) -> ApiResult<Events> {
    Ok(Json(state.engine.private_history(&user1, &user2).await?))
}

// ---- Users ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.directory.register(&request.username)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn online_users(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let mut users = state.presence.snapshot();
    users.sort();
    Json(users)
}

async fn online_count(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "count": state.presence.count() }))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: String,
}

async fn search_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<User>> {
    Json(state.directory.search(&query.query))
}

// ---- Groups -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner: String,
}

#[derive(Debug, Deserialize)]
struct UsernameQuery {
    username: String,
}

#[derive(Debug, Deserialize)]
struct CreateGroupRequest {
    name: String,
    #[serde(default)]
    description: String,
    visibility: Option<Visibility>,
    max_members: Option<usize>,
}

async fn create_group(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<GroupSummary>)> {
    let group = state
        .engine
        .create_group(
            &request.name,
            &request.description,
            &query.owner,
            request.visibility.unwrap_or(Visibility::Public),
            request.max_members,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(group.summary())))
}

async fn public_groups(State(state): State<Arc<AppState>>) -> Json<Vec<GroupSummary>> {
    Json(summaries(state.groups.public_groups()))
}

async fn search_public_groups(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<GroupSummary>> {
    Json(summaries(state.groups.search_public(&query.query)))
}

async fn user_groups(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Json<Vec<GroupSummary>> {
    Json(summaries(state.groups.groups_for_user(&username)))
}

async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
) -> ApiResult<Json<GroupSummary>> {
    state
        .groups
        .get(id)
        .map(|g| Json(g.summary()))
        .ok_or_else(|| ApiError::not_found(format!("Group not found: {id}")))
}

#[derive(Debug, Deserialize)]
struct UpdateGroupRequest {
    name: Option<String>,
    description: Option<String>,
    max_members: Option<usize>,
}

async fn update_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<UsernameQuery>,
    Json(request): Json<UpdateGroupRequest>,
) -> ApiResult<Json<GroupSummary>> {
    let group = state.engine.update_group(
        id,
        &query.username,
        GroupUpdate {
            name: request.name,
            description: request.description,
            max_members: request.max_members,
        },
    )?;
    Ok(Json(group.summary()))
}

async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.deactivate_group(id, &query.username)?;
    Ok(Json(json!({ "message": "Group deactivated" })))
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<GroupSummary>> {
    let group = state.engine.add_member(id, &query.username).await?;
    Ok(Json(group.summary()))
}

async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<GroupSummary>> {
    let group = state.engine.remove_member(id, &query.username).await?;
    Ok(Json(group.summary()))
}

async fn check_membership(
    State(state): State<Arc<AppState>>,
    Path((id, username)): Path<(GroupId, String)>,
) -> Json<serde_json::Value> {
    Json(json!({ "is_member": state.groups.is_member(id, &username) }))
}

async fn member_count(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state
        .groups
        .member_count(id)
        .map_err(EngineError::from)?;
    Ok(Json(json!({ "count": count })))
}

// ---- Group messages ---------------------------------------------------------

async fn group_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Events> {
    Ok(Json(state.engine.group_history(id, &query.username).await?))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    username: String,
    limit: Option<usize>,
}

async fn group_messages_recent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Events> {
    let limit = query
        .limit
        .unwrap_or(state.config.limits.history_page_size)
        .min(state.config.limits.max_history_page_size);
    Ok(Json(
        state.engine.group_recent(id, &query.username, limit).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
    username: String,
    since: u64,
}

async fn group_messages_since(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<SinceQuery>,
) -> ApiResult<Events> {
    Ok(Json(
        state
            .engine
            .group_since(id, &query.username, query.since)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct GroupSearchQuery {
    username: String,
    query: String,
}

async fn group_messages_search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
    Query(query): Query<GroupSearchQuery>,
) -> ApiResult<Events> {
    Ok(Json(
        state
            .engine
            .group_search(id, &query.username, &query.query)
            .await?,
    ))
}

async fn group_messages_count(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GroupId>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.engine.group_count(id).await?;
    Ok(Json(json!({ "count": count })))
}

// ---- Message editing --------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EditMessageRequest {
    content: String,
    editor: String,
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EventId>,
    Json(request): Json<EditMessageRequest>,
) -> ApiResult<Json<Arc<ChatEvent>>> {
    let event = state
        .engine
        .edit_message(id, &request.content, &request.editor)
        .await?;
    Ok(Json(event))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EventId>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.delete_message(id, &query.username).await?;
    Ok(Json(json!({ "message": "Message deleted" })))
}

fn summaries(groups: Vec<banter_core::Group>) -> Vec<GroupSummary> {
    groups.iter().map(banter_core::Group::summary).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_core::GroupError;

    #[test]
    fn test_error_status_mapping() {
        let conflict: ApiError = EngineError::from(GroupError::DuplicateName("devs".into())).into();
        assert_eq!(conflict.status, StatusCode::BAD_REQUEST);

        let forbidden: ApiError = EngineError::Forbidden("edit this message").into();
        assert_eq!(forbidden.status, StatusCode::BAD_REQUEST);

        let backend: ApiError =
            EngineError::Storage(LogError::Backend("disk on fire".into())).into();
        assert_eq!(backend.status, StatusCode::INTERNAL_SERVER_ERROR);

        let missing = ApiError::not_found("Group not found: 9");
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }
}
