//! The caller's notification inbox, plus school broadcasts.
//!
//! Inbox operations are scoped to the recipient: a notification addressed
//! to someone else is reported as missing.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ADMINS, ANY_ROLE};
use scholar_core::auth::Role;
use scholar_core::db::{create_class_repository, create_notification_repository};
use scholar_core::fanout::Audience;
use scholar_core::models::{NewNotification, NotificationCategory};

use super::{referenced, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/broadcast", post(broadcast))
        .route("/:id", get(get_notification).delete(delete_notification))
        .route("/:id/read", post(mark_read))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub school_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 5000, message = "Body is required"))]
    pub body: String,
    /// Guardians of this class only; otherwise the roles below.
    pub class_id: Option<Uuid>,
    /// Defaults to every school role.
    #[schema(value_type = Option<Vec<String>>)]
    pub roles: Option<Vec<Role>>,
}

const SCHOOL_ROLES: [Role; 4] = [Role::SchoolAdmin, Role::Principal, Role::Teacher, Role::Parent];

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    responses(
        (status = 200, description = "Notifications retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<InboxQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let notifications = create_notification_repository(&state.db)
        .list(caller.user.id, query.unread_only, &list.pagination_or(20))
        .await?;

    Reply::ok("Notifications retrieved successfully").page("notifications", &notifications)
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    responses(
        (status = 200, description = "Unread count retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Notifications"
)]
pub async fn unread_count(State(state): State<AppState>, caller: CurrentUser) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let count = create_notification_repository(&state.db)
        .unread_count(caller.user.id)
        .await?;

    Reply::ok("Unread count retrieved successfully").with("count", &count)
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/{id}",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Notifications"
)]
pub async fn get_notification(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let notification = create_notification_repository(&state.db)
        .find(caller.user.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;

    Reply::ok("Notification retrieved successfully").with("notification", &notification)
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked as read"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    if !create_notification_repository(&state.db)
        .mark_read(caller.user.id, id)
        .await?
    {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Reply::ok("Notification marked as read"))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read-all",
    responses(
        (status = 200, description = "All notifications marked as read"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Notifications"
)]
pub async fn mark_all_read(State(state): State<AppState>, caller: CurrentUser) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let updated = create_notification_repository(&state.db)
        .mark_all_read(caller.user.id)
        .await?;

    Reply::ok("All notifications marked as read").with("updated", &updated)
}

#[utoipa::path(
    delete,
    path = "/api/v1/notifications/{id}",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification deleted successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Notifications"
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    if !create_notification_repository(&state.db)
        .delete(caller.user.id, id)
        .await?
    {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Reply::ok("Notification deleted successfully"))
}

/// Announcement to a class's guardians or to chosen roles of one school.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/broadcast",
    request_body = BroadcastRequest,
    responses(
        (status = 201, description = "Announcement sent successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Notifications"
)]
pub async fn broadcast(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<BroadcastRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let audience = match request.class_id {
        Some(class_id) => {
            let class = referenced(
                create_class_repository(&state.db)
                    .find(&within(school_id), class_id)
                    .await?,
                "classId",
                ResourceKind::Class,
            )?;
            Audience::ClassGuardians(class.id)
        }
        None => {
            let roles: Vec<Role> = request
                .roles
                .unwrap_or_else(|| SCHOOL_ROLES.to_vec())
                .into_iter()
                .filter(|r| r.is_tenant_bound())
                .collect();
            if roles.is_empty() {
                return Err(ApiError::validation_field(
                    "roles",
                    "required",
                    "At least one school role is required",
                ));
            }
            Audience::School { school_id, roles }
        }
    };

    let notification = NewNotification::new(
        NotificationCategory::Announcement,
        request.title,
        request.body,
    )
    .in_school(school_id)
    .with_metadata(json!({ "sentBy": caller.user.id }));

    let recipients = state.notifier.deliver(&audience, &notification).await?;

    info!(school_id = %school_id, recipients, "Announcement broadcast");
    Reply::created("Announcement sent successfully").with("recipients", &recipients)
}
