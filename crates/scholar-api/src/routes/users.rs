//! Account management for school administrators.
//!
//! Teacher and parent logins are created with their records; this module
//! handles the administrative roles. Accounts are never deleted, only
//! deactivated.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ADMINS, TENANT_ADMINS};
use scholar_core::auth::{Role, User, UserFilter};
use scholar_core::db::create_user_repository;
use scholar_core::hash_password;

use super::{initial_password, visible};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

/// Creates the user management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user))
        .route("/:id/activate", post(activate_user))
        .route("/:id/deactivate", post(deactivate_user))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

/// Request to create an administrative account.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Generated when omitted and returned once in the response.
    pub password: Option<String>,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    /// `school_admin` or `principal`.
    pub role: String,
    /// Required when a super admin creates the account.
    pub school_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Users retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<UserQuery>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::User, list.school_id);

    let filter = UserFilter {
        role: query.role.as_deref().and_then(|r| r.parse().ok()),
        is_active: query.is_active,
        search: list.search(),
    };
    let users = create_user_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Users retrieved successfully").page("users", &users)
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::User, scope.school_id);
    let user = visible(
        create_user_repository(&state.db).find(&predicate, id).await?,
        ResourceKind::User,
    )?;

    Reply::ok("User retrieved successfully").with("user", &user)
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateUserRequest>,
) -> ApiResult<Reply> {
    caller.require(TENANT_ADMINS)?;
    request.validate()?;

    let role: Role = request.role.parse().map_err(|_| {
        ApiError::validation_field("role", "invalid", "Role must be school_admin or principal")
    })?;
    if !matches!(role, Role::SchoolAdmin | Role::Principal) {
        return Err(ApiError::validation_field(
            "role",
            "invalid",
            "Role must be school_admin or principal",
        ));
    }
    let school_id = caller.target_school(&state, request.school_id).await?;

    let (password, generated) = initial_password(request.password)?;

    let users = create_user_repository(&state.db);
    if users.email_taken(&request.email).await? {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let user = User::new(
        &request.email,
        hash_password(&password)?,
        request.first_name,
        request.last_name,
        role,
        Some(school_id),
    );
    let user = users.create(&user).await?;

    info!(
        user_id = %user.id,
        role = %user.role,
        school_id = %school_id,
        created_by = %caller.user.id,
        "User created"
    );

    let reply = Reply::created("User created successfully").with("user", &user)?;
    if generated {
        reply.with("temporaryPassword", &password)
    } else {
        Ok(reply)
    }
}

async fn set_active(
    state: &AppState,
    caller: &CurrentUser,
    id: Uuid,
    active: bool,
) -> ApiResult<User> {
    caller.require(TENANT_ADMINS)?;
    if id == caller.user.id && !active {
        return Err(ApiError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let predicate = caller.filter(ResourceKind::User, None);
    let users = create_user_repository(&state.db);
    let target = visible(users.find(&predicate, id).await?, ResourceKind::User)?;
    if target.role == Role::SuperAdmin && !caller.identity.is_super_admin() {
        return Err(ApiError::not_found(ResourceKind::User.label()));
    }

    let user = users.set_active(target.id, active).await?;
    info!(user_id = %user.id, active, changed_by = %caller.user.id, "Account status changed");
    Ok(user)
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/activate",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User activated successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
pub async fn activate_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    let user = set_active(&state, &caller, id, true).await?;
    Reply::ok("User activated successfully").with("user", &user)
}

#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/deactivate",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deactivated successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    let user = set_active(&state, &caller, id, false).await?;
    Reply::ok("User deactivated successfully").with("user", &user)
}
