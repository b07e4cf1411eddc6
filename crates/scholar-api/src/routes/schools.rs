//! Schools (tenants) and their verification.

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

use scholar_core::access::{ResourceKind, ANY_ROLE, SUPER_ADMIN, TENANT_ADMINS};
use scholar_core::db::{create_school_repository, SchoolFilter};
use scholar_core::fanout::Audience;
use scholar_core::models::{
    NewNotification, NewSchool, NotificationCategory, SchoolUpdate, VerificationStatus,
};

use super::visible;
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_schools).post(create_school))
        .route(
            "/:id",
            get(get_school).put(update_school).delete(delete_school),
        )
        .route("/:id/verification", post(verify_school))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolQuery {
    pub verification_status: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchoolRequest {
    #[validate(length(min = 2, max = 200, message = "Name must be 2-200 characters"))]
    pub name: String,
    #[validate(length(min = 2, max = 20, message = "Code must be 2-20 characters"))]
    pub code: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchoolRequest {
    #[validate(length(min = 2, max = 200, message = "Name must be 2-200 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerificationRequest {
    /// `approved` or `rejected`.
    pub status: String,
    #[validate(length(max = 1000, message = "Note must be at most 1000 characters"))]
    pub note: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/schools",
    responses(
        (status = 200, description = "Schools retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Schools"
)]
pub async fn list_schools(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<SchoolQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::School, list.school_id);

    let filter = SchoolFilter {
        verification_status: query
            .verification_status
            .as_deref()
            .and_then(|s| s.parse().ok()),
        search: list.search(),
    };
    let schools = create_school_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Schools retrieved successfully").page("schools", &schools)
}

#[utoipa::path(
    get,
    path = "/api/v1/schools/{id}",
    params(("id" = Uuid, Path, description = "School id")),
    responses(
        (status = 200, description = "School retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "School not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Schools"
)]
pub async fn get_school(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::School, scope.school_id);
    let school = visible(
        create_school_repository(&state.db).find(&predicate, id).await?,
        ResourceKind::School,
    )?;

    Reply::ok("School retrieved successfully").with("school", &school)
}

/// Schools created by a super admin skip the verification queue.
#[utoipa::path(
    post,
    path = "/api/v1/schools",
    request_body = CreateSchoolRequest,
    responses(
        (status = 201, description = "School created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Schools"
)]
pub async fn create_school(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateSchoolRequest>,
) -> ApiResult<Reply> {
    caller.require(SUPER_ADMIN)?;
    request.validate()?;

    let schools = create_school_repository(&state.db);
    if schools.code_taken(&request.code, None).await? {
        return Err(ApiError::Conflict("School code already exists".to_string()));
    }

    let school = schools
        .create(&NewSchool {
            name: request.name.trim().to_string(),
            code: request.code,
            email: request.email,
            phone: request.phone,
            address: request.address,
            verification_status: VerificationStatus::Approved,
        })
        .await?;

    info!(school_id = %school.id, code = %school.code, "School created");
    Reply::created("School created successfully").with("school", &school)
}

#[utoipa::path(
    put,
    path = "/api/v1/schools/{id}",
    params(("id" = Uuid, Path, description = "School id")),
    request_body = UpdateSchoolRequest,
    responses(
        (status = 200, description = "School updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "School not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Schools"
)]
pub async fn update_school(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateSchoolRequest>,
) -> ApiResult<Reply> {
    caller.require(TENANT_ADMINS)?;
    let predicate = caller.filter(ResourceKind::School, None);
    let schools = create_school_repository(&state.db);
    let existing = visible(schools.find(&predicate, id).await?, ResourceKind::School)?;
    request.validate()?;

    let school = schools
        .update(
            existing.id,
            &SchoolUpdate {
                name: request.name.map(|n| n.trim().to_string()),
                email: request.email,
                phone: request.phone,
                address: request.address,
            },
        )
        .await?;

    info!(school_id = %school.id, "School updated");
    Reply::ok("School updated successfully").with("school", &school)
}

#[utoipa::path(
    delete,
    path = "/api/v1/schools/{id}",
    params(("id" = Uuid, Path, description = "School id")),
    responses(
        (status = 200, description = "School deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "School not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Schools"
)]
pub async fn delete_school(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(SUPER_ADMIN)?;
    let schools = create_school_repository(&state.db);
    let school = visible(schools.get(id).await?, ResourceKind::School)?;

    ApiError::ensure_clear("school", schools.dependents(school.id).await?)?;
    schools.delete(school.id).await?;

    info!(school_id = %school.id, "School deleted");
    Ok(Reply::ok("School deleted successfully"))
}

/// Approves or rejects a school and tells its administrators.
#[utoipa::path(
    post,
    path = "/api/v1/schools/{id}/verification",
    params(("id" = Uuid, Path, description = "School id")),
    request_body = VerificationRequest,
    responses(
        (status = 200, description = "School verification updated"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "School not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Schools"
)]
pub async fn verify_school(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<VerificationRequest>,
) -> ApiResult<Reply> {
    caller.require(SUPER_ADMIN)?;
    request.validate()?;

    let status: VerificationStatus = request.status.parse().map_err(|_| {
        ApiError::validation_field("status", "invalid", "Status must be approved or rejected")
    })?;
    if status == VerificationStatus::Pending {
        return Err(ApiError::validation_field(
            "status",
            "invalid",
            "Status must be approved or rejected",
        ));
    }

    let schools = create_school_repository(&state.db);
    let school = visible(schools.get(id).await?, ResourceKind::School)?;
    let school = schools
        .set_verification(school.id, status, request.note.as_deref())
        .await?;

    info!(
        school_id = %school.id,
        status = %status,
        verified_by = %caller.user.id,
        "School verification updated"
    );

    let body = match status {
        VerificationStatus::Approved => format!("{} has been approved.", school.name),
        _ => format!(
            "{} was not approved. {}",
            school.name,
            request.note.as_deref().unwrap_or_default()
        ),
    };
    let notification = NewNotification::new(
        NotificationCategory::Verification,
        "School verification",
        body.trim_end(),
    )
    .in_school(school.id)
    .with_metadata(json!({ "schoolId": school.id, "status": status }));
    state
        .notifier
        .notify(&Audience::school_admins(school.id), &notification)
        .await;

    Reply::ok("School verification updated").with("school", &school)
}
