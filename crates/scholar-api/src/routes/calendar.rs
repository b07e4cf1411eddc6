//! Academic years and their terms.

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ADMINS, ANY_ROLE};
use scholar_core::db::create_calendar_repository;
use scholar_core::models::{AcademicYearUpdate, NewAcademicYear, NewTerm, TermUpdate};

use super::{referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/years", get(list_years).post(create_year))
        .route(
            "/years/:id",
            get(get_year).put(update_year).delete(delete_year),
        )
        .route("/terms", get(list_terms).post(create_term))
        .route(
            "/terms/:id",
            get(get_term).put(update_term).delete(delete_term),
        )
}

fn ensure_ordered(start: NaiveDate, end: NaiveDate) -> ApiResult<()> {
    if end <= start {
        return Err(ApiError::validation_field(
            "endDate",
            "range",
            "End date must be after start date",
        ));
    }
    Ok(())
}

// ============================================================================
// Academic years
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateYearRequest {
    pub school_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50, message = "Name is required"))]
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_current: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateYearRequest {
    #[validate(length(min = 1, max = 50, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_current: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/v1/academic-calendar/years",
    responses(
        (status = 200, description = "Academic years retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn list_years(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::AcademicYear, list.school_id);
    let years = create_calendar_repository(&state.db)
        .list_years(&predicate, &list.pagination())
        .await?;

    Reply::ok("Academic years retrieved successfully").page("academicYears", &years)
}

#[utoipa::path(
    get,
    path = "/api/v1/academic-calendar/years/{id}",
    params(("id" = Uuid, Path, description = "Academic year id")),
    responses(
        (status = 200, description = "Academic year retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Academic year not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn get_year(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::AcademicYear, scope.school_id);
    let year = visible(
        create_calendar_repository(&state.db)
            .find_year(&predicate, id)
            .await?,
        ResourceKind::AcademicYear,
    )?;

    Reply::ok("Academic year retrieved successfully").with("academicYear", &year)
}

#[utoipa::path(
    post,
    path = "/api/v1/academic-calendar/years",
    request_body = CreateYearRequest,
    responses(
        (status = 201, description = "Academic year created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn create_year(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateYearRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    ensure_ordered(request.start_date, request.end_date)?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let calendar = create_calendar_repository(&state.db);
    if let Some(clash) = calendar
        .overlapping_year(school_id, request.start_date, request.end_date, None)
        .await?
    {
        return Err(ApiError::Conflict(format!(
            "Academic year overlaps with {}",
            clash.name
        )));
    }

    let year = calendar
        .create_year(&NewAcademicYear {
            school_id,
            name: request.name.trim().to_string(),
            start_date: request.start_date,
            end_date: request.end_date,
            is_current: request.is_current,
        })
        .await?;

    info!(academic_year_id = %year.id, school_id = %school_id, "Academic year created");
    Reply::created("Academic year created successfully").with("academicYear", &year)
}

#[utoipa::path(
    put,
    path = "/api/v1/academic-calendar/years/{id}",
    params(("id" = Uuid, Path, description = "Academic year id")),
    request_body = UpdateYearRequest,
    responses(
        (status = 200, description = "Academic year updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Academic year not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn update_year(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateYearRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::AcademicYear, None);
    let calendar = create_calendar_repository(&state.db);
    let existing = visible(
        calendar.find_year(&predicate, id).await?,
        ResourceKind::AcademicYear,
    )?;
    request.validate()?;

    let start = request.start_date.unwrap_or(existing.start_date);
    let end = request.end_date.unwrap_or(existing.end_date);
    ensure_ordered(start, end)?;

    if let Some(clash) = calendar
        .overlapping_year(existing.school_id, start, end, Some(existing.id))
        .await?
    {
        return Err(ApiError::Conflict(format!(
            "Academic year overlaps with {}",
            clash.name
        )));
    }

    let year = calendar
        .update_year(
            existing.id,
            &AcademicYearUpdate {
                name: request.name.map(|n| n.trim().to_string()),
                start_date: request.start_date,
                end_date: request.end_date,
                is_current: request.is_current,
            },
        )
        .await?;

    info!(academic_year_id = %year.id, "Academic year updated");
    Reply::ok("Academic year updated successfully").with("academicYear", &year)
}

#[utoipa::path(
    delete,
    path = "/api/v1/academic-calendar/years/{id}",
    params(("id" = Uuid, Path, description = "Academic year id")),
    responses(
        (status = 200, description = "Academic year deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Academic year not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn delete_year(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::AcademicYear, None);
    let calendar = create_calendar_repository(&state.db);
    let year = visible(
        calendar.find_year(&predicate, id).await?,
        ResourceKind::AcademicYear,
    )?;

    ApiError::ensure_clear("academic year", calendar.year_dependents(year.id).await?)?;
    calendar.delete_year(year.id).await?;

    info!(academic_year_id = %year.id, "Academic year deleted");
    Ok(Reply::ok("Academic year deleted successfully"))
}

// ============================================================================
// Terms
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermQuery {
    pub academic_year_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTermRequest {
    pub school_id: Option<Uuid>,
    pub academic_year_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Name is required"))]
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTermRequest {
    #[validate(length(min = 1, max = 50, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

fn outside_year() -> ApiError {
    ApiError::validation_field(
        "startDate",
        "range",
        "Term dates must fall within the academic year",
    )
}

#[utoipa::path(
    get,
    path = "/api/v1/academic-calendar/terms",
    responses(
        (status = 200, description = "Terms retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn list_terms(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<TermQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Term, list.school_id);
    let terms = create_calendar_repository(&state.db)
        .list_terms(&predicate, query.academic_year_id, &list.pagination())
        .await?;

    Reply::ok("Terms retrieved successfully").page("terms", &terms)
}

#[utoipa::path(
    get,
    path = "/api/v1/academic-calendar/terms/{id}",
    params(("id" = Uuid, Path, description = "Term id")),
    responses(
        (status = 200, description = "Term retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Term not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn get_term(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Term, scope.school_id);
    let term = visible(
        create_calendar_repository(&state.db)
            .find_term(&predicate, id)
            .await?,
        ResourceKind::Term,
    )?;

    Reply::ok("Term retrieved successfully").with("term", &term)
}

#[utoipa::path(
    post,
    path = "/api/v1/academic-calendar/terms",
    request_body = CreateTermRequest,
    responses(
        (status = 201, description = "Term created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn create_term(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateTermRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    ensure_ordered(request.start_date, request.end_date)?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let calendar = create_calendar_repository(&state.db);
    let year = referenced(
        calendar
            .find_year(&within(school_id), request.academic_year_id)
            .await?,
        "academicYearId",
        ResourceKind::AcademicYear,
    )?;
    if !year.contains(request.start_date, request.end_date) {
        return Err(outside_year());
    }

    if request.is_active {
        if let Some(clash) = calendar
            .overlapping_term(
                school_id,
                year.id,
                request.start_date,
                request.end_date,
                None,
            )
            .await?
        {
            return Err(ApiError::Conflict(format!(
                "Term overlaps with {} ({} to {})",
                clash.name, clash.start_date, clash.end_date
            )));
        }
    }

    let term = calendar
        .create_term(&NewTerm {
            school_id,
            academic_year_id: year.id,
            name: request.name.trim().to_string(),
            start_date: request.start_date,
            end_date: request.end_date,
            is_active: request.is_active,
        })
        .await?;

    info!(term_id = %term.id, academic_year_id = %year.id, "Term created");
    Reply::created("Term created successfully").with("term", &term)
}

#[utoipa::path(
    put,
    path = "/api/v1/academic-calendar/terms/{id}",
    params(("id" = Uuid, Path, description = "Term id")),
    request_body = UpdateTermRequest,
    responses(
        (status = 200, description = "Term updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Term not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn update_term(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateTermRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Term, None);
    let calendar = create_calendar_repository(&state.db);
    let existing = visible(calendar.find_term(&predicate, id).await?, ResourceKind::Term)?;
    request.validate()?;

    let start = request.start_date.unwrap_or(existing.start_date);
    let end = request.end_date.unwrap_or(existing.end_date);
    ensure_ordered(start, end)?;

    let year = visible(
        calendar
            .find_year(&within(existing.school_id), existing.academic_year_id)
            .await?,
        ResourceKind::AcademicYear,
    )?;
    if !year.contains(start, end) {
        return Err(outside_year());
    }

    if request.is_active.unwrap_or(existing.is_active) {
        if let Some(clash) = calendar
            .overlapping_term(existing.school_id, year.id, start, end, Some(existing.id))
            .await?
        {
            return Err(ApiError::Conflict(format!(
                "Term overlaps with {} ({} to {})",
                clash.name, clash.start_date, clash.end_date
            )));
        }
    }

    let term = calendar
        .update_term(
            existing.id,
            &TermUpdate {
                name: request.name.map(|n| n.trim().to_string()),
                start_date: request.start_date,
                end_date: request.end_date,
                is_active: request.is_active,
            },
        )
        .await?;

    info!(term_id = %term.id, "Term updated");
    Reply::ok("Term updated successfully").with("term", &term)
}

#[utoipa::path(
    delete,
    path = "/api/v1/academic-calendar/terms/{id}",
    params(("id" = Uuid, Path, description = "Term id")),
    responses(
        (status = 200, description = "Term deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Term not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Calendar"
)]
pub async fn delete_term(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Term, None);
    let calendar = create_calendar_repository(&state.db);
    let term = visible(calendar.find_term(&predicate, id).await?, ResourceKind::Term)?;

    ApiError::ensure_clear("term", calendar.term_dependents(term.id).await?)?;
    calendar.delete_term(term.id).await?;

    info!(term_id = %term.id, "Term deleted");
    Ok(Reply::ok("Term deleted successfully"))
}
