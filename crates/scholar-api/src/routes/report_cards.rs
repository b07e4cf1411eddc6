//! Term report cards: generated as drafts, published to guardians.

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

use scholar_core::access::{ResourceKind, ADMINS, ANY_ROLE, STAFF};
use scholar_core::auth::Role;
use scholar_core::db::{
    create_calendar_repository, create_report_card_repository, create_student_repository,
    ReportCardFilter,
};
use scholar_core::fanout::Audience;
use scholar_core::models::{NewNotification, NotificationCategory, ReportCardStatus};

use super::{referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_report_cards))
        .route("/generate", post(generate_report_card))
        .route("/:id", get(get_report_card).delete(delete_report_card))
        .route("/:id/publish", post(publish_report_card))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardQuery {
    pub student_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub status: Option<ReportCardStatus>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportCardRequest {
    pub student_id: Uuid,
    pub term_id: Uuid,
    #[validate(length(max = 1000))]
    pub remarks: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/report-cards",
    responses(
        (status = 200, description = "Report cards retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Report cards"
)]
pub async fn list_report_cards(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<ReportCardQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::ReportCard, list.school_id);

    // Families only ever see published cards.
    let status = if caller.identity.has_role(Role::Parent) {
        Some(ReportCardStatus::Published)
    } else {
        query.status
    };
    let filter = ReportCardFilter {
        student_id: query.student_id,
        term_id: query.term_id,
        status,
    };
    let cards = create_report_card_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Report cards retrieved successfully").page("reportCards", &cards)
}

#[utoipa::path(
    get,
    path = "/api/v1/report-cards/{id}",
    params(("id" = Uuid, Path, description = "Report card id")),
    responses(
        (status = 200, description = "Report card retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Report card not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Report cards"
)]
pub async fn get_report_card(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::ReportCard, scope.school_id);
    let card = visible(
        create_report_card_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::ReportCard,
    )?;
    if card.status == ReportCardStatus::Draft && caller.identity.has_role(Role::Parent) {
        return Err(ApiError::not_found(ResourceKind::ReportCard.label()));
    }

    Reply::ok("Report card retrieved successfully").with("reportCard", &card)
}

/// Computes the card from the term's exam results and attendance. Running
/// it again refreshes the draft; a published card stays as it is (409).
#[utoipa::path(
    post,
    path = "/api/v1/report-cards/generate",
    request_body = GenerateReportCardRequest,
    responses(
        (status = 201, description = "Report card generated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Report cards"
)]
pub async fn generate_report_card(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<GenerateReportCardRequest>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    request.validate()?;

    let student = referenced(
        create_student_repository(&state.db)
            .find(
                &caller.filter(ResourceKind::Student, None),
                request.student_id,
            )
            .await?,
        "studentId",
        ResourceKind::Student,
    )?;
    let term = referenced(
        create_calendar_repository(&state.db)
            .find_term(&within(student.school_id), request.term_id)
            .await?,
        "termId",
        ResourceKind::Term,
    )?;

    let mut draft = state.analytics.report_card(&student, &term).await?;
    draft.remarks = request.remarks;

    let card = create_report_card_repository(&state.db)
        .save_draft(&draft)
        .await?;

    info!(
        report_card_id = %card.id,
        student_id = %student.id,
        term_id = %term.id,
        grade = %card.grade,
        "Report card generated"
    );
    Reply::created("Report card generated successfully").with("reportCard", &card)
}

#[utoipa::path(
    post,
    path = "/api/v1/report-cards/{id}/publish",
    params(("id" = Uuid, Path, description = "Report card id")),
    responses(
        (status = 200, description = "Report card published successfully"),
        (status = 400, description = "Rejected", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Report card not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Report cards"
)]
pub async fn publish_report_card(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::ReportCard, None);
    let cards = create_report_card_repository(&state.db);
    let card = visible(cards.find(&predicate, id).await?, ResourceKind::ReportCard)?;

    if card.status == ReportCardStatus::Published {
        return Err(ApiError::BadRequest(
            "Report card is already published".to_string(),
        ));
    }
    let Some(published) = cards.publish(card.id).await? else {
        return Err(ApiError::Conflict(
            "Report card was published concurrently".to_string(),
        ));
    };

    info!(report_card_id = %published.id, "Report card published");

    let notification = NewNotification::new(
        NotificationCategory::ReportCard,
        "Report card published",
        format!(
            "A new report card is available: grade {}, attendance {}%",
            published.grade, published.attendance_rate
        ),
    )
    .in_school(published.school_id)
    .with_metadata(json!({
        "reportCardId": published.id,
        "studentId": published.student_id,
        "termId": published.term_id,
    }));
    state
        .notifier
        .notify(&Audience::StudentGuardians(published.student_id), &notification)
        .await;

    Reply::ok("Report card published successfully").with("reportCard", &published)
}

#[utoipa::path(
    delete,
    path = "/api/v1/report-cards/{id}",
    params(("id" = Uuid, Path, description = "Report card id")),
    responses(
        (status = 200, description = "Report card deleted successfully"),
        (status = 400, description = "Rejected", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Report card not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Report cards"
)]
pub async fn delete_report_card(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::ReportCard, None);
    let cards = create_report_card_repository(&state.db);
    let card = visible(cards.find(&predicate, id).await?, ResourceKind::ReportCard)?;

    if card.status == ReportCardStatus::Published || !cards.delete_draft(card.id).await? {
        return Err(ApiError::BadRequest(
            "Published report cards cannot be deleted".to_string(),
        ));
    }

    info!(report_card_id = %card.id, "Report card deleted");
    Ok(Reply::ok("Report card deleted successfully"))
}
