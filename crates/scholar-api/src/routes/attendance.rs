//! Daily attendance registers.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ANY_ROLE, STAFF};
use scholar_core::db::{
    create_attendance_repository, create_class_repository, create_student_repository,
    AttendanceFilter,
};
use scholar_core::models::{AttendanceMark, AttendanceStatus};

use super::{ensure_teaches, referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_attendance).post(mark_attendance))
        .route("/:id", get(get_attendance).delete(delete_attendance))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    pub class_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<AttendanceStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkInput {
    pub student_id: Uuid,
    #[schema(value_type = String, example = "present")]
    pub status: AttendanceStatus,
    #[validate(length(max = 500))]
    pub remarks: Option<String>,
}

/// One register for a class on one day.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    pub school_id: Option<Uuid>,
    pub class_id: Uuid,
    pub date: NaiveDate,
    #[validate(length(min = 1, message = "At least one record is required"), nested)]
    pub records: Vec<MarkInput>,
}

#[utoipa::path(
    get,
    path = "/api/v1/attendance",
    responses(
        (status = 200, description = "Attendance retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<AttendanceQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Attendance, list.school_id);

    let filter = AttendanceFilter {
        class_id: query.class_id,
        student_id: query.student_id,
        status: query.status,
        from: query.from,
        to: query.to,
    };
    let records = create_attendance_repository(&state.db)
        .list(&predicate, &filter, &list.pagination_or(50))
        .await?;

    Reply::ok("Attendance retrieved successfully").page("attendance", &records)
}

#[utoipa::path(
    get,
    path = "/api/v1/attendance/{id}",
    params(("id" = Uuid, Path, description = "Attendance record id")),
    responses(
        (status = 200, description = "Attendance record retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Attendance record not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Attendance"
)]
pub async fn get_attendance(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Attendance, scope.school_id);
    let record = visible(
        create_attendance_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Attendance,
    )?;

    Reply::ok("Attendance record retrieved successfully").with("attendance", &record)
}

/// Bulk upsert; re-marking a day replaces earlier statuses.
#[utoipa::path(
    post,
    path = "/api/v1/attendance",
    request_body = MarkAttendanceRequest,
    responses(
        (status = 200, description = "Attendance recorded successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Attendance"
)]
pub async fn mark_attendance(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<MarkAttendanceRequest>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let class = referenced(
        create_class_repository(&state.db)
            .find(&within(school_id), request.class_id)
            .await?,
        "classId",
        ResourceKind::Class,
    )?;
    ensure_teaches(&state, &caller, class.id).await?;

    let enrolled: HashSet<Uuid> = create_student_repository(&state.db)
        .ids_in_class(class.id)
        .await?
        .into_iter()
        .collect();

    let mut marks = Vec::with_capacity(request.records.len());
    for (i, input) in request.records.into_iter().enumerate() {
        if !enrolled.contains(&input.student_id) {
            return Err(ApiError::validation_field(
                &format!("records[{}].studentId", i),
                "not_in_class",
                "Student is not in this class",
            ));
        }
        marks.push(AttendanceMark {
            student_id: input.student_id,
            status: input.status,
            remarks: input.remarks,
        });
    }

    let records = create_attendance_repository(&state.db)
        .mark(&class, request.date, &marks, Some(caller.user.id))
        .await?;

    info!(
        class_id = %class.id,
        date = %request.date,
        count = records.len(),
        "Attendance marked"
    );
    Reply::ok("Attendance recorded successfully").with("attendance", &records)
}

#[utoipa::path(
    delete,
    path = "/api/v1/attendance/{id}",
    params(("id" = Uuid, Path, description = "Attendance record id")),
    responses(
        (status = 200, description = "Attendance record deleted successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Attendance record not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    let predicate = caller.filter(ResourceKind::Attendance, None);
    let attendance = create_attendance_repository(&state.db);
    let record = visible(
        attendance.find(&predicate, id).await?,
        ResourceKind::Attendance,
    )?;
    ensure_teaches(&state, &caller, record.class_id).await?;

    attendance.delete(record.id).await?;

    info!(attendance_id = %record.id, "Attendance record deleted");
    Ok(Reply::ok("Attendance record deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_lowercase() {
        let request: MarkAttendanceRequest = serde_json::from_value(serde_json::json!({
            "classId": Uuid::new_v4(),
            "date": "2024-10-01",
            "records": [
                { "studentId": Uuid::new_v4(), "status": "late" },
                { "studentId": Uuid::new_v4(), "status": "excused", "remarks": "Doctor" }
            ]
        }))
        .unwrap();

        assert_eq!(request.records[0].status, AttendanceStatus::Late);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let parsed: Result<MarkAttendanceRequest, _> = serde_json::from_value(serde_json::json!({
            "classId": Uuid::new_v4(),
            "date": "2024-10-01",
            "records": [{ "studentId": Uuid::new_v4(), "status": "sick" }]
        }));
        assert!(parsed.is_err());
    }
}
