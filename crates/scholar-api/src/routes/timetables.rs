//! Weekly timetable slots.

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ADMINS, ANY_ROLE};
use scholar_core::db::{
    create_class_repository, create_subject_repository, create_teacher_repository,
    create_timetable_repository, LessonFilter, SlotConflict, SlotRequest,
};
use scholar_core::models::{LessonUpdate, NewLesson};
use scholar_core::ClockTime;

use super::{referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lessons).post(create_lesson))
        .route(
            "/:id",
            get(get_lesson).put(update_lesson).delete(delete_lesson),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonQuery {
    pub class_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub day_of_week: Option<u8>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonRequest {
    pub school_id: Option<Uuid>,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    /// 1 (Monday) to 7 (Sunday).
    #[validate(range(min = 1, max = 7, message = "Day of week must be between 1 and 7"))]
    pub day_of_week: u8,
    #[schema(value_type = String, example = "08:00")]
    pub start_time: ClockTime,
    #[schema(value_type = String, example = "08:45")]
    pub end_time: ClockTime,
    #[validate(length(max = 50))]
    pub room: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLessonRequest {
    pub subject_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    #[validate(range(min = 1, max = 7, message = "Day of week must be between 1 and 7"))]
    pub day_of_week: Option<u8>,
    #[schema(value_type = Option<String>)]
    pub start_time: Option<ClockTime>,
    #[schema(value_type = Option<String>)]
    pub end_time: Option<ClockTime>,
    #[validate(length(max = 50))]
    pub room: Option<String>,
}

fn ensure_ordered(start: ClockTime, end: ClockTime) -> ApiResult<()> {
    if end <= start {
        return Err(ApiError::validation_field(
            "endTime",
            "range",
            "End time must be after start time",
        ));
    }
    Ok(())
}

fn conflict_error(conflict: &SlotConflict) -> ApiError {
    let lesson = conflict.lesson();
    let owner = match conflict {
        SlotConflict::Class(_) => "Class",
        SlotConflict::Teacher(_) => "Teacher",
    };
    ApiError::Conflict(format!(
        "{} already has a lesson from {} to {} on day {}",
        owner, lesson.start_time, lesson.end_time, lesson.day_of_week
    ))
}

async fn check_subject_and_teacher(
    state: &AppState,
    school_id: Uuid,
    subject_id: Option<Uuid>,
    teacher_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(subject_id) = subject_id {
        referenced(
            create_subject_repository(&state.db)
                .find(&within(school_id), subject_id)
                .await?,
            "subjectId",
            ResourceKind::Subject,
        )?;
    }
    if let Some(teacher_id) = teacher_id {
        referenced(
            create_teacher_repository(&state.db)
                .find(&within(school_id), teacher_id)
                .await?,
            "teacherId",
            ResourceKind::Teacher,
        )?;
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/timetables",
    responses(
        (status = 200, description = "Timetable retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Timetables"
)]
pub async fn list_lessons(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<LessonQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Lesson, list.school_id);

    let filter = LessonFilter {
        class_id: query.class_id,
        teacher_id: query.teacher_id,
        day_of_week: query.day_of_week,
    };
    let lessons = create_timetable_repository(&state.db)
        .list(&predicate, &filter, &list.pagination_or(50))
        .await?;

    Reply::ok("Timetable retrieved successfully").page("timetables", &lessons)
}

#[utoipa::path(
    get,
    path = "/api/v1/timetables/{id}",
    params(("id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "Timetable entry retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Lesson not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Timetables"
)]
pub async fn get_lesson(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Lesson, scope.school_id);
    let lesson = visible(
        create_timetable_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Lesson,
    )?;

    Reply::ok("Timetable entry retrieved successfully").with("timetable", &lesson)
}

#[utoipa::path(
    post,
    path = "/api/v1/timetables",
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Timetable entry created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Timetables"
)]
pub async fn create_lesson(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateLessonRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    ensure_ordered(request.start_time, request.end_time)?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    referenced(
        create_class_repository(&state.db)
            .find(&within(school_id), request.class_id)
            .await?,
        "classId",
        ResourceKind::Class,
    )?;
    check_subject_and_teacher(
        &state,
        school_id,
        Some(request.subject_id),
        Some(request.teacher_id),
    )
    .await?;

    let timetable = create_timetable_repository(&state.db);
    let slot = SlotRequest {
        class_id: request.class_id,
        teacher_id: request.teacher_id,
        day_of_week: request.day_of_week,
        start_time: request.start_time,
        end_time: request.end_time,
        except: None,
    };
    if let Some(conflict) = timetable.find_conflict(&slot).await? {
        return Err(conflict_error(&conflict));
    }

    let lesson = timetable
        .create(&NewLesson {
            school_id,
            class_id: request.class_id,
            subject_id: request.subject_id,
            teacher_id: request.teacher_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            room: request.room,
        })
        .await?;

    info!(
        lesson_id = %lesson.id,
        class_id = %lesson.class_id,
        day = lesson.day_of_week,
        "Timetable entry created"
    );
    Reply::created("Timetable entry created successfully").with("timetable", &lesson)
}

#[utoipa::path(
    put,
    path = "/api/v1/timetables/{id}",
    params(("id" = Uuid, Path, description = "Lesson id")),
    request_body = UpdateLessonRequest,
    responses(
        (status = 200, description = "Timetable entry updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Lesson not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Timetables"
)]
pub async fn update_lesson(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateLessonRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Lesson, None);
    let timetable = create_timetable_repository(&state.db);
    let existing = visible(timetable.find(&predicate, id).await?, ResourceKind::Lesson)?;
    request.validate()?;

    let slot = SlotRequest {
        class_id: existing.class_id,
        teacher_id: request.teacher_id.unwrap_or(existing.teacher_id),
        day_of_week: request.day_of_week.unwrap_or(existing.day_of_week),
        start_time: request.start_time.unwrap_or(existing.start_time),
        end_time: request.end_time.unwrap_or(existing.end_time),
        except: Some(existing.id),
    };
    ensure_ordered(slot.start_time, slot.end_time)?;

    check_subject_and_teacher(&state, existing.school_id, request.subject_id, request.teacher_id)
        .await?;

    if let Some(conflict) = timetable.find_conflict(&slot).await? {
        return Err(conflict_error(&conflict));
    }

    let lesson = timetable
        .update(
            existing.id,
            &LessonUpdate {
                subject_id: request.subject_id,
                teacher_id: request.teacher_id,
                day_of_week: request.day_of_week,
                start_time: request.start_time,
                end_time: request.end_time,
                room: request.room,
            },
        )
        .await?;

    info!(lesson_id = %lesson.id, "Timetable entry updated");
    Reply::ok("Timetable entry updated successfully").with("timetable", &lesson)
}

#[utoipa::path(
    delete,
    path = "/api/v1/timetables/{id}",
    params(("id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "Timetable entry deleted successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Lesson not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Timetables"
)]
pub async fn delete_lesson(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Lesson, None);
    let timetable = create_timetable_repository(&state.db);
    let lesson = visible(timetable.find(&predicate, id).await?, ResourceKind::Lesson)?;

    timetable.delete(lesson.id).await?;

    info!(lesson_id = %lesson.id, "Timetable entry deleted");
    Ok(Reply::ok("Timetable entry deleted successfully"))
}
