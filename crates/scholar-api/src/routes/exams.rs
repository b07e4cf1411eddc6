//! Exam sessions, questions and results.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    routing::{delete, get},
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
    create_calendar_repository, create_class_repository, create_exam_repository,
    create_student_repository, create_subject_repository, ExamFilter,
};
use scholar_core::models::{Exam, ExamUpdate, NewExam, NewExamQuestion, ResultEntry};
use scholar_core::ClockTime;

use super::{ensure_teaches, referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_exams).post(create_exam))
        .route("/:id", get(get_exam).put(update_exam).delete(delete_exam))
        .route("/:id/questions", get(list_questions).post(add_question))
        .route("/:id/questions/:question_id", delete(delete_question))
        .route("/:id/results", get(list_results).post(record_results))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuery {
    pub class_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamRequest {
    pub school_id: Option<Uuid>,
    pub term_id: Uuid,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    pub exam_date: NaiveDate,
    #[schema(value_type = String, example = "09:00")]
    pub start_time: ClockTime,
    #[schema(value_type = String, example = "11:00")]
    pub end_time: ClockTime,
    #[validate(range(exclusive_min = 0.0, message = "Total marks must be greater than 0"))]
    pub total_marks: f64,
    #[validate(range(min = 0.0, message = "Passing marks cannot be negative"))]
    pub passing_marks: f64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExamRequest {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub exam_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub start_time: Option<ClockTime>,
    #[schema(value_type = Option<String>)]
    pub end_time: Option<ClockTime>,
    #[validate(range(exclusive_min = 0.0, message = "Total marks must be greater than 0"))]
    pub total_marks: Option<f64>,
    #[validate(range(min = 0.0, message = "Passing marks cannot be negative"))]
    pub passing_marks: Option<f64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "Prompt is required"))]
    pub prompt: String,
    #[validate(range(exclusive_min = 0.0, message = "Marks must be greater than 0"))]
    pub marks: f64,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultInput {
    pub student_id: Uuid,
    #[validate(range(min = 0.0, message = "Marks cannot be negative"))]
    pub marks_obtained: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordResultsRequest {
    #[validate(length(min = 1, message = "At least one result is required"), nested)]
    pub results: Vec<ResultInput>,
}

/// Date, time and marks rules shared by create and update.
fn check_session(
    start: ClockTime,
    end: ClockTime,
    total_marks: f64,
    passing_marks: f64,
) -> ApiResult<()> {
    if end <= start {
        return Err(ApiError::validation_field(
            "endTime",
            "range",
            "End time must be after start time",
        ));
    }
    if passing_marks > total_marks {
        return Err(ApiError::validation_field(
            "passingMarks",
            "range",
            "Passing marks cannot exceed total marks",
        ));
    }
    Ok(())
}

fn overlap_error(clash: &Exam) -> ApiError {
    ApiError::Conflict(format!(
        "Class already has {} from {} to {} on {}",
        clash.title, clash.start_time, clash.end_time, clash.exam_date
    ))
}

/// The exam looked up for a write; teachers must teach its class.
async fn writable_exam(state: &AppState, caller: &CurrentUser, id: Uuid) -> ApiResult<Exam> {
    caller.require(STAFF)?;
    let predicate = caller.filter(ResourceKind::Exam, None);
    let exam = visible(
        create_exam_repository(&state.db).find(&predicate, id).await?,
        ResourceKind::Exam,
    )?;
    ensure_teaches(state, caller, exam.class_id).await?;
    Ok(exam)
}

#[utoipa::path(
    get,
    path = "/api/v1/exams",
    responses(
        (status = 200, description = "Exams retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn list_exams(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<ExamQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Exam, list.school_id);

    let filter = ExamFilter {
        class_id: query.class_id,
        term_id: query.term_id,
        subject_id: query.subject_id,
        from: query.from,
        to: query.to,
    };
    let exams = create_exam_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Exams retrieved successfully").page("exams", &exams)
}

#[utoipa::path(
    get,
    path = "/api/v1/exams/{id}",
    params(("id" = Uuid, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Exam retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn get_exam(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Exam, scope.school_id);
    let exam = visible(
        create_exam_repository(&state.db).find(&predicate, id).await?,
        ResourceKind::Exam,
    )?;

    Reply::ok("Exam retrieved successfully").with("exam", &exam)
}

#[utoipa::path(
    post,
    path = "/api/v1/exams",
    request_body = CreateExamRequest,
    responses(
        (status = 201, description = "Exam created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn create_exam(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateExamRequest>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    request.validate()?;
    check_session(
        request.start_time,
        request.end_time,
        request.total_marks,
        request.passing_marks,
    )?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let tenant = within(school_id);
    let term = referenced(
        create_calendar_repository(&state.db)
            .find_term(&tenant, request.term_id)
            .await?,
        "termId",
        ResourceKind::Term,
    )?;
    let class = referenced(
        create_class_repository(&state.db)
            .find(&tenant, request.class_id)
            .await?,
        "classId",
        ResourceKind::Class,
    )?;
    referenced(
        create_subject_repository(&state.db)
            .find(&tenant, request.subject_id)
            .await?,
        "subjectId",
        ResourceKind::Subject,
    )?;
    ensure_teaches(&state, &caller, class.id).await?;

    if !term.contains(request.exam_date) {
        return Err(ApiError::validation_field(
            "examDate",
            "range",
            "Exam date must fall within the term",
        ));
    }

    let exams = create_exam_repository(&state.db);
    if let Some(clash) = exams
        .overlapping(
            class.id,
            request.exam_date,
            request.start_time,
            request.end_time,
            None,
        )
        .await?
    {
        return Err(overlap_error(&clash));
    }

    let exam = exams
        .create(&NewExam {
            school_id,
            term_id: term.id,
            class_id: class.id,
            subject_id: request.subject_id,
            title: request.title,
            exam_date: request.exam_date,
            start_time: request.start_time,
            end_time: request.end_time,
            total_marks: request.total_marks,
            passing_marks: request.passing_marks,
        })
        .await?;

    info!(exam_id = %exam.id, class_id = %class.id, date = %exam.exam_date, "Exam created");
    Reply::created("Exam created successfully").with("exam", &exam)
}

#[utoipa::path(
    put,
    path = "/api/v1/exams/{id}",
    params(("id" = Uuid, Path, description = "Exam id")),
    request_body = UpdateExamRequest,
    responses(
        (status = 200, description = "Exam updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn update_exam(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateExamRequest>,
) -> ApiResult<Reply> {
    let existing = writable_exam(&state, &caller, id).await?;
    request.validate()?;

    let date = request.exam_date.unwrap_or(existing.exam_date);
    let start = request.start_time.unwrap_or(existing.start_time);
    let end = request.end_time.unwrap_or(existing.end_time);
    check_session(
        start,
        end,
        request.total_marks.unwrap_or(existing.total_marks),
        request.passing_marks.unwrap_or(existing.passing_marks),
    )?;

    if request.exam_date.is_some() {
        let term = visible(
            create_calendar_repository(&state.db)
                .find_term(&within(existing.school_id), existing.term_id)
                .await?,
            ResourceKind::Term,
        )?;
        if !term.contains(date) {
            return Err(ApiError::validation_field(
                "examDate",
                "range",
                "Exam date must fall within the term",
            ));
        }
    }

    let exams = create_exam_repository(&state.db);
    if let Some(clash) = exams
        .overlapping(existing.class_id, date, start, end, Some(existing.id))
        .await?
    {
        return Err(overlap_error(&clash));
    }

    let exam = exams
        .update(
            existing.id,
            &ExamUpdate {
                title: request.title,
                exam_date: request.exam_date,
                start_time: request.start_time,
                end_time: request.end_time,
                total_marks: request.total_marks,
                passing_marks: request.passing_marks,
            },
        )
        .await?;

    info!(exam_id = %exam.id, "Exam updated");
    Reply::ok("Exam updated successfully").with("exam", &exam)
}

#[utoipa::path(
    delete,
    path = "/api/v1/exams/{id}",
    params(("id" = Uuid, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Exam deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn delete_exam(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    let exam = writable_exam(&state, &caller, id).await?;
    let exams = create_exam_repository(&state.db);

    ApiError::ensure_clear("exam", exams.dependents(exam.id).await?)?;
    exams.delete(exam.id).await?;

    info!(exam_id = %exam.id, "Exam deleted");
    Ok(Reply::ok("Exam deleted successfully"))
}

// ============================================================================
// Questions
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/exams/{id}/questions",
    params(("id" = Uuid, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Questions retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn list_questions(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    let predicate = caller.filter(ResourceKind::Exam, None);
    let exams = create_exam_repository(&state.db);
    let exam = visible(exams.find(&predicate, id).await?, ResourceKind::Exam)?;

    let questions = exams.questions(exam.id).await?;
    Reply::ok("Questions retrieved successfully").with("questions", &questions)
}

#[utoipa::path(
    post,
    path = "/api/v1/exams/{id}/questions",
    params(("id" = Uuid, Path, description = "Exam id")),
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Question added successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn add_question(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<CreateQuestionRequest>,
) -> ApiResult<Reply> {
    let exam = writable_exam(&state, &caller, id).await?;
    request.validate()?;

    let question = create_exam_repository(&state.db)
        .add_question(
            &exam,
            &NewExamQuestion {
                prompt: request.prompt,
                marks: request.marks,
                position: request.position,
            },
        )
        .await?;

    info!(exam_id = %exam.id, question_id = %question.id, "Exam question added");
    Reply::created("Question added successfully").with("question", &question)
}

#[utoipa::path(
    delete,
    path = "/api/v1/exams/{id}/questions/{question_id}",
    params(
        ("id" = Uuid, Path, description = "Exam id"),
        ("question_id" = Uuid, Path, description = "Question id")
    ),
    responses(
        (status = 200, description = "Question deleted successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn delete_question(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Reply> {
    let exam = writable_exam(&state, &caller, id).await?;

    if !create_exam_repository(&state.db)
        .delete_question(exam.id, question_id)
        .await?
    {
        return Err(ApiError::not_found(ResourceKind::ExamQuestion.label()));
    }

    info!(exam_id = %exam.id, question_id = %question_id, "Exam question deleted");
    Ok(Reply::ok("Question deleted successfully"))
}

// ============================================================================
// Results
// ============================================================================

/// Parents see only their children's results.
#[utoipa::path(
    get,
    path = "/api/v1/exams/{id}/results",
    params(("id" = Uuid, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Results retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn list_results(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let exams = create_exam_repository(&state.db);
    let exam = visible(
        exams
            .find(&caller.filter(ResourceKind::Exam, None), id)
            .await?,
        ResourceKind::Exam,
    )?;

    let results = exams
        .results(&caller.filter(ResourceKind::ExamResult, None), exam.id)
        .await?;
    Reply::ok("Results retrieved successfully").with("results", &results)
}

#[utoipa::path(
    post,
    path = "/api/v1/exams/{id}/results",
    params(("id" = Uuid, Path, description = "Exam id")),
    request_body = RecordResultsRequest,
    responses(
        (status = 200, description = "Results recorded successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Exam not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Exams"
)]
pub async fn record_results(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<RecordResultsRequest>,
) -> ApiResult<Reply> {
    let exam = writable_exam(&state, &caller, id).await?;
    request.validate()?;

    let enrolled: HashSet<Uuid> = create_student_repository(&state.db)
        .ids_in_class(exam.class_id)
        .await?
        .into_iter()
        .collect();

    let mut entries = Vec::with_capacity(request.results.len());
    for (i, input) in request.results.into_iter().enumerate() {
        if input.marks_obtained > exam.total_marks {
            return Err(ApiError::validation_field(
                &format!("results[{}].marksObtained", i),
                "range",
                &format!("Marks cannot exceed total marks ({})", exam.total_marks),
            ));
        }
        if !enrolled.contains(&input.student_id) {
            return Err(ApiError::validation_field(
                &format!("results[{}].studentId", i),
                "not_in_class",
                "Student is not in the exam's class",
            ));
        }
        entries.push(ResultEntry {
            student_id: input.student_id,
            marks_obtained: input.marks_obtained,
            remarks: input.remarks,
        });
    }

    let results = create_exam_repository(&state.db)
        .upsert_results(&exam, &entries)
        .await?;

    info!(exam_id = %exam.id, count = results.len(), "Exam results recorded");
    Reply::ok("Results recorded successfully").with("results", &results)
}
