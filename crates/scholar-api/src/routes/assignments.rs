//! Assignments and their submissions.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ANY_ROLE, STAFF};
use scholar_core::auth::Role;
use scholar_core::db::{
    create_assignment_repository, create_class_repository, create_student_repository,
    create_subject_repository, create_teacher_repository, AssignmentFilter,
};
use scholar_core::fanout::Audience;
use scholar_core::models::{
    Assignment, AssignmentUpdate, NewAssignment, NewNotification, NewSubmission,
    NotificationCategory,
};

use super::{ensure_guardian, ensure_teaches, referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assignments).post(create_assignment))
        .route(
            "/:id",
            get(get_assignment)
                .put(update_assignment)
                .delete(delete_assignment),
        )
        .route(
            "/:id/submissions",
            get(list_submissions).post(submit_assignment),
        )
        .route(
            "/:id/submissions/:submission_id/grade",
            put(grade_submission),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentQuery {
    pub class_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentRequest {
    pub school_id: Option<Uuid>,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    /// Ignored for teachers, who always own what they create.
    pub teacher_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    #[validate(range(exclusive_min = 0.0, message = "Max score must be greater than 0"))]
    pub max_score: f64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssignmentRequest {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[validate(range(exclusive_min = 0.0, message = "Max score must be greater than 0"))]
    pub max_score: Option<f64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub student_id: Uuid,
    #[validate(length(max = 10000))]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GradeRequest {
    #[validate(range(min = 0.0, message = "Score cannot be negative"))]
    pub score: f64,
    pub feedback: Option<String>,
}

async fn writable_assignment(
    state: &AppState,
    caller: &CurrentUser,
    id: Uuid,
) -> ApiResult<Assignment> {
    caller.require(STAFF)?;
    let predicate = caller.filter(ResourceKind::Assignment, None);
    let assignment = visible(
        create_assignment_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Assignment,
    )?;
    ensure_teaches(state, caller, assignment.class_id).await?;
    Ok(assignment)
}

#[utoipa::path(
    get,
    path = "/api/v1/assignments",
    responses(
        (status = 200, description = "Assignments retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<AssignmentQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Assignment, list.school_id);

    let filter = AssignmentFilter {
        class_id: query.class_id,
        subject_id: query.subject_id,
        teacher_id: query.teacher_id,
        due_from: query.due_from,
        due_to: query.due_to,
    };
    let assignments = create_assignment_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Assignments retrieved successfully").page("assignments", &assignments)
}

#[utoipa::path(
    get,
    path = "/api/v1/assignments/{id}",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn get_assignment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Assignment, scope.school_id);
    let assignment = visible(
        create_assignment_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Assignment,
    )?;

    Reply::ok("Assignment retrieved successfully").with("assignment", &assignment)
}

#[utoipa::path(
    post,
    path = "/api/v1/assignments",
    request_body = CreateAssignmentRequest,
    responses(
        (status = 201, description = "Assignment created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn create_assignment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateAssignmentRequest>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let tenant = within(school_id);
    let class = referenced(
        create_class_repository(&state.db)
            .find(&tenant, request.class_id)
            .await?,
        "classId",
        ResourceKind::Class,
    )?;
    let subject = referenced(
        create_subject_repository(&state.db)
            .find(&tenant, request.subject_id)
            .await?,
        "subjectId",
        ResourceKind::Subject,
    )?;
    ensure_teaches(&state, &caller, class.id).await?;

    let teacher_id = if caller.identity.has_role(Role::Teacher) {
        caller.identity.teacher_id
    } else if let Some(teacher_id) = request.teacher_id {
        let teacher = referenced(
            create_teacher_repository(&state.db)
                .find(&tenant, teacher_id)
                .await?,
            "teacherId",
            ResourceKind::Teacher,
        )?;
        Some(teacher.id)
    } else {
        None
    };

    let assignment = create_assignment_repository(&state.db)
        .create(&NewAssignment {
            school_id,
            class_id: class.id,
            subject_id: subject.id,
            teacher_id,
            title: request.title,
            description: request.description,
            due_date: request.due_date,
            max_score: request.max_score,
        })
        .await?;

    info!(assignment_id = %assignment.id, class_id = %class.id, "Assignment created");

    let notification = NewNotification::new(
        NotificationCategory::Assignment,
        format!("New assignment: {}", assignment.title),
        format!(
            "{} assignment for {} is due on {}",
            subject.name, class.name, assignment.due_date
        ),
    )
    .in_school(school_id)
    .with_metadata(json!({ "assignmentId": assignment.id, "classId": class.id }));
    state
        .notifier
        .notify(&Audience::ClassGuardians(class.id), &notification)
        .await;

    Reply::created("Assignment created successfully").with("assignment", &assignment)
}

#[utoipa::path(
    put,
    path = "/api/v1/assignments/{id}",
    params(("id" = Uuid, Path, description = "Assignment id")),
    request_body = UpdateAssignmentRequest,
    responses(
        (status = 200, description = "Assignment updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn update_assignment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateAssignmentRequest>,
) -> ApiResult<Reply> {
    let existing = writable_assignment(&state, &caller, id).await?;
    request.validate()?;

    let assignment = create_assignment_repository(&state.db)
        .update(
            existing.id,
            &AssignmentUpdate {
                title: request.title,
                description: request.description,
                due_date: request.due_date,
                max_score: request.max_score,
            },
        )
        .await?;

    info!(assignment_id = %assignment.id, "Assignment updated");
    Reply::ok("Assignment updated successfully").with("assignment", &assignment)
}

#[utoipa::path(
    delete,
    path = "/api/v1/assignments/{id}",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn delete_assignment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    let assignment = writable_assignment(&state, &caller, id).await?;
    let assignments = create_assignment_repository(&state.db);

    ApiError::ensure_clear("assignment", assignments.dependents(assignment.id).await?)?;
    assignments.delete(assignment.id).await?;

    info!(assignment_id = %assignment.id, "Assignment deleted");
    Ok(Reply::ok("Assignment deleted successfully"))
}

// ============================================================================
// Submissions
// ============================================================================

/// Parents see only their own children's submissions.
#[utoipa::path(
    get,
    path = "/api/v1/assignments/{id}/submissions",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Submissions retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn list_submissions(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let assignments = create_assignment_repository(&state.db);
    let assignment = visible(
        assignments
            .find(&caller.filter(ResourceKind::Assignment, None), id)
            .await?,
        ResourceKind::Assignment,
    )?;

    let submissions = assignments
        .submissions(&caller.filter(ResourceKind::Submission, None), assignment.id)
        .await?;
    Reply::ok("Submissions retrieved successfully").with("submissions", &submissions)
}

/// A guardian submits for their child; staff may record a submission on a
/// student's behalf.
#[utoipa::path(
    post,
    path = "/api/v1/assignments/{id}/submissions",
    params(("id" = Uuid, Path, description = "Assignment id")),
    request_body = SubmitRequest,
    responses(
        (status = 201, description = "Submission recorded successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn submit_assignment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<SubmitRequest>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let assignments = create_assignment_repository(&state.db);
    let assignment = visible(
        assignments
            .find(&caller.filter(ResourceKind::Assignment, None), id)
            .await?,
        ResourceKind::Assignment,
    )?;
    request.validate()?;

    if caller.identity.has_role(Role::Parent) {
        ensure_guardian(&state, &caller, request.student_id).await?;
    } else {
        caller.require(STAFF)?;
        ensure_teaches(&state, &caller, assignment.class_id).await?;
    }

    let student = referenced(
        create_student_repository(&state.db)
            .find(&within(assignment.school_id), request.student_id)
            .await?,
        "studentId",
        ResourceKind::Student,
    )?;
    if student.class_id != Some(assignment.class_id) {
        return Err(ApiError::validation_field(
            "studentId",
            "not_in_class",
            "Student is not in the assignment's class",
        ));
    }

    let submission = assignments
        .submit(
            &assignment,
            &NewSubmission {
                student_id: student.id,
                content: request.content,
            },
        )
        .await?;

    info!(
        assignment_id = %assignment.id,
        submission_id = %submission.id,
        student_id = %student.id,
        "Assignment submitted"
    );
    Reply::created("Submission recorded successfully").with("submission", &submission)
}

#[utoipa::path(
    put,
    path = "/api/v1/assignments/{id}/submissions/{submission_id}/grade",
    params(
        ("id" = Uuid, Path, description = "Assignment id"),
        ("submission_id" = Uuid, Path, description = "Submission id")
    ),
    request_body = GradeRequest,
    responses(
        (status = 200, description = "Submission graded successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Assignments"
)]
pub async fn grade_submission(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path((id, submission_id)): Path<(Uuid, Uuid)>,
    Body(request): Body<GradeRequest>,
) -> ApiResult<Reply> {
    let assignment = writable_assignment(&state, &caller, id).await?;
    let assignments = create_assignment_repository(&state.db);
    let submission = visible(
        assignments
            .find_submission(assignment.id, submission_id)
            .await?,
        ResourceKind::Submission,
    )?;
    request.validate()?;

    if request.score > assignment.max_score {
        return Err(ApiError::validation_field(
            "score",
            "range",
            &format!("Score cannot exceed max score ({})", assignment.max_score),
        ));
    }

    let graded = assignments
        .grade_submission(submission.id, request.score, request.feedback.as_deref())
        .await?;

    info!(submission_id = %graded.id, score = request.score, "Submission graded");
    Reply::ok("Submission graded successfully").with("submission", &graded)
}
