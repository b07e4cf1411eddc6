//! Grades (year levels), classes and subjects.

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
    create_class_repository, create_grade_repository, create_subject_repository,
    create_teacher_repository, ClassFilter,
};
use scholar_core::models::{
    ClassUpdate, GradeUpdate, NewClass, NewGrade, NewSubject, SubjectUpdate,
};

use super::{referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn grade_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_grades).post(create_grade))
        .route(
            "/:id",
            get(get_grade).put(update_grade).delete(delete_grade),
        )
}

pub fn class_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_classes).post(create_class))
        .route(
            "/:id",
            get(get_class).put(update_class).delete(delete_class),
        )
}

pub fn subject_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subjects).post(create_subject))
        .route(
            "/:id",
            get(get_subject).put(update_subject).delete(delete_subject),
        )
}

// ============================================================================
// Grades
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGradeRequest {
    pub school_id: Option<Uuid>,
    #[validate(range(min = 1, max = 20, message = "Level must be between 1 and 20"))]
    pub level: i64,
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateGradeRequest {
    #[validate(range(min = 1, max = 20, message = "Level must be between 1 and 20"))]
    pub level: Option<i64>,
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/grades",
    responses(
        (status = 200, description = "Grades retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Grades"
)]
pub async fn list_grades(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Grade, list.school_id);
    let grades = create_grade_repository(&state.db)
        .list(&predicate, &list.pagination())
        .await?;

    Reply::ok("Grades retrieved successfully").page("grades", &grades)
}

#[utoipa::path(
    get,
    path = "/api/v1/grades/{id}",
    params(("id" = Uuid, Path, description = "Grade id")),
    responses(
        (status = 200, description = "Grade retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Grade not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Grades"
)]
pub async fn get_grade(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Grade, scope.school_id);
    let grade = visible(
        create_grade_repository(&state.db).find(&predicate, id).await?,
        ResourceKind::Grade,
    )?;

    Reply::ok("Grade retrieved successfully").with("grade", &grade)
}

#[utoipa::path(
    post,
    path = "/api/v1/grades",
    request_body = CreateGradeRequest,
    responses(
        (status = 201, description = "Grade created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Grades"
)]
pub async fn create_grade(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateGradeRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let grades = create_grade_repository(&state.db);
    if grades.level_taken(school_id, request.level, None).await? {
        return Err(ApiError::Conflict(format!(
            "Grade level {} already exists",
            request.level
        )));
    }

    let grade = grades
        .create(&NewGrade {
            school_id,
            level: request.level,
            name: request.name.trim().to_string(),
            description: request.description,
        })
        .await?;

    info!(grade_id = %grade.id, school_id = %school_id, "Grade created");
    Reply::created("Grade created successfully").with("grade", &grade)
}

#[utoipa::path(
    put,
    path = "/api/v1/grades/{id}",
    params(("id" = Uuid, Path, description = "Grade id")),
    request_body = UpdateGradeRequest,
    responses(
        (status = 200, description = "Grade updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Grade not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Grades"
)]
pub async fn update_grade(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateGradeRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Grade, None);
    let grades = create_grade_repository(&state.db);
    let existing = visible(grades.find(&predicate, id).await?, ResourceKind::Grade)?;
    request.validate()?;

    if let Some(level) = request.level {
        if grades
            .level_taken(existing.school_id, level, Some(existing.id))
            .await?
        {
            return Err(ApiError::Conflict(format!(
                "Grade level {} already exists",
                level
            )));
        }
    }

    let grade = grades
        .update(
            existing.id,
            &GradeUpdate {
                level: request.level,
                name: request.name.map(|n| n.trim().to_string()),
                description: request.description,
            },
        )
        .await?;

    info!(grade_id = %grade.id, "Grade updated");
    Reply::ok("Grade updated successfully").with("grade", &grade)
}

#[utoipa::path(
    delete,
    path = "/api/v1/grades/{id}",
    params(("id" = Uuid, Path, description = "Grade id")),
    responses(
        (status = 200, description = "Grade deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Grade not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Grades"
)]
pub async fn delete_grade(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Grade, None);
    let grades = create_grade_repository(&state.db);
    let grade = visible(grades.find(&predicate, id).await?, ResourceKind::Grade)?;

    ApiError::ensure_clear("grade", grades.dependents(grade.id).await?)?;
    grades.delete(grade.id).await?;

    info!(grade_id = %grade.id, "Grade deleted");
    Ok(Reply::ok("Grade deleted successfully"))
}

// ============================================================================
// Classes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassQuery {
    pub grade_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    pub school_id: Option<Uuid>,
    pub grade_id: Uuid,
    pub supervisor_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50, message = "Name is required"))]
    pub name: String,
    #[validate(range(min = 1, message = "Capacity must be at least 1"))]
    pub capacity: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassRequest {
    pub grade_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(range(min = 1, message = "Capacity must be at least 1"))]
    pub capacity: Option<i64>,
}

/// Grade and supervisor must both belong to the class's school.
async fn check_class_refs(
    state: &AppState,
    school_id: Uuid,
    grade_id: Option<Uuid>,
    supervisor_id: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(grade_id) = grade_id {
        referenced(
            create_grade_repository(&state.db)
                .find(&within(school_id), grade_id)
                .await?,
            "gradeId",
            ResourceKind::Grade,
        )?;
    }
    if let Some(supervisor_id) = supervisor_id {
        referenced(
            create_teacher_repository(&state.db)
                .find(&within(school_id), supervisor_id)
                .await?,
            "supervisorId",
            ResourceKind::Teacher,
        )?;
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/classes",
    responses(
        (status = 200, description = "Classes retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Classes"
)]
pub async fn list_classes(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<ClassQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Class, list.school_id);

    let filter = ClassFilter {
        grade_id: query.grade_id,
        supervisor_id: query.supervisor_id,
        search: list.search(),
    };
    let classes = create_class_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Classes retrieved successfully").page("classes", &classes)
}

#[utoipa::path(
    get,
    path = "/api/v1/classes/{id}",
    params(("id" = Uuid, Path, description = "Class id")),
    responses(
        (status = 200, description = "Class retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Class not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Classes"
)]
pub async fn get_class(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Class, scope.school_id);
    let class = visible(
        create_class_repository(&state.db).find(&predicate, id).await?,
        ResourceKind::Class,
    )?;

    Reply::ok("Class retrieved successfully").with("class", &class)
}

#[utoipa::path(
    post,
    path = "/api/v1/classes",
    request_body = CreateClassRequest,
    responses(
        (status = 201, description = "Class created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Classes"
)]
pub async fn create_class(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateClassRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    check_class_refs(&state, school_id, Some(request.grade_id), request.supervisor_id).await?;

    let classes = create_class_repository(&state.db);
    let name = request.name.trim().to_string();
    if classes.name_taken(school_id, &name, None).await? {
        return Err(ApiError::Conflict(format!("Class {} already exists", name)));
    }

    let class = classes
        .create(&NewClass {
            school_id,
            grade_id: request.grade_id,
            supervisor_id: request.supervisor_id,
            name,
            capacity: request.capacity,
        })
        .await?;

    info!(class_id = %class.id, school_id = %school_id, "Class created");
    Reply::created("Class created successfully").with("class", &class)
}

#[utoipa::path(
    put,
    path = "/api/v1/classes/{id}",
    params(("id" = Uuid, Path, description = "Class id")),
    request_body = UpdateClassRequest,
    responses(
        (status = 200, description = "Class updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Class not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Classes"
)]
pub async fn update_class(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateClassRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Class, None);
    let classes = create_class_repository(&state.db);
    let existing = visible(classes.find(&predicate, id).await?, ResourceKind::Class)?;
    request.validate()?;

    check_class_refs(&state, existing.school_id, request.grade_id, request.supervisor_id).await?;

    let name = request.name.map(|n| n.trim().to_string());
    if let Some(name) = &name {
        if classes
            .name_taken(existing.school_id, name, Some(existing.id))
            .await?
        {
            return Err(ApiError::Conflict(format!("Class {} already exists", name)));
        }
    }

    let class = classes
        .update(
            existing.id,
            &ClassUpdate {
                grade_id: request.grade_id,
                supervisor_id: request.supervisor_id,
                name,
                capacity: request.capacity,
            },
        )
        .await?;

    info!(class_id = %class.id, "Class updated");
    Reply::ok("Class updated successfully").with("class", &class)
}

#[utoipa::path(
    delete,
    path = "/api/v1/classes/{id}",
    params(("id" = Uuid, Path, description = "Class id")),
    responses(
        (status = 200, description = "Class deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Class not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Classes"
)]
pub async fn delete_class(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Class, None);
    let classes = create_class_repository(&state.db);
    let class = visible(classes.find(&predicate, id).await?, ResourceKind::Class)?;

    ApiError::ensure_clear("class", classes.dependents(class.id).await?)?;
    classes.delete(class.id).await?;

    info!(class_id = %class.id, "Class deleted");
    Ok(Reply::ok("Class deleted successfully"))
}

// ============================================================================
// Subjects
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubjectRequest {
    pub school_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "Code must be 1-20 characters"))]
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateSubjectRequest {
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Code must be 1-20 characters"))]
    pub code: Option<String>,
    pub description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/subjects",
    responses(
        (status = 200, description = "Subjects retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Subjects"
)]
pub async fn list_subjects(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Subject, list.school_id);
    let search = list.search();
    let subjects = create_subject_repository(&state.db)
        .list(&predicate, search.as_deref(), &list.pagination())
        .await?;

    Reply::ok("Subjects retrieved successfully").page("subjects", &subjects)
}

#[utoipa::path(
    get,
    path = "/api/v1/subjects/{id}",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Subject retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Subject not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Subjects"
)]
pub async fn get_subject(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Subject, scope.school_id);
    let subject = visible(
        create_subject_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Subject,
    )?;

    Reply::ok("Subject retrieved successfully").with("subject", &subject)
}

#[utoipa::path(
    post,
    path = "/api/v1/subjects",
    request_body = CreateSubjectRequest,
    responses(
        (status = 201, description = "Subject created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Subjects"
)]
pub async fn create_subject(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateSubjectRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let subjects = create_subject_repository(&state.db);
    if subjects.code_taken(school_id, &request.code, None).await? {
        return Err(ApiError::Conflict(format!(
            "Subject code {} already exists",
            request.code
        )));
    }

    let subject = subjects
        .create(&NewSubject {
            school_id,
            name: request.name.trim().to_string(),
            code: request.code,
            description: request.description,
        })
        .await?;

    info!(subject_id = %subject.id, school_id = %school_id, "Subject created");
    Reply::created("Subject created successfully").with("subject", &subject)
}

#[utoipa::path(
    put,
    path = "/api/v1/subjects/{id}",
    params(("id" = Uuid, Path, description = "Subject id")),
    request_body = UpdateSubjectRequest,
    responses(
        (status = 200, description = "Subject updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Subject not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Subjects"
)]
pub async fn update_subject(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateSubjectRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Subject, None);
    let subjects = create_subject_repository(&state.db);
    let existing = visible(subjects.find(&predicate, id).await?, ResourceKind::Subject)?;
    request.validate()?;

    if let Some(code) = &request.code {
        if subjects
            .code_taken(existing.school_id, code, Some(existing.id))
            .await?
        {
            return Err(ApiError::Conflict(format!(
                "Subject code {} already exists",
                code
            )));
        }
    }

    let subject = subjects
        .update(
            existing.id,
            &SubjectUpdate {
                name: request.name.map(|n| n.trim().to_string()),
                code: request.code,
                description: request.description,
            },
        )
        .await?;

    info!(subject_id = %subject.id, "Subject updated");
    Reply::ok("Subject updated successfully").with("subject", &subject)
}

/// Refused while lessons, assignments or exam questions use the subject.
#[utoipa::path(
    delete,
    path = "/api/v1/subjects/{id}",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Subject deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Subject not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Subjects"
)]
pub async fn delete_subject(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Subject, None);
    let subjects = create_subject_repository(&state.db);
    let subject = visible(subjects.find(&predicate, id).await?, ResourceKind::Subject)?;

    ApiError::ensure_clear("subject", subjects.dependents(subject.id).await?)?;
    subjects.delete(subject.id).await?;

    info!(subject_id = %subject.id, "Subject deleted");
    Ok(Reply::ok("Subject deleted successfully"))
}
