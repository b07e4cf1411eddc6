//! Students, teachers and parents.

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ADMINS, ANY_ROLE, STAFF};
use scholar_core::db::{
    create_class_repository, create_parent_repository, create_student_repository,
    create_teacher_repository, create_user_repository, ParentFilter, StudentFilter,
    TeacherFilter,
};
use scholar_core::hash_password;
use scholar_core::models::{
    Class, NewParent, NewStudent, NewTeacher, ParentUpdate, StudentUpdate, TeacherUpdate,
};

use super::{initial_password, referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_students).post(create_student))
        .route(
            "/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/:id/guardians", get(list_guardians).post(add_guardian))
        .route("/:id/guardians/:parent_id", delete(remove_guardian))
}

pub fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_teachers).post(create_teacher))
        .route(
            "/:id",
            get(get_teacher).put(update_teacher).delete(delete_teacher),
        )
}

pub fn parent_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_parents).post(create_parent))
        .route(
            "/:id",
            get(get_parent).put(update_parent).delete(delete_parent),
        )
}

// ============================================================================
// Students
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuery {
    pub class_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub school_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, max = 50, message = "Admission number is required"))]
    pub admission_no: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub enrolled_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    pub class_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "First name cannot be empty"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Last name cannot be empty"))]
    pub last_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Admission number cannot be empty"))]
    pub admission_no: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuardianRequest {
    pub parent_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Relationship is required"))]
    pub relationship: String,
}

/// Loads a class of the school and checks it has a free seat.
async fn class_with_room(state: &AppState, school_id: Uuid, class_id: Uuid) -> ApiResult<Class> {
    let class = referenced(
        create_class_repository(&state.db)
            .find(&within(school_id), class_id)
            .await?,
        "classId",
        ResourceKind::Class,
    )?;
    let enrolled = create_student_repository(&state.db)
        .class_enrolment(class.id)
        .await?;
    if enrolled >= class.capacity.max(0) as u64 {
        return Err(ApiError::BadRequest(format!(
            "Class {} is full ({} of {} places taken)",
            class.name, enrolled, class.capacity
        )));
    }
    Ok(class)
}

#[utoipa::path(
    get,
    path = "/api/v1/students",
    responses(
        (status = 200, description = "Students retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn list_students(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<StudentQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Student, list.school_id);

    let filter = StudentFilter {
        class_id: query.class_id,
        parent_id: query.parent_id,
        search: list.search(),
    };
    let students = create_student_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Students retrieved successfully").page("students", &students)
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}",
    params(("id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Student not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn get_student(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Student, scope.school_id);
    let student = visible(
        create_student_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Student,
    )?;

    Reply::ok("Student retrieved successfully").with("student", &student)
}

#[utoipa::path(
    post,
    path = "/api/v1/students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn create_student(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateStudentRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    if let Some(class_id) = request.class_id {
        class_with_room(&state, school_id, class_id).await?;
    }

    let students = create_student_repository(&state.db);
    if students
        .admission_taken(school_id, &request.admission_no, None)
        .await?
    {
        return Err(ApiError::Conflict(
            "Admission number already exists in this school".to_string(),
        ));
    }

    let student = students
        .create(&NewStudent {
            school_id,
            class_id: request.class_id,
            first_name: request.first_name,
            last_name: request.last_name,
            admission_no: request.admission_no,
            date_of_birth: request.date_of_birth,
            address: request.address,
            enrolled_on: request.enrolled_on,
        })
        .await?;

    info!(student_id = %student.id, school_id = %school_id, "Student created");
    Reply::created("Student created successfully").with("student", &student)
}

#[utoipa::path(
    put,
    path = "/api/v1/students/{id}",
    params(("id" = Uuid, Path, description = "Student id")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Student updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Student not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn update_student(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateStudentRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Student, None);
    let students = create_student_repository(&state.db);
    let existing = visible(students.find(&predicate, id).await?, ResourceKind::Student)?;
    request.validate()?;

    if let Some(class_id) = request.class_id.filter(|c| Some(*c) != existing.class_id) {
        class_with_room(&state, existing.school_id, class_id).await?;
    }
    if let Some(admission_no) = &request.admission_no {
        if students
            .admission_taken(existing.school_id, admission_no, Some(existing.id))
            .await?
        {
            return Err(ApiError::Conflict(
                "Admission number already exists in this school".to_string(),
            ));
        }
    }

    let student = students
        .update(
            existing.id,
            &StudentUpdate {
                class_id: request.class_id,
                first_name: request.first_name,
                last_name: request.last_name,
                admission_no: request.admission_no,
                date_of_birth: request.date_of_birth,
                address: request.address,
            },
        )
        .await?;

    info!(student_id = %student.id, "Student updated");
    Reply::ok("Student updated successfully").with("student", &student)
}

#[utoipa::path(
    delete,
    path = "/api/v1/students/{id}",
    params(("id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Student not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn delete_student(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Student, None);
    let students = create_student_repository(&state.db);
    let student = visible(students.find(&predicate, id).await?, ResourceKind::Student)?;

    ApiError::ensure_clear("student", students.dependents(student.id).await?)?;
    students.delete(student.id).await?;

    info!(student_id = %student.id, "Student deleted");
    Ok(Reply::ok("Student deleted successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}/guardians",
    params(("id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Guardians retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Student not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn list_guardians(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(list): Params<ListQuery>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    let predicate = caller.filter(ResourceKind::Student, list.school_id);
    let student = visible(
        create_student_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Student,
    )?;

    let filter = ParentFilter {
        student_id: Some(student.id),
        search: None,
    };
    let parents = create_parent_repository(&state.db)
        .list(&within(student.school_id), &filter, &list.pagination())
        .await?;

    Reply::ok("Guardians retrieved successfully").page("guardians", &parents)
}

#[utoipa::path(
    post,
    path = "/api/v1/students/{id}/guardians",
    params(("id" = Uuid, Path, description = "Student id")),
    request_body = GuardianRequest,
    responses(
        (status = 201, description = "Guardian linked successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Student not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn add_guardian(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<GuardianRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Student, None);
    let student = visible(
        create_student_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Student,
    )?;
    request.validate()?;

    let parents = create_parent_repository(&state.db);
    let parent = referenced(
        parents
            .find(&within(student.school_id), request.parent_id)
            .await?,
        "parentId",
        ResourceKind::Parent,
    )?;
    let guardianship = parents
        .add_guardianship(parent.id, student.id, request.relationship.trim())
        .await?;

    info!(student_id = %student.id, parent_id = %parent.id, "Guardian linked");
    Reply::created("Guardian linked successfully").with("guardianship", &guardianship)
}

#[utoipa::path(
    delete,
    path = "/api/v1/students/{id}/guardians/{parent_id}",
    params(
        ("id" = Uuid, Path, description = "Student id"),
        ("parent_id" = Uuid, Path, description = "Parent id")
    ),
    responses(
        (status = 200, description = "Guardian removed successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Student not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Students"
)]
pub async fn remove_guardian(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path((id, parent_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Student, None);
    let student = visible(
        create_student_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Student,
    )?;

    let removed = create_parent_repository(&state.db)
        .remove_guardianship(parent_id, student.id)
        .await?;
    if !removed {
        return Err(ApiError::not_found("Guardianship"));
    }

    info!(student_id = %student.id, parent_id = %parent_id, "Guardian unlinked");
    Ok(Reply::ok("Guardian removed successfully"))
}

// ============================================================================
// Teachers
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeacherRequest {
    pub school_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Login password; generated when omitted.
    pub password: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    pub hire_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeacherRequest {
    #[validate(length(min = 1, max = 100, message = "First name cannot be empty"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Last name cannot be empty"))]
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    pub hire_date: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/api/v1/teachers",
    responses(
        (status = 200, description = "Teachers retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Teachers"
)]
pub async fn list_teachers(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Teacher, list.school_id);

    let filter = TeacherFilter {
        search: list.search(),
    };
    let teachers = create_teacher_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Teachers retrieved successfully").page("teachers", &teachers)
}

#[utoipa::path(
    get,
    path = "/api/v1/teachers/{id}",
    params(("id" = Uuid, Path, description = "Teacher id")),
    responses(
        (status = 200, description = "Teacher retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Teacher not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Teachers"
)]
pub async fn get_teacher(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Teacher, scope.school_id);
    let teacher = visible(
        create_teacher_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Teacher,
    )?;

    Reply::ok("Teacher retrieved successfully").with("teacher", &teacher)
}

#[utoipa::path(
    post,
    path = "/api/v1/teachers",
    request_body = CreateTeacherRequest,
    responses(
        (status = 201, description = "Teacher created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Teachers"
)]
pub async fn create_teacher(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateTeacherRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;
    let (password, generated) = initial_password(request.password)?;

    if create_user_repository(&state.db)
        .email_taken(&request.email)
        .await?
    {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let (teacher, user) = create_teacher_repository(&state.db)
        .create_with_account(
            &NewTeacher {
                school_id,
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
                phone: request.phone,
                qualification: request.qualification,
                hire_date: request.hire_date,
            },
            &hash_password(&password)?,
        )
        .await?;

    info!(teacher_id = %teacher.id, user_id = %user.id, school_id = %school_id, "Teacher created");

    let reply = Reply::created("Teacher created successfully")
        .with("teacher", &teacher)?
        .with("user", &user)?;
    if generated {
        reply.with("temporaryPassword", &password)
    } else {
        Ok(reply)
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/teachers/{id}",
    params(("id" = Uuid, Path, description = "Teacher id")),
    request_body = UpdateTeacherRequest,
    responses(
        (status = 200, description = "Teacher updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Teacher not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Teachers"
)]
pub async fn update_teacher(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateTeacherRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Teacher, None);
    let teachers = create_teacher_repository(&state.db);
    let existing = visible(teachers.find(&predicate, id).await?, ResourceKind::Teacher)?;
    request.validate()?;

    let teacher = teachers
        .update(
            existing.id,
            &TeacherUpdate {
                first_name: request.first_name,
                last_name: request.last_name,
                phone: request.phone,
                qualification: request.qualification,
                hire_date: request.hire_date,
            },
        )
        .await?;

    info!(teacher_id = %teacher.id, "Teacher updated");
    Reply::ok("Teacher updated successfully").with("teacher", &teacher)
}

#[utoipa::path(
    delete,
    path = "/api/v1/teachers/{id}",
    params(("id" = Uuid, Path, description = "Teacher id")),
    responses(
        (status = 200, description = "Teacher deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Teacher not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Teachers"
)]
pub async fn delete_teacher(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Teacher, None);
    let teachers = create_teacher_repository(&state.db);
    let teacher = visible(teachers.find(&predicate, id).await?, ResourceKind::Teacher)?;

    ApiError::ensure_clear("teacher", teachers.dependents(teacher.id).await?)?;
    teachers.delete(teacher.id).await?;

    info!(teacher_id = %teacher.id, "Teacher deleted");
    Ok(Reply::ok("Teacher deleted successfully"))
}

// ============================================================================
// Parents
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentQuery {
    pub student_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateParentRequest {
    pub school_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    /// Login password; generated when omitted.
    pub password: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParentRequest {
    #[validate(length(min = 1, max = 100, message = "First name cannot be empty"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Last name cannot be empty"))]
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/parents",
    responses(
        (status = 200, description = "Parents retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Parents"
)]
pub async fn list_parents(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<ParentQuery>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    let predicate = caller.filter(ResourceKind::Parent, list.school_id);

    let filter = ParentFilter {
        student_id: query.student_id,
        search: list.search(),
    };
    let parents = create_parent_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Parents retrieved successfully").page("parents", &parents)
}

#[utoipa::path(
    get,
    path = "/api/v1/parents/{id}",
    params(("id" = Uuid, Path, description = "Parent id")),
    responses(
        (status = 200, description = "Parent retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Parent not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Parents"
)]
pub async fn get_parent(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    let predicate = caller.filter(ResourceKind::Parent, scope.school_id);
    let parent = visible(
        create_parent_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Parent,
    )?;

    Reply::ok("Parent retrieved successfully").with("parent", &parent)
}

#[utoipa::path(
    post,
    path = "/api/v1/parents",
    request_body = CreateParentRequest,
    responses(
        (status = 201, description = "Parent created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicts with an existing record", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Parents"
)]
pub async fn create_parent(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateParentRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;
    let (password, generated) = initial_password(request.password)?;

    if create_user_repository(&state.db)
        .email_taken(&request.email)
        .await?
    {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let (parent, user) = create_parent_repository(&state.db)
        .create_with_account(
            &NewParent {
                school_id,
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
                phone: request.phone,
                address: request.address,
            },
            &hash_password(&password)?,
        )
        .await?;

    info!(parent_id = %parent.id, user_id = %user.id, school_id = %school_id, "Parent created");

    let reply = Reply::created("Parent created successfully")
        .with("parent", &parent)?
        .with("user", &user)?;
    if generated {
        reply.with("temporaryPassword", &password)
    } else {
        Ok(reply)
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/parents/{id}",
    params(("id" = Uuid, Path, description = "Parent id")),
    request_body = UpdateParentRequest,
    responses(
        (status = 200, description = "Parent updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Parent not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Parents"
)]
pub async fn update_parent(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateParentRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Parent, None);
    let parents = create_parent_repository(&state.db);
    let existing = visible(parents.find(&predicate, id).await?, ResourceKind::Parent)?;
    request.validate()?;

    let parent = parents
        .update(
            existing.id,
            &ParentUpdate {
                first_name: request.first_name,
                last_name: request.last_name,
                phone: request.phone,
                address: request.address,
            },
        )
        .await?;

    info!(parent_id = %parent.id, "Parent updated");
    Reply::ok("Parent updated successfully").with("parent", &parent)
}

#[utoipa::path(
    delete,
    path = "/api/v1/parents/{id}",
    params(("id" = Uuid, Path, description = "Parent id")),
    responses(
        (status = 200, description = "Parent deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Parent not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Parents"
)]
pub async fn delete_parent(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Parent, None);
    let parents = create_parent_repository(&state.db);
    let parent = visible(parents.find(&predicate, id).await?, ResourceKind::Parent)?;

    ApiError::ensure_clear("parent", parents.dependents(parent.id).await?)?;
    parents.delete(parent.id).await?;

    info!(parent_id = %parent.id, "Parent deleted");
    Ok(Reply::ok("Parent deleted successfully"))
}
