//! Common test utilities for integration tests.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use scholar_api::{routes, AppState};
use scholar_core::auth::token::TokenService;
use scholar_core::auth::{Role, User};
use scholar_core::db::{
    create_parent_repository, create_pool_with_options, create_school_repository,
    create_teacher_repository, create_user_repository, run_migrations, ParentRepository,
    PoolOptions, SchoolRepository, TeacherRepository, UserRepository,
};
use scholar_core::hash_password;
use scholar_core::models::{
    NewParent, NewSchool, NewTeacher, Parent, School, Teacher, VerificationStatus,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Passw0rdOk";

/// A router over a fresh, migrated in-memory database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let url = format!(
            "sqlite:file:api_test_{}?mode=memory&cache=shared",
            Uuid::new_v4()
        );
        let pool = create_pool_with_options(&url, PoolOptions::single_connection())
            .await
            .expect("Failed to create SQLite pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let state = AppState::new(pool, TokenService::new("integration-test-secret"));
        let router = routes::create_router(state.clone());
        Self { router, state }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                panic!(
                    "Failed to parse response: {} - Body: {:?}",
                    e,
                    String::from_utf8_lossy(&bytes)
                )
            })
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    /// POSTs and asserts `201`, returning the payload under `key`.
    pub async fn create(&self, uri: &str, token: &str, key: &str, body: Value) -> Value {
        let (status, response) = self.post(uri, token, body).await;
        assert_eq!(status, StatusCode::CREATED, "POST {} failed: {}", uri, response);
        response[key].clone()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state.tokens.issue_access(user).unwrap()
    }

    /// A valid token for `user` that claims an arbitrary role name.
    pub fn token_claiming(&self, user: &User, role: &str) -> String {
        let mut claims = self.state.tokens.verify(&self.token_for(user)).unwrap();
        claims.role = role.to_string();
        self.state.tokens.sign(&claims).unwrap()
    }

    /// An approved school.
    pub async fn school(&self, code: &str) -> School {
        create_school_repository(&self.state.db)
            .create(&NewSchool {
                name: format!("{} School", code),
                code: code.to_string(),
                email: None,
                phone: None,
                address: None,
                verification_status: VerificationStatus::Approved,
            })
            .await
            .unwrap()
    }

    /// A plain account with a usable password and its access token.
    pub async fn account(&self, school_id: Option<Uuid>, role: Role, email: &str) -> (User, String) {
        let user = User::new(
            email,
            hash_password(PASSWORD).unwrap(),
            "Test",
            "User",
            role,
            school_id,
        );
        let user = create_user_repository(&self.state.db)
            .create(&user)
            .await
            .unwrap();
        let token = self.token_for(&user);
        (user, token)
    }

    pub async fn admin(&self, school: &School) -> String {
        let email = format!("admin@{}.test", school.code.to_lowercase());
        self.account(Some(school.id), Role::SchoolAdmin, &email).await.1
    }

    pub async fn super_admin(&self) -> String {
        self.account(None, Role::SuperAdmin, "root@scholar.test").await.1
    }

    pub async fn teacher(&self, school: &School, email: &str) -> (Teacher, String) {
        let (teacher, user) = create_teacher_repository(&self.state.db)
            .create_with_account(
                &NewTeacher {
                    school_id: school.id,
                    first_name: "Tess".into(),
                    last_name: "Teacher".into(),
                    email: email.into(),
                    phone: None,
                    qualification: None,
                    hire_date: None,
                },
                &hash_password(PASSWORD).unwrap(),
            )
            .await
            .unwrap();
        let token = self.token_for(&user);
        (teacher, token)
    }

    pub async fn parent(&self, school: &School, email: &str) -> (Parent, String) {
        let (parent, user) = create_parent_repository(&self.state.db)
            .create_with_account(
                &NewParent {
                    school_id: school.id,
                    first_name: "Pat".into(),
                    last_name: "Parent".into(),
                    email: email.into(),
                    phone: None,
                    address: None,
                },
                &hash_password(PASSWORD).unwrap(),
            )
            .await
            .unwrap();
        let token = self.token_for(&user);
        (parent, token)
    }
}

/// Grade, class, subject and `students` pupils created through the API.
pub struct Classroom {
    pub class_id: String,
    pub subject_id: String,
    pub student_ids: Vec<String>,
}

pub async fn classroom(
    app: &TestApp,
    token: &str,
    name: &str,
    level: i64,
    students: usize,
) -> Classroom {
    let grade = app
        .create(
            "/api/v1/grades",
            token,
            "grade",
            json!({ "level": level, "name": format!("Grade {}", level) }),
        )
        .await;
    let class = app
        .create(
            "/api/v1/classes",
            token,
            "class",
            json!({ "gradeId": grade["id"], "name": name, "capacity": 30 }),
        )
        .await;
    let subject = app
        .create(
            "/api/v1/subjects",
            token,
            "subject",
            json!({ "name": "Mathematics", "code": format!("MATH-{}", name) }),
        )
        .await;

    let mut student_ids = Vec::new();
    for i in 0..students {
        let student = app
            .create(
                "/api/v1/students",
                token,
                "student",
                json!({
                    "classId": class["id"],
                    "firstName": format!("Student{}", i),
                    "lastName": "Example",
                    "admissionNo": format!("{}-{}", name, i),
                }),
            )
            .await;
        student_ids.push(student["id"].as_str().unwrap().to_string());
    }

    Classroom {
        class_id: class["id"].as_str().unwrap().to_string(),
        subject_id: subject["id"].as_str().unwrap().to_string(),
        student_ids,
    }
}

/// An academic year 2024/25 with one active term covering the school year.
pub async fn term(app: &TestApp, token: &str) -> String {
    let year = app
        .create(
            "/api/v1/academic-calendar/years",
            token,
            "academicYear",
            json!({
                "name": "2024/25",
                "startDate": "2024-09-01",
                "endDate": "2025-08-31",
                "isCurrent": true
            }),
        )
        .await;
    let term = app
        .create(
            "/api/v1/academic-calendar/terms",
            token,
            "term",
            json!({
                "academicYearId": year["id"],
                "name": "Main term",
                "startDate": "2024-09-01",
                "endDate": "2025-06-30"
            }),
        )
        .await;
    term["id"].as_str().unwrap().to_string()
}
