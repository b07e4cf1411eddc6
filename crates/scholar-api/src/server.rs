//! API server implementation.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::dto::MessageResponse;
use crate::error::{ErrorResponse, FieldError};
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::routes;
use crate::routes::{
    academics, assignments, attendance, calendar, events, exams, materials, notifications, people,
    report_cards, schools, timetables, users,
};
use crate::routes::auth::{LoginRequest, RefreshRequest, RegisterRequest, TokenPair};
use crate::routes::health::{DatabaseHealth, HealthResponse};
use crate::state::AppState;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,
    /// Requests running longer are answered with 408.
    pub request_timeout: Duration,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            enable_swagger: true,
            request_timeout: Duration::from_secs(30),
        }
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::health::liveness_check,
        crate::routes::metrics::prometheus_metrics,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::refresh,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::schools::list_schools,
        crate::routes::schools::create_school,
        crate::routes::schools::get_school,
        crate::routes::schools::update_school,
        crate::routes::schools::delete_school,
        crate::routes::schools::verify_school,
        crate::routes::users::list_users,
        crate::routes::users::create_user,
        crate::routes::users::get_user,
        crate::routes::users::activate_user,
        crate::routes::users::deactivate_user,
        crate::routes::people::list_students,
        crate::routes::people::create_student,
        crate::routes::people::get_student,
        crate::routes::people::update_student,
        crate::routes::people::delete_student,
        crate::routes::people::list_guardians,
        crate::routes::people::add_guardian,
        crate::routes::people::remove_guardian,
        crate::routes::people::list_teachers,
        crate::routes::people::create_teacher,
        crate::routes::people::get_teacher,
        crate::routes::people::update_teacher,
        crate::routes::people::delete_teacher,
        crate::routes::people::list_parents,
        crate::routes::people::create_parent,
        crate::routes::people::get_parent,
        crate::routes::people::update_parent,
        crate::routes::people::delete_parent,
        crate::routes::academics::list_grades,
        crate::routes::academics::create_grade,
        crate::routes::academics::get_grade,
        crate::routes::academics::update_grade,
        crate::routes::academics::delete_grade,
        crate::routes::academics::list_classes,
        crate::routes::academics::create_class,
        crate::routes::academics::get_class,
        crate::routes::academics::update_class,
        crate::routes::academics::delete_class,
        crate::routes::academics::list_subjects,
        crate::routes::academics::create_subject,
        crate::routes::academics::get_subject,
        crate::routes::academics::update_subject,
        crate::routes::academics::delete_subject,
        crate::routes::calendar::list_years,
        crate::routes::calendar::create_year,
        crate::routes::calendar::get_year,
        crate::routes::calendar::update_year,
        crate::routes::calendar::delete_year,
        crate::routes::calendar::list_terms,
        crate::routes::calendar::create_term,
        crate::routes::calendar::get_term,
        crate::routes::calendar::update_term,
        crate::routes::calendar::delete_term,
        crate::routes::timetables::list_lessons,
        crate::routes::timetables::create_lesson,
        crate::routes::timetables::get_lesson,
        crate::routes::timetables::update_lesson,
        crate::routes::timetables::delete_lesson,
        crate::routes::exams::list_exams,
        crate::routes::exams::create_exam,
        crate::routes::exams::get_exam,
        crate::routes::exams::update_exam,
        crate::routes::exams::delete_exam,
        crate::routes::exams::list_questions,
        crate::routes::exams::add_question,
        crate::routes::exams::delete_question,
        crate::routes::exams::list_results,
        crate::routes::exams::record_results,
        crate::routes::assignments::list_assignments,
        crate::routes::assignments::create_assignment,
        crate::routes::assignments::get_assignment,
        crate::routes::assignments::update_assignment,
        crate::routes::assignments::delete_assignment,
        crate::routes::assignments::list_submissions,
        crate::routes::assignments::submit_assignment,
        crate::routes::assignments::grade_submission,
        crate::routes::attendance::list_attendance,
        crate::routes::attendance::mark_attendance,
        crate::routes::attendance::get_attendance,
        crate::routes::attendance::delete_attendance,
        crate::routes::report_cards::list_report_cards,
        crate::routes::report_cards::generate_report_card,
        crate::routes::report_cards::get_report_card,
        crate::routes::report_cards::delete_report_card,
        crate::routes::report_cards::publish_report_card,
        crate::routes::notifications::list_notifications,
        crate::routes::notifications::unread_count,
        crate::routes::notifications::mark_all_read,
        crate::routes::notifications::broadcast,
        crate::routes::notifications::get_notification,
        crate::routes::notifications::delete_notification,
        crate::routes::notifications::mark_read,
        crate::routes::materials::list_materials,
        crate::routes::materials::create_material,
        crate::routes::materials::list_orders,
        crate::routes::materials::place_order,
        crate::routes::materials::get_order,
        crate::routes::materials::change_order_status,
        crate::routes::materials::get_material,
        crate::routes::materials::update_material,
        crate::routes::materials::delete_material,
        crate::routes::events::list_events,
        crate::routes::events::create_event,
        crate::routes::events::get_event,
        crate::routes::events::update_event,
        crate::routes::events::delete_event,
    ),
    components(
        schemas(
            HealthResponse,
            DatabaseHealth,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            TokenPair,
            schools::CreateSchoolRequest,
            schools::UpdateSchoolRequest,
            schools::VerificationRequest,
            users::CreateUserRequest,
            people::CreateStudentRequest,
            people::UpdateStudentRequest,
            people::GuardianRequest,
            people::CreateTeacherRequest,
            people::UpdateTeacherRequest,
            people::CreateParentRequest,
            people::UpdateParentRequest,
            academics::CreateGradeRequest,
            academics::UpdateGradeRequest,
            academics::CreateClassRequest,
            academics::UpdateClassRequest,
            academics::CreateSubjectRequest,
            academics::UpdateSubjectRequest,
            calendar::CreateYearRequest,
            calendar::UpdateYearRequest,
            calendar::CreateTermRequest,
            calendar::UpdateTermRequest,
            timetables::CreateLessonRequest,
            timetables::UpdateLessonRequest,
            exams::CreateExamRequest,
            exams::UpdateExamRequest,
            exams::CreateQuestionRequest,
            exams::ResultInput,
            exams::RecordResultsRequest,
            assignments::CreateAssignmentRequest,
            assignments::UpdateAssignmentRequest,
            assignments::SubmitRequest,
            assignments::GradeRequest,
            attendance::MarkInput,
            attendance::MarkAttendanceRequest,
            report_cards::GenerateReportCardRequest,
            notifications::BroadcastRequest,
            materials::CreateMaterialRequest,
            materials::UpdateMaterialRequest,
            materials::PlaceOrderRequest,
            materials::OrderStatusRequest,
            events::CreateEventRequest,
            events::UpdateEventRequest,
            MessageResponse,
            ErrorResponse,
            FieldError,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Registration, sign-in and token rotation"),
        (name = "Metrics", description = "Prometheus metrics"),
        (name = "Schools", description = "School registry and verification"),
        (name = "Users", description = "Accounts within a school"),
        (name = "Students", description = "Student records and guardians"),
        (name = "Teachers", description = "Teaching staff"),
        (name = "Parents", description = "Parents and guardians"),
        (name = "Grades", description = "Year levels"),
        (name = "Classes", description = "Classes within a year level"),
        (name = "Subjects", description = "Taught subjects"),
        (name = "Calendar", description = "Academic years and terms"),
        (name = "Timetables", description = "Weekly lesson slots"),
        (name = "Exams", description = "Exams, questions and results"),
        (name = "Assignments", description = "Assignments and submissions"),
        (name = "Attendance", description = "Daily class registers"),
        (name = "Report cards", description = "Term report cards"),
        (name = "Notifications", description = "Per-user inbox and broadcasts"),
        (name = "Materials", description = "School shop and material orders"),
        (name = "Events", description = "School and class events"),
    ),
    info(
        title = "Scholar API",
        version = "0.1.0",
        description = "Multi-tenant school management API",
        license(name = "MIT"),
    )
)]
pub struct ApiDoc;

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState, config: ApiServerConfig) -> Self {
        Self { config, state }
    }

    pub fn with_state(state: AppState) -> Self {
        Self::new(state, ApiServerConfig::default())
    }

    /// Builds the router with every middleware layer applied.
    pub fn router(&self) -> Router {
        routes::health::init_start_time();

        let mut app = routes::create_router(self.state.clone());

        if self.config.enable_swagger {
            app = app.merge(
                SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
            );
        }

        // Innermost first.
        app.layer(middleware::from_fn(security_headers))
            .layer(middleware::from_fn(request_logging))
            .layer(middleware::from_fn(request_id))
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer())
            .layer(CatchPanicLayer::new())
    }

    /// Serves until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<(), std::io::Error> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then closes the database pool.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let addr = self.config.bind_address;

        info!(address = %addr, "Starting API server");

        let listener = TcpListener::bind(addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.state.db.close().await;
        info!("API server shut down gracefully");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholar_core::auth::token::TokenService;
    use scholar_core::db::create_pool;

    #[tokio::test]
    async fn test_router_creation() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let state = AppState::new(pool, TokenService::new("test-secret"));

        let _router = ApiServer::with_state(state).router();
    }

    #[test]
    fn test_openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
        assert!(doc.paths.paths.contains_key("/api/v1/auth/login"));
    }

    #[test]
    fn test_openapi_documents_resource_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/students",
            "/api/v1/students/{id}",
            "/api/v1/classes",
            "/api/v1/exams/{id}/results",
            "/api/v1/materials/orders/{id}/status",
            "/api/v1/academic-calendar/terms",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }

        let schemas = doc.components.unwrap().schemas;
        for name in ["CreateStudentRequest", "MarkAttendanceRequest", "ResultInput"] {
            assert!(schemas.contains_key(name), "missing schema {}", name);
        }
    }
}
