//! API routes.
//!
//! Resource handlers share one order of work: role guard, tenant filter,
//! input validation, referential and conflict checks, then the write.

pub mod academics;
pub mod analytics;
pub mod assignments;
pub mod attendance;
pub mod auth;
pub mod calendar;
pub mod events;
pub mod exams;
pub mod health;
pub mod materials;
pub mod metrics;
pub mod notifications;
pub mod people;
pub mod report_cards;
pub mod schools;
pub mod timetables;
pub mod users;

use axum::Router;
use scholar_core::access::{Predicate, ResourceKind};
use scholar_core::auth::password::generate_password;
use scholar_core::auth::Role;
use scholar_core::db::{create_parent_repository, create_teacher_repository};
use scholar_core::validate_password_strength;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .merge(health::routes())
        .merge(metrics::routes())
        .with_state(state)
}

/// Resource routes under `/api/v1`.
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/users", users::routes())
        .nest("/schools", schools::routes())
        .nest("/students", people::student_routes())
        .nest("/teachers", people::teacher_routes())
        .nest("/parents", people::parent_routes())
        .nest("/grades", academics::grade_routes())
        .nest("/classes", academics::class_routes())
        .nest("/subjects", academics::subject_routes())
        .nest("/academic-calendar", calendar::routes())
        .nest("/timetables", timetables::routes())
        .nest("/exams", exams::routes())
        .nest("/assignments", assignments::routes())
        .nest("/attendance", attendance::routes())
        .nest("/report-cards", report_cards::routes())
        .nest("/notifications", notifications::routes())
        .nest("/materials", materials::routes())
        .nest("/events", events::routes())
        .nest("/analytics", analytics::routes())
        .merge(analytics::dashboard_routes())
}

/// A row looked up through the caller's predicate. Missing and hidden rows
/// are the same 404.
pub(crate) fn visible<T>(row: Option<T>, kind: ResourceKind) -> ApiResult<T> {
    row.ok_or_else(|| ApiError::not_found(kind.label()))
}

/// A row named by the request body that must exist in the target school.
pub(crate) fn referenced<T>(row: Option<T>, field: &str, kind: ResourceKind) -> ApiResult<T> {
    row.ok_or_else(|| {
        ApiError::validation_field(
            field,
            "not_found",
            &format!("{} not found in this school", kind.label()),
        )
    })
}

/// Password for a new login: the supplied one if strong enough, otherwise
/// a generated one. The flag is true when the password was generated.
pub(crate) fn initial_password(supplied: Option<String>) -> ApiResult<(String, bool)> {
    let Some(password) = supplied else {
        return Ok((generate_password(16), true));
    };
    let problems = validate_password_strength(&password);
    if !problems.is_empty() {
        return Err(ApiError::validation_field(
            "password",
            "weak_password",
            &problems.join("; "),
        ));
    }
    Ok((password, false))
}

/// Teachers may only act on classes they supervise or teach a lesson in.
/// Other staff roles pass through.
pub(crate) async fn ensure_teaches(
    state: &AppState,
    caller: &CurrentUser,
    class_id: Uuid,
) -> ApiResult<()> {
    if !caller.identity.has_role(Role::Teacher) {
        return Ok(());
    }
    let Some(teacher_id) = caller.identity.teacher_id else {
        return Err(ApiError::Forbidden(
            "Account is not linked to a teacher record".to_string(),
        ));
    };
    if create_teacher_repository(&state.db)
        .teaches_class(teacher_id, class_id)
        .await?
    {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "You do not teach this class".to_string(),
        ))
    }
}

/// A parent acting for a student must be one of the student's guardians.
/// Returns the parent record id.
pub(crate) async fn ensure_guardian(
    state: &AppState,
    caller: &CurrentUser,
    student_id: Uuid,
) -> ApiResult<Uuid> {
    let Some(parent_id) = caller.identity.parent_id else {
        return Err(ApiError::Forbidden(
            "Account is not linked to a parent record".to_string(),
        ));
    };
    if create_parent_repository(&state.db)
        .is_guardian(parent_id, student_id)
        .await?
    {
        Ok(parent_id)
    } else {
        Err(ApiError::Forbidden(
            "You are not a guardian of this student".to_string(),
        ))
    }
}

/// Predicate for referential checks inside one school.
pub(crate) fn within(school_id: Uuid) -> Predicate {
    Predicate::Tenant { school_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_and_missing_look_the_same() {
        let err = visible::<()>(None, ResourceKind::Student).unwrap_err();
        assert_eq!(err.to_string(), "Student not found");
    }

    #[test]
    fn test_reference_failure_names_the_field() {
        match referenced::<()>(None, "classId", ResourceKind::Class).unwrap_err() {
            ApiError::ValidationError(details) => {
                assert_eq!(details.errors[0].field, "classId");
                assert_eq!(details.errors[0].message, "Class not found in this school");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_initial_password() {
        let (generated, was_generated) = initial_password(None).unwrap();
        assert!(was_generated);
        assert!(validate_password_strength(&generated).is_empty());

        let (kept, was_generated) = initial_password(Some("Str0ngPass".into())).unwrap();
        assert_eq!(kept, "Str0ngPass");
        assert!(!was_generated);

        assert!(initial_password(Some("weak".into())).is_err());
    }
}
