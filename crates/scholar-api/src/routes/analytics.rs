//! Dashboard and analytics read models.
//!
//! Every figure is computed under the caller's predicate; `schoolId` only
//! narrows what a super admin sees.

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use scholar_core::access::{ResourceKind, ANY_ROLE, STAFF};
use scholar_core::db::AttendanceScope;

use super::visible;
use crate::auth::CurrentUser;
use crate::dto::{Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::Params;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/students/:id", get(student_analytics))
        .route("/classes/:id", get(class_analytics))
        .route("/attendance", get(attendance_analytics))
        .route("/assignments/:id", get(assignment_analytics))
}

/// `/dashboard` sits beside the resource routes rather than under
/// `/analytics`.
pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    pub school_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

async fn dashboard(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let dashboard = state
        .analytics
        .dashboard(&caller.identity, scope.school_id)
        .await?;

    Reply::ok("Dashboard retrieved successfully").with("dashboard", &dashboard)
}

async fn student_analytics(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let analytics = visible(
        state
            .analytics
            .student(&caller.identity, scope.school_id, id)
            .await?,
        ResourceKind::Student,
    )?;

    Reply::ok("Student analytics retrieved successfully").with("analytics", &analytics)
}

async fn class_analytics(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    let analytics = visible(
        state
            .analytics
            .class(&caller.identity, scope.school_id, id)
            .await?,
        ResourceKind::Class,
    )?;

    Reply::ok("Class analytics retrieved successfully").with("analytics", &analytics)
}

/// Present share for a student, a class, or the caller's whole scope.
async fn attendance_analytics(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(query): Params<AttendanceQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if to < from {
            return Err(ApiError::validation_field(
                "to",
                "range",
                "End date must not be before start date",
            ));
        }
    }

    let scope = AttendanceScope {
        student_id: query.student_id,
        class_id: query.class_id,
        from: query.from,
        to: query.to,
    };
    let summary = state
        .analytics
        .attendance(&caller.identity, query.school_id, &scope)
        .await?;

    Reply::ok("Attendance analytics retrieved successfully").with("attendance", &summary)
}

async fn assignment_analytics(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(STAFF)?;
    let analytics = visible(
        state
            .analytics
            .assignment(&caller.identity, scope.school_id, id)
            .await?,
        ResourceKind::Assignment,
    )?;

    Reply::ok("Assignment analytics retrieved successfully").with("analytics", &analytics)
}
