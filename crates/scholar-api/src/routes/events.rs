//! School calendar events.

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ADMINS, ANY_ROLE};
use scholar_core::auth::Role;
use scholar_core::db::{create_class_repository, create_event_repository, EventFilter};
use scholar_core::fanout::Audience;
use scholar_core::models::{Event, EventUpdate, NewEvent, NewNotification, NotificationCategory};

use super::{referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route(
            "/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub class_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub school_id: Option<Uuid>,
    /// Class-only event; school-wide when absent.
    pub class_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

fn ensure_ordered(start: DateTime<Utc>, end: DateTime<Utc>) -> ApiResult<()> {
    if end < start {
        return Err(ApiError::validation_field(
            "endAt",
            "range",
            "End must not be before start",
        ));
    }
    Ok(())
}

/// Guardians of the class, or every parent and teacher of the school.
fn audience_for(event: &Event) -> Audience {
    match event.class_id {
        Some(class_id) => Audience::ClassGuardians(class_id),
        None => Audience::School {
            school_id: event.school_id,
            roles: vec![Role::Parent, Role::Teacher],
        },
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/events",
    responses(
        (status = 200, description = "Events retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<EventQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Event, list.school_id);

    let filter = EventFilter {
        class_id: query.class_id,
        from: query.from,
        to: query.to,
    };
    let events = create_event_repository(&state.db)
        .list(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Events retrieved successfully").page("events", &events)
}

#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    params(("id" = Uuid, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Event not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Event, scope.school_id);
    let event = visible(
        create_event_repository(&state.db).find(&predicate, id).await?,
        ResourceKind::Event,
    )?;

    Reply::ok("Event retrieved successfully").with("event", &event)
}

#[utoipa::path(
    post,
    path = "/api/v1/events",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Events"
)]
pub async fn create_event(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateEventRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    ensure_ordered(request.start_at, request.end_at)?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    if let Some(class_id) = request.class_id {
        referenced(
            create_class_repository(&state.db)
                .find(&within(school_id), class_id)
                .await?,
            "classId",
            ResourceKind::Class,
        )?;
    }

    let event = create_event_repository(&state.db)
        .create(&NewEvent {
            school_id,
            class_id: request.class_id,
            title: request.title,
            description: request.description,
            location: request.location,
            start_at: request.start_at,
            end_at: request.end_at,
            created_by: Some(caller.user.id),
        })
        .await?;

    info!(event_id = %event.id, school_id = %school_id, "Event created");

    let notification = NewNotification::new(
        NotificationCategory::Event,
        format!("New event: {}", event.title),
        format!("{} starts {}", event.title, event.start_at.format("%Y-%m-%d %H:%M UTC")),
    )
    .in_school(school_id)
    .with_metadata(json!({ "eventId": event.id }));
    state
        .notifier
        .notify(&audience_for(&event), &notification)
        .await;

    Reply::created("Event created successfully").with("event", &event)
}

#[utoipa::path(
    put,
    path = "/api/v1/events/{id}",
    params(("id" = Uuid, Path, description = "Event id")),
    request_body = UpdateEventRequest,
    responses(
        (status = 200, description = "Event updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Event not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Events"
)]
pub async fn update_event(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateEventRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Event, None);
    let events = create_event_repository(&state.db);
    let existing = visible(events.find(&predicate, id).await?, ResourceKind::Event)?;
    request.validate()?;

    ensure_ordered(
        request.start_at.unwrap_or(existing.start_at),
        request.end_at.unwrap_or(existing.end_at),
    )?;

    let event = events
        .update(
            existing.id,
            &EventUpdate {
                title: request.title,
                description: request.description,
                location: request.location,
                start_at: request.start_at,
                end_at: request.end_at,
            },
        )
        .await?;

    info!(event_id = %event.id, "Event updated");
    Reply::ok("Event updated successfully").with("event", &event)
}

#[utoipa::path(
    delete,
    path = "/api/v1/events/{id}",
    params(("id" = Uuid, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event deleted successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Event not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Events"
)]
pub async fn delete_event(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Event, None);
    let events = create_event_repository(&state.db);
    let event = visible(events.find(&predicate, id).await?, ResourceKind::Event)?;

    events.delete(event.id).await?;

    info!(event_id = %event.id, "Event deleted");
    Ok(Reply::ok("Event deleted successfully"))
}
