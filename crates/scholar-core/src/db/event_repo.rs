//! School and class calendar events.

use super::convert::{fmt_ts, now_ts, parse_opt_uuid, parse_ts, parse_uuid};
use super::scope::{Changes, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{Event, EventUpdate, NewEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::Event,
    columns: "id, school_id, class_id, title, description, location, start_at, end_at, \
              created_by, created_at, updated_at",
    order_by: "start_at ASC",
};

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub class_id: Option<Uuid>,
    /// Events starting at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Events starting at or before this instant.
    pub to: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, event: &NewEvent) -> Result<Event, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Event>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &EventFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Event>, DbError>;

    async fn update(&self, id: Uuid, update: &EventUpdate) -> Result<Event, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteEventRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn create(&self, event: &NewEvent) -> Result<Event, DbError> {
        let now = now_ts();
        let row: EventRow = sqlx::query_as(&format!(
            "INSERT INTO events ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            TABLE.columns, TABLE.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(event.school_id.to_string())
        .bind(event.class_id.map(|id| id.to_string()))
        .bind(event.title.trim())
        .bind(&event.description)
        .bind(&event.location)
        .bind(fmt_ts(event.start_at))
        .bind(fmt_ts(event.end_at))
        .bind(event.created_by.map(|id| id.to_string()))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Event>, DbError> {
        TABLE.find::<EventRow, Event>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &EventFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Event>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("class_id", filter.class_id)
            .gte_opt("start_at", filter.from)
            .lte_opt("start_at", filter.to);
        TABLE
            .list::<EventRow, Event>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn update(&self, id: Uuid, update: &EventUpdate) -> Result<Event, DbError> {
        let changes = Changes::new()
            .set_opt("title", update.title.as_deref().map(str::trim))
            .set_opt("description", update.description.clone())
            .set_opt("location", update.location.clone())
            .set_opt("start_at", update.start_at)
            .set_opt("end_at", update.end_at);
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Event", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Event", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        TABLE.delete(&self.pool, id).await
    }
}

pub fn create_event_repository(pool: &DbPool) -> Box<dyn EventRepository> {
    Box::new(SqliteEventRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    school_id: String,
    class_id: Option<String>,
    title: String,
    description: Option<String>,
    location: Option<String>,
    start_at: String,
    end_at: String,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EventRow> for Event {
    type Error = DbError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: parse_uuid(&row.id, "events.id")?,
            school_id: parse_uuid(&row.school_id, "events.school_id")?,
            class_id: parse_opt_uuid(row.class_id, "events.class_id")?,
            title: row.title,
            description: row.description,
            location: row.location,
            start_at: parse_ts(&row.start_at)?,
            end_at: parse_ts(&row.end_at)?,
            created_by: parse_opt_uuid(row.created_by, "events.created_by")?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Relationship;
    use crate::db::create_parent_repository;
    use crate::db::test_support::{seed_parent, seed_school, seed_student, test_pool};
    use chrono::{Duration, TimeZone};

    fn new_event(school_id: Uuid, start: DateTime<Utc>) -> NewEvent {
        NewEvent {
            school_id,
            class_id: None,
            title: "Open day".into(),
            description: None,
            location: Some("Hall".into()),
            start_at: start,
            end_at: start + Duration::hours(2),
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_date_window() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "EVT").await;
        let repo = create_event_repository(&pool);
        let base = Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap();
        for days in [0, 10, 40] {
            repo.create(&new_event(school.id, base + Duration::days(days)))
                .await
                .unwrap();
        }

        let page = repo
            .list(
                &Predicate::Tenant { school_id: school.id },
                &EventFilter {
                    from: Some(base + Duration::days(1)),
                    to: Some(base + Duration::days(30)),
                    ..Default::default()
                },
                &Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].start_at, base + Duration::days(10));
    }

    #[tokio::test]
    async fn test_parent_sees_events_of_childrens_schools() {
        let pool = test_pool().await;
        let home = seed_school(&pool, "EVH").await;
        let away = seed_school(&pool, "EVA").await;
        let (parent, _) = seed_parent(&pool, home.id, "p@evh.test").await;
        let child = seed_student(&pool, home.id, None, "EV-1").await;
        create_parent_repository(&pool)
            .add_guardianship(parent.id, child.id, "mother")
            .await
            .unwrap();

        let repo = create_event_repository(&pool);
        let start = Utc.with_ymd_and_hms(2024, 12, 1, 9, 0, 0).unwrap();
        let visible = repo.create(&new_event(home.id, start)).await.unwrap();
        repo.create(&new_event(away.id, start)).await.unwrap();

        let page = repo
            .list(
                &Predicate::Related {
                    school_id: home.id,
                    relationship: Relationship::Guardian {
                        parent_id: parent.id,
                    },
                },
                &EventFilter::default(),
                &Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, visible.id);
    }
}
