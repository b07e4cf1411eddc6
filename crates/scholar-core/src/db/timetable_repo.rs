//! Weekly timetable slots (lessons).

use super::convert::{now_ts, parse_enum, parse_ts, parse_uuid};
use super::scope::{Changes, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{Lesson, LessonUpdate, NewLesson};
use crate::schedule::ClockTime;
use async_trait::async_trait;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::Lesson,
    columns: "id, school_id, class_id, subject_id, teacher_id, day_of_week, start_time, \
              end_time, room, created_at, updated_at",
    order_by: "day_of_week ASC, start_time ASC",
};

#[derive(Debug, Clone, Default)]
pub struct LessonFilter {
    pub class_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub day_of_week: Option<u8>,
}

/// A proposed slot and what it would collide with.
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest {
    pub class_id: Uuid,
    pub teacher_id: Uuid,
    pub day_of_week: u8,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// The lesson being edited, ignored by the check.
    pub except: Option<Uuid>,
}

/// An existing lesson that a proposed slot intersects.
#[derive(Debug, Clone)]
pub enum SlotConflict {
    Class(Lesson),
    Teacher(Lesson),
}

impl SlotConflict {
    pub fn lesson(&self) -> &Lesson {
        match self {
            SlotConflict::Class(l) | SlotConflict::Teacher(l) => l,
        }
    }
}

#[async_trait]
pub trait TimetableRepository: Send + Sync {
    async fn create(&self, lesson: &NewLesson) -> Result<Lesson, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Lesson>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &LessonFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Lesson>, DbError>;

    /// First lesson on the same weekday whose time range intersects the
    /// request, for either the same class or the same teacher.
    async fn find_conflict(&self, slot: &SlotRequest) -> Result<Option<SlotConflict>, DbError>;

    async fn update(&self, id: Uuid, update: &LessonUpdate) -> Result<Lesson, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteTimetableRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteTimetableRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    async fn overlapping(
        &self,
        column: &'static str,
        owner: Uuid,
        slot: &SlotRequest,
    ) -> Result<Option<Lesson>, DbError> {
        let row: Option<LessonRow> = sqlx::query_as(&format!(
            "SELECT {} FROM lessons \
             WHERE {} = ? AND day_of_week = ? AND ? <= end_time AND start_time <= ? AND id != ? \
             ORDER BY start_time LIMIT 1",
            TABLE.columns, column
        ))
        .bind(owner.to_string())
        .bind(i64::from(slot.day_of_week))
        .bind(slot.start_time.to_string())
        .bind(slot.end_time.to_string())
        .bind(slot.except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Lesson::try_from).transpose()
    }
}

#[async_trait]
impl TimetableRepository for SqliteTimetableRepository {
    async fn create(&self, lesson: &NewLesson) -> Result<Lesson, DbError> {
        let now = now_ts();
        let row: LessonRow = sqlx::query_as(&format!(
            "INSERT INTO lessons ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            TABLE.columns, TABLE.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(lesson.school_id.to_string())
        .bind(lesson.class_id.to_string())
        .bind(lesson.subject_id.to_string())
        .bind(lesson.teacher_id.to_string())
        .bind(i64::from(lesson.day_of_week))
        .bind(lesson.start_time.to_string())
        .bind(lesson.end_time.to_string())
        .bind(&lesson.room)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Lesson>, DbError> {
        TABLE.find::<LessonRow, Lesson>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &LessonFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Lesson>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("class_id", filter.class_id)
            .eq_opt("teacher_id", filter.teacher_id)
            .eq_opt("day_of_week", filter.day_of_week);
        TABLE
            .list::<LessonRow, Lesson>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn find_conflict(&self, slot: &SlotRequest) -> Result<Option<SlotConflict>, DbError> {
        if let Some(lesson) = self.overlapping("class_id", slot.class_id, slot).await? {
            return Ok(Some(SlotConflict::Class(lesson)));
        }
        Ok(self
            .overlapping("teacher_id", slot.teacher_id, slot)
            .await?
            .map(SlotConflict::Teacher))
    }

    async fn update(&self, id: Uuid, update: &LessonUpdate) -> Result<Lesson, DbError> {
        let changes = Changes::new()
            .set_opt("subject_id", update.subject_id)
            .set_opt("teacher_id", update.teacher_id)
            .set_opt("day_of_week", update.day_of_week)
            .set_opt("start_time", update.start_time)
            .set_opt("end_time", update.end_time)
            .set_opt("room", update.room.clone());
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Timetable entry", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Timetable entry", id))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        TABLE.delete(&self.pool, id).await
    }
}

pub fn create_timetable_repository(pool: &DbPool) -> Box<dyn TimetableRepository> {
    Box::new(SqliteTimetableRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct LessonRow {
    id: String,
    school_id: String,
    class_id: String,
    subject_id: String,
    teacher_id: String,
    day_of_week: i64,
    start_time: String,
    end_time: String,
    room: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<LessonRow> for Lesson {
    type Error = DbError;

    fn try_from(row: LessonRow) -> Result<Self, Self::Error> {
        Ok(Lesson {
            id: parse_uuid(&row.id, "lessons.id")?,
            school_id: parse_uuid(&row.school_id, "lessons.school_id")?,
            class_id: parse_uuid(&row.class_id, "lessons.class_id")?,
            subject_id: parse_uuid(&row.subject_id, "lessons.subject_id")?,
            teacher_id: parse_uuid(&row.teacher_id, "lessons.teacher_id")?,
            day_of_week: u8::try_from(row.day_of_week).map_err(|_| {
                DbError::Serialization(format!("Invalid lessons.day_of_week: {}", row.day_of_week))
            })?,
            start_time: parse_enum(&row.start_time, "lessons.start_time")?,
            end_time: parse_enum(&row.end_time, "lessons.end_time")?,
            room: row.room,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
