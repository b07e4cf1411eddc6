//! Daily attendance registers.

use super::convert::{fmt_date, now_ts, parse_date, parse_enum, parse_opt_uuid, parse_ts, parse_uuid};
use super::scope::{RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{AttendanceMark, AttendanceRecord, AttendanceStatus, Class};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::Attendance,
    columns: "id, school_id, class_id, student_id, date, status, remarks, recorded_by, \
              created_at, updated_at",
    order_by: "date DESC, student_id ASC",
};

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub class_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<AttendanceStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl AttendanceFilter {
    fn rows(&self) -> RowFilter {
        RowFilter::new()
            .eq_opt("class_id", self.class_id)
            .eq_opt("student_id", self.student_id)
            .eq_opt("status", self.status.map(|s| s.as_str()))
            .gte_opt("date", self.from)
            .lte_opt("date", self.to)
    }
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// Upserts one record per mark for `class` on `date` in a single
    /// transaction. A student marked twice on the same day keeps the last
    /// status.
    async fn mark(
        &self,
        class: &Class,
        date: NaiveDate,
        marks: &[AttendanceMark],
        recorded_by: Option<Uuid>,
    ) -> Result<Vec<AttendanceRecord>, DbError>;

    async fn find(
        &self,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<Option<AttendanceRecord>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &AttendanceFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<AttendanceRecord>, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteAttendanceRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteAttendanceRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceRepository for SqliteAttendanceRepository {
    async fn mark(
        &self,
        class: &Class,
        date: NaiveDate,
        marks: &[AttendanceMark],
        recorded_by: Option<Uuid>,
    ) -> Result<Vec<AttendanceRecord>, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let now = now_ts();
        let day = fmt_date(date);
        let sql = format!(
            "INSERT INTO attendance ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (student_id, date) DO UPDATE SET \
             class_id = excluded.class_id, status = excluded.status, \
             remarks = excluded.remarks, recorded_by = excluded.recorded_by, \
             updated_at = excluded.updated_at \
             RETURNING {}",
            TABLE.columns, TABLE.columns
        );
        let mut records = Vec::with_capacity(marks.len());
        for mark in marks {
            let row: AttendanceRow = sqlx::query_as(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(class.school_id.to_string())
                .bind(class.id.to_string())
                .bind(mark.student_id.to_string())
                .bind(&day)
                .bind(mark.status.as_str())
                .bind(&mark.remarks)
                .bind(recorded_by.map(|id| id.to_string()))
                .bind(&now)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?;
            records.push(AttendanceRecord::try_from(row)?);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(records)
    }

    async fn find(
        &self,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<Option<AttendanceRecord>, DbError> {
        TABLE
            .find::<AttendanceRow, AttendanceRecord>(&self.pool, predicate, id)
            .await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &AttendanceFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<AttendanceRecord>, DbError> {
        TABLE
            .list::<AttendanceRow, AttendanceRecord>(&self.pool, predicate, &filter.rows(), pagination)
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        TABLE.delete(&self.pool, id).await
    }
}

pub fn create_attendance_repository(pool: &DbPool) -> Box<dyn AttendanceRepository> {
    Box::new(SqliteAttendanceRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: String,
    school_id: String,
    class_id: String,
    student_id: String,
    date: String,
    status: String,
    remarks: Option<String>,
    recorded_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = DbError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(AttendanceRecord {
            id: parse_uuid(&row.id, "attendance.id")?,
            school_id: parse_uuid(&row.school_id, "attendance.school_id")?,
            class_id: parse_uuid(&row.class_id, "attendance.class_id")?,
            student_id: parse_uuid(&row.student_id, "attendance.student_id")?,
            date: parse_date(&row.date)?,
            status: parse_enum(&row.status, "attendance.status")?,
            remarks: row.remarks,
            recorded_by: parse_opt_uuid(row.recorded_by, "attendance.recorded_by")?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
