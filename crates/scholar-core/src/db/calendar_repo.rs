//! Academic years and the terms inside them.
//!
//! Overlap checks use closed date ranges: two ranges that share an endpoint
//! overlap. They are best-effort pre-checks run before the write; the caller
//! still has to handle a constraint error from the insert.

use super::convert::{fmt_date, now_ts, parse_date, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{AcademicYear, AcademicYearUpdate, NewAcademicYear, NewTerm, Term, TermUpdate};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

const YEARS: ScopedTable = ScopedTable {
    kind: ResourceKind::AcademicYear,
    columns: "id, school_id, name, start_date, end_date, is_current, created_at, updated_at",
    order_by: "start_date DESC",
};

const TERMS: ScopedTable = ScopedTable {
    kind: ResourceKind::Term,
    columns: "id, school_id, academic_year_id, name, start_date, end_date, is_active, \
              created_at, updated_at",
    order_by: "start_date ASC",
};

const YEAR_DEPENDENTS: &[DependentRef] = &[("terms", "terms", "academic_year_id")];

const TERM_DEPENDENTS: &[DependentRef] = &[
    ("exams", "exams", "term_id"),
    ("reportCards", "report_cards", "term_id"),
];

#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// Creates a year; a current year clears the flag on the school's others.
    async fn create_year(&self, year: &NewAcademicYear) -> Result<AcademicYear, DbError>;

    async fn find_year(
        &self,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<Option<AcademicYear>, DbError>;

    async fn list_years(
        &self,
        predicate: &Predicate,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<AcademicYear>, DbError>;

    /// A year of the school whose dates intersect `[start, end]`.
    async fn overlapping_year(
        &self,
        school_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        except: Option<Uuid>,
    ) -> Result<Option<AcademicYear>, DbError>;

    async fn update_year(
        &self,
        id: Uuid,
        update: &AcademicYearUpdate,
    ) -> Result<AcademicYear, DbError>;

    async fn year_dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete_year(&self, id: Uuid) -> Result<bool, DbError>;

    async fn create_term(&self, term: &NewTerm) -> Result<Term, DbError>;

    async fn find_term(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Term>, DbError>;

    async fn list_terms(
        &self,
        predicate: &Predicate,
        academic_year_id: Option<Uuid>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Term>, DbError>;

    /// An active term of the same school and year intersecting `[start, end]`.
    async fn overlapping_term(
        &self,
        school_id: Uuid,
        academic_year_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        except: Option<Uuid>,
    ) -> Result<Option<Term>, DbError>;

    async fn update_term(&self, id: Uuid, update: &TermUpdate) -> Result<Term, DbError>;

    async fn term_dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete_term(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteCalendarRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteCalendarRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalendarRepository for SqliteCalendarRepository {
    async fn create_year(&self, year: &NewAcademicYear) -> Result<AcademicYear, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let now = now_ts();
        if year.is_current {
            sqlx::query(
                "UPDATE academic_years SET is_current = 0, updated_at = ? \
                 WHERE school_id = ? AND is_current = 1",
            )
            .bind(&now)
            .bind(year.school_id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        let row: YearRow = sqlx::query_as(&format!(
            "INSERT INTO academic_years ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            YEARS.columns, YEARS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(year.school_id.to_string())
        .bind(year.name.trim())
        .bind(fmt_date(year.start_date))
        .bind(fmt_date(year.end_date))
        .bind(year.is_current)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        row.try_into()
    }

    async fn find_year(
        &self,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<Option<AcademicYear>, DbError> {
        YEARS.find::<YearRow, AcademicYear>(&self.pool, predicate, id).await
    }

    async fn list_years(
        &self,
        predicate: &Predicate,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<AcademicYear>, DbError> {
        YEARS
            .list::<YearRow, AcademicYear>(&self.pool, predicate, &RowFilter::new(), pagination)
            .await
    }

    async fn overlapping_year(
        &self,
        school_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        except: Option<Uuid>,
    ) -> Result<Option<AcademicYear>, DbError> {
        let row: Option<YearRow> = sqlx::query_as(&format!(
            "SELECT {} FROM academic_years \
             WHERE school_id = ? AND ? <= end_date AND start_date <= ? AND id != ? \
             ORDER BY start_date LIMIT 1",
            YEARS.columns
        ))
        .bind(school_id.to_string())
        .bind(fmt_date(start))
        .bind(fmt_date(end))
        .bind(except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AcademicYear::try_from).transpose()
    }

    async fn update_year(
        &self,
        id: Uuid,
        update: &AcademicYearUpdate,
    ) -> Result<AcademicYear, DbError> {
        let current = self
            .find_year(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Academic year", id))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        let now = now_ts();
        if update.is_current == Some(true) {
            sqlx::query(
                "UPDATE academic_years SET is_current = 0, updated_at = ? \
                 WHERE school_id = ? AND is_current = 1 AND id != ?",
            )
            .bind(&now)
            .bind(current.school_id.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "UPDATE academic_years SET name = ?, start_date = ?, end_date = ?, is_current = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(update.name.as_deref().map(str::trim).unwrap_or(&current.name))
        .bind(fmt_date(update.start_date.unwrap_or(current.start_date)))
        .bind(fmt_date(update.end_date.unwrap_or(current.end_date)))
        .bind(update.is_current.unwrap_or(current.is_current))
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        self.find_year(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Academic year", id))
    }

    async fn year_dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, YEAR_DEPENDENTS).await
    }

    async fn delete_year(&self, id: Uuid) -> Result<bool, DbError> {
        YEARS.delete(&self.pool, id).await
    }

    async fn create_term(&self, term: &NewTerm) -> Result<Term, DbError> {
        let now = now_ts();
        let row: TermRow = sqlx::query_as(&format!(
            "INSERT INTO terms ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            TERMS.columns, TERMS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(term.school_id.to_string())
        .bind(term.academic_year_id.to_string())
        .bind(term.name.trim())
        .bind(fmt_date(term.start_date))
        .bind(fmt_date(term.end_date))
        .bind(term.is_active)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_term(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Term>, DbError> {
        TERMS.find::<TermRow, Term>(&self.pool, predicate, id).await
    }

    async fn list_terms(
        &self,
        predicate: &Predicate,
        academic_year_id: Option<Uuid>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Term>, DbError> {
        let rows = RowFilter::new().eq_opt("academic_year_id", academic_year_id);
        TERMS
            .list::<TermRow, Term>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn overlapping_term(
        &self,
        school_id: Uuid,
        academic_year_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        except: Option<Uuid>,
    ) -> Result<Option<Term>, DbError> {
        let row: Option<TermRow> = sqlx::query_as(&format!(
            "SELECT {} FROM terms \
             WHERE school_id = ? AND academic_year_id = ? AND is_active = 1 \
             AND ? <= end_date AND start_date <= ? AND id != ? \
             ORDER BY start_date LIMIT 1",
            TERMS.columns
        ))
        .bind(school_id.to_string())
        .bind(academic_year_id.to_string())
        .bind(fmt_date(start))
        .bind(fmt_date(end))
        .bind(except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Term::try_from).transpose()
    }

    async fn update_term(&self, id: Uuid, update: &TermUpdate) -> Result<Term, DbError> {
        let changes = Changes::new()
            .set_opt("name", update.name.as_deref().map(str::trim))
            .set_opt("start_date", update.start_date)
            .set_opt("end_date", update.end_date)
            .set_opt("is_active", update.is_active);
        if !TERMS.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Term", id));
        }
        self.find_term(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Term", id))
    }

    async fn term_dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, TERM_DEPENDENTS).await
    }

    async fn delete_term(&self, id: Uuid) -> Result<bool, DbError> {
        TERMS.delete(&self.pool, id).await
    }
}

pub fn create_calendar_repository(pool: &DbPool) -> Box<dyn CalendarRepository> {
    Box::new(SqliteCalendarRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct YearRow {
    id: String,
    school_id: String,
    name: String,
    start_date: String,
    end_date: String,
    is_current: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<YearRow> for AcademicYear {
    type Error = DbError;

    fn try_from(row: YearRow) -> Result<Self, Self::Error> {
        Ok(AcademicYear {
            id: parse_uuid(&row.id, "academic_years.id")?,
            school_id: parse_uuid(&row.school_id, "academic_years.school_id")?,
            name: row.name,
            start_date: parse_date(&row.start_date)?,
            end_date: parse_date(&row.end_date)?,
            is_current: row.is_current,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TermRow {
    id: String,
    school_id: String,
    academic_year_id: String,
    name: String,
    start_date: String,
    end_date: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TermRow> for Term {
    type Error = DbError;

    fn try_from(row: TermRow) -> Result<Self, Self::Error> {
        Ok(Term {
            id: parse_uuid(&row.id, "terms.id")?,
            school_id: parse_uuid(&row.school_id, "terms.school_id")?,
            academic_year_id: parse_uuid(&row.academic_year_id, "terms.academic_year_id")?,
            name: row.name,
            start_date: parse_date(&row.start_date)?,
            end_date: parse_date(&row.end_date)?,
            is_active: row.is_active,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
