//! Term report cards.
//!
//! A card is generated as a draft, may be regenerated while it is a draft,
//! and becomes immutable once published.

use super::convert::{now_ts, parse_enum, parse_opt_ts, parse_ts, parse_uuid};
use super::scope::{RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{NewReportCard, ReportCard, ReportCardStatus};
use async_trait::async_trait;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::ReportCard,
    columns: "id, school_id, student_id, term_id, average_percentage, grade, gpa, \
              attendance_rate, remarks, status, published_at, created_at, updated_at",
    order_by: "created_at DESC",
};

#[derive(Debug, Clone, Default)]
pub struct ReportCardFilter {
    pub student_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub status: Option<ReportCardStatus>,
}

#[async_trait]
pub trait ReportCardRepository: Send + Sync {
    /// Inserts the draft or refreshes an existing draft for the same student
    /// and term. Fails with a constraint error when that card is published.
    async fn save_draft(&self, card: &NewReportCard) -> Result<ReportCard, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<ReportCard>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ReportCardFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<ReportCard>, DbError>;

    /// Publishes a draft. Returns `None` when no draft has `id`.
    async fn publish(&self, id: Uuid) -> Result<Option<ReportCard>, DbError>;

    /// Deletes a draft. Published cards are left in place.
    async fn delete_draft(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteReportCardRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteReportCardRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportCardRepository for SqliteReportCardRepository {
    async fn save_draft(&self, card: &NewReportCard) -> Result<ReportCard, DbError> {
        let now = now_ts();
        let row: Option<ReportCardRow> = sqlx::query_as(&format!(
            "INSERT INTO report_cards ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', NULL, ?, ?) \
             ON CONFLICT (student_id, term_id) DO UPDATE SET \
             average_percentage = excluded.average_percentage, grade = excluded.grade, \
             gpa = excluded.gpa, attendance_rate = excluded.attendance_rate, \
             remarks = excluded.remarks, updated_at = excluded.updated_at \
             WHERE report_cards.status = 'draft' \
             RETURNING {}",
            TABLE.columns, TABLE.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(card.school_id.to_string())
        .bind(card.student_id.to_string())
        .bind(card.term_id.to_string())
        .bind(card.average_percentage)
        .bind(&card.grade)
        .bind(card.gpa)
        .bind(&card.attendance_rate)
        .bind(&card.remarks)
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(DbError::Constraint(
                "Report card for this term is already published".to_string(),
            )),
        }
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<ReportCard>, DbError> {
        TABLE
            .find::<ReportCardRow, ReportCard>(&self.pool, predicate, id)
            .await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ReportCardFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<ReportCard>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("student_id", filter.student_id)
            .eq_opt("term_id", filter.term_id)
            .eq_opt("status", filter.status.map(|s| s.as_str()));
        TABLE
            .list::<ReportCardRow, ReportCard>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn publish(&self, id: Uuid) -> Result<Option<ReportCard>, DbError> {
        let now = now_ts();
        let row: Option<ReportCardRow> = sqlx::query_as(&format!(
            "UPDATE report_cards SET status = 'published', published_at = ?, updated_at = ? \
             WHERE id = ? AND status = 'draft' RETURNING {}",
            TABLE.columns
        ))
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ReportCard::try_from).transpose()
    }

    async fn delete_draft(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM report_cards WHERE id = ? AND status = 'draft'")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_report_card_repository(pool: &DbPool) -> Box<dyn ReportCardRepository> {
    Box::new(SqliteReportCardRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct ReportCardRow {
    id: String,
    school_id: String,
    student_id: String,
    term_id: String,
    average_percentage: f64,
    grade: String,
    gpa: f64,
    attendance_rate: String,
    remarks: Option<String>,
    status: String,
    published_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ReportCardRow> for ReportCard {
    type Error = DbError;

    fn try_from(row: ReportCardRow) -> Result<Self, Self::Error> {
        Ok(ReportCard {
            id: parse_uuid(&row.id, "report_cards.id")?,
            school_id: parse_uuid(&row.school_id, "report_cards.school_id")?,
            student_id: parse_uuid(&row.student_id, "report_cards.student_id")?,
            term_id: parse_uuid(&row.term_id, "report_cards.term_id")?,
            average_percentage: row.average_percentage,
            grade: row.grade,
            gpa: row.gpa,
            attendance_rate: row.attendance_rate,
            remarks: row.remarks,
            status: parse_enum(&row.status, "report_cards.status")?,
            published_at: parse_opt_ts(row.published_at)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_school, seed_student, seed_term, test_pool};

    fn draft(school_id: Uuid, student_id: Uuid, term_id: Uuid, avg: f64) -> NewReportCard {
        NewReportCard {
            school_id,
            student_id,
            term_id,
            average_percentage: avg,
            grade: crate::grading::grade_for(avg).to_string(),
            gpa: crate::grading::gpa_for(avg),
            attendance_rate: "100.00".into(),
            remarks: None,
        }
    }

    #[tokio::test]
    async fn test_draft_regenerates_until_published() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "RC").await;
        let student = seed_student(&pool, school.id, None, "RC-1").await;
        let term = seed_term(&pool, school.id).await;
        let repo = create_report_card_repository(&pool);

        let first = repo.save_draft(&draft(school.id, student.id, term.id, 72.0)).await.unwrap();
        assert_eq!(first.grade, "B+");
        let second = repo.save_draft(&draft(school.id, student.id, term.id, 91.0)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.grade, "A+");

        let published = repo.publish(first.id).await.unwrap().unwrap();
        assert_eq!(published.status, ReportCardStatus::Published);
        assert!(published.published_at.is_some());
        assert!(repo.publish(first.id).await.unwrap().is_none());

        let err = repo
            .save_draft(&draft(school.id, student.id, term.id, 50.0))
            .await
            .unwrap_err();
        assert!(err.is_constraint());
        assert!(!repo.delete_draft(first.id).await.unwrap());
        let kept = repo.find(&Predicate::Unrestricted, first.id).await.unwrap().unwrap();
        assert_eq!(kept.grade, "A+");
    }
}
