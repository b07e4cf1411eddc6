//! Aggregate read queries behind dashboards, analytics and report cards.
//!
//! Every query takes the caller's [`Predicate`] and renders it against the
//! table being aggregated, so totals never include rows the caller could not
//! list directly.

use super::convert::{fmt_date, parse_uuid};
use super::scope::{push_predicate_on, SqlValue};
use super::{DbError, DbPool};
use crate::access::{Predicate, ResourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

/// Narrowing for attendance aggregates. Dates are inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttendanceScope {
    pub student_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Narrowing for exam-result aggregates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExamScope {
    pub student_id: Option<Uuid>,
    pub class_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceCounts {
    /// Records with status `present`.
    pub present: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExamAverage {
    /// Mean result percentage; `None` when there are no results.
    pub average: Option<f64>,
    pub results: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAverage {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub average: f64,
    pub results: u64,
}

/// Per-student raw figures for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentFigures {
    pub student_id: Uuid,
    pub name: String,
    pub average: Option<f64>,
    pub attendance: AttendanceCounts,
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn attendance_counts(
        &self,
        predicate: &Predicate,
        scope: &AttendanceScope,
    ) -> Result<AttendanceCounts, DbError>;

    async fn exam_average(
        &self,
        predicate: &Predicate,
        scope: &ExamScope,
    ) -> Result<ExamAverage, DbError>;

    /// Average result percentage per subject, best subject first.
    async fn subject_averages(
        &self,
        predicate: &Predicate,
        scope: &ExamScope,
    ) -> Result<Vec<SubjectAverage>, DbError>;

    /// Exam average and attendance for every student placed in the class.
    async fn class_student_figures(
        &self,
        predicate: &Predicate,
        class_id: Uuid,
    ) -> Result<Vec<StudentFigures>, DbError>;

    /// Submissions recorded for the assignment.
    async fn submission_count(&self, assignment_id: Uuid) -> Result<u64, DbError>;
}

pub struct SqliteAnalyticsRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteAnalyticsRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

fn push_eq(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, value: Option<impl Into<SqlValue>>) {
    if let Some(value) = value {
        qb.push(format!(" AND {} = ", column));
        super::scope::push_value(qb, value.into());
    }
}

fn push_exam_scope(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate, scope: &ExamScope) {
    push_predicate_on(qb, ResourceKind::ExamResult, predicate, "r");
    push_eq(qb, "r.student_id", scope.student_id);
    push_eq(qb, "e.class_id", scope.class_id);
    push_eq(qb, "e.term_id", scope.term_id);
}

/// Result percentage of one `exam_results r JOIN exams e` row.
const RESULT_PERCENT: &str = "r.marks_obtained * 100.0 / NULLIF(e.total_marks, 0)";

#[async_trait]
impl AnalyticsRepository for SqliteAnalyticsRepository {
    async fn attendance_counts(
        &self,
        predicate: &Predicate,
        scope: &AttendanceScope,
    ) -> Result<AttendanceCounts, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0), \
             COUNT(*) FROM attendance a WHERE 1 = 1",
        );
        push_predicate_on(&mut qb, ResourceKind::Attendance, predicate, "a");
        push_eq(&mut qb, "a.student_id", scope.student_id);
        push_eq(&mut qb, "a.class_id", scope.class_id);
        if let Some(from) = scope.from {
            qb.push(" AND a.date >= ").push_bind(fmt_date(from));
        }
        if let Some(to) = scope.to {
            qb.push(" AND a.date <= ").push_bind(fmt_date(to));
        }

        let (present, total): (i64, i64) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(AttendanceCounts {
            present: present.max(0) as u64,
            total: total.max(0) as u64,
        })
    }

    async fn exam_average(
        &self,
        predicate: &Predicate,
        scope: &ExamScope,
    ) -> Result<ExamAverage, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT AVG({}), COUNT(*) FROM exam_results r \
             JOIN exams e ON e.id = r.exam_id WHERE 1 = 1",
            RESULT_PERCENT
        ));
        push_exam_scope(&mut qb, predicate, scope);

        let (average, results): (Option<f64>, i64) =
            qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(ExamAverage {
            average,
            results: results.max(0) as u64,
        })
    }

    async fn subject_averages(
        &self,
        predicate: &Predicate,
        scope: &ExamScope,
    ) -> Result<Vec<SubjectAverage>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT s.id, s.name, AVG({}) AS average, COUNT(*) FROM exam_results r \
             JOIN exams e ON e.id = r.exam_id \
             JOIN subjects s ON s.id = e.subject_id WHERE 1 = 1",
            RESULT_PERCENT
        ));
        push_exam_scope(&mut qb, predicate, scope);
        qb.push(" GROUP BY s.id, s.name ORDER BY average DESC, s.name ASC");

        let rows: Vec<(String, String, Option<f64>, i64)> =
            qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(id, name, average, results)| {
                Ok(SubjectAverage {
                    subject_id: parse_uuid(&id, "subjects.id")?,
                    subject_name: name,
                    average: average.unwrap_or(0.0),
                    results: results.max(0) as u64,
                })
            })
            .collect()
    }

    async fn class_student_figures(
        &self,
        predicate: &Predicate,
        class_id: Uuid,
    ) -> Result<Vec<StudentFigures>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT st.id, st.first_name || ' ' || st.last_name, \
             (SELECT AVG({}) FROM exam_results r JOIN exams e ON e.id = r.exam_id \
              WHERE r.student_id = st.id), \
             (SELECT COALESCE(SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END), 0) \
              FROM attendance a WHERE a.student_id = st.id), \
             (SELECT COUNT(*) FROM attendance a WHERE a.student_id = st.id) \
             FROM students st WHERE st.class_id = ",
            RESULT_PERCENT
        ));
        qb.push_bind(class_id.to_string());
        push_predicate_on(&mut qb, ResourceKind::Student, predicate, "st");
        qb.push(" ORDER BY st.last_name ASC, st.first_name ASC");

        let rows: Vec<(String, String, Option<f64>, i64, i64)> =
            qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(id, name, average, present, total)| {
                Ok(StudentFigures {
                    student_id: parse_uuid(&id, "students.id")?,
                    name,
                    average,
                    attendance: AttendanceCounts {
                        present: present.max(0) as u64,
                        total: total.max(0) as u64,
                    },
                })
            })
            .collect()
    }

    async fn submission_count(&self, assignment_id: Uuid) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM assignment_submissions WHERE assignment_id = ?",
        )
        .bind(assignment_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}

pub fn create_analytics_repository(pool: &DbPool) -> Box<dyn AnalyticsRepository> {
    Box::new(SqliteAnalyticsRepository::new(pool.inner().clone()))
}
