//! Exam sessions, their questions and their results.

use super::convert::{fmt_date, now_ts, parse_date, parse_enum, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{
    Exam, ExamQuestion, ExamResult, ExamUpdate, NewExam, NewExamQuestion, ResultEntry,
};
use crate::schedule::ClockTime;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

const EXAMS: ScopedTable = ScopedTable {
    kind: ResourceKind::Exam,
    columns: "id, school_id, term_id, class_id, subject_id, title, exam_date, start_time, \
              end_time, total_marks, passing_marks, created_at, updated_at",
    order_by: "exam_date ASC, start_time ASC",
};

const QUESTIONS: ScopedTable = ScopedTable {
    kind: ResourceKind::ExamQuestion,
    columns: "id, school_id, exam_id, subject_id, prompt, marks, position, created_at, updated_at",
    order_by: "position ASC, created_at ASC",
};

const RESULTS: ScopedTable = ScopedTable {
    kind: ResourceKind::ExamResult,
    columns: "id, school_id, exam_id, student_id, marks_obtained, remarks, created_at, updated_at",
    order_by: "marks_obtained DESC",
};

const DEPENDENTS: &[DependentRef] = &[
    ("results", "exam_results", "exam_id"),
    ("questions", "exam_questions", "exam_id"),
];

#[derive(Debug, Clone, Default)]
pub struct ExamFilter {
    pub class_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[async_trait]
pub trait ExamRepository: Send + Sync {
    async fn create(&self, exam: &NewExam) -> Result<Exam, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Exam>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ExamFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Exam>, DbError>;

    /// An exam of the same class on the same date whose time range
    /// intersects `[start, end]`.
    async fn overlapping(
        &self,
        class_id: Uuid,
        date: NaiveDate,
        start: ClockTime,
        end: ClockTime,
        except: Option<Uuid>,
    ) -> Result<Option<Exam>, DbError>;

    async fn update(&self, id: Uuid, update: &ExamUpdate) -> Result<Exam, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    async fn add_question(
        &self,
        exam: &Exam,
        question: &NewExamQuestion,
    ) -> Result<ExamQuestion, DbError>;

    async fn questions(&self, exam_id: Uuid) -> Result<Vec<ExamQuestion>, DbError>;

    async fn delete_question(&self, exam_id: Uuid, question_id: Uuid) -> Result<bool, DbError>;

    /// Inserts or replaces one result per entry, all or nothing.
    async fn upsert_results(
        &self,
        exam: &Exam,
        entries: &[ResultEntry],
    ) -> Result<Vec<ExamResult>, DbError>;

    /// Results of one exam visible under `predicate`.
    async fn results(&self, predicate: &Predicate, exam_id: Uuid)
        -> Result<Vec<ExamResult>, DbError>;
}

pub struct SqliteExamRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteExamRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamRepository for SqliteExamRepository {
    async fn create(&self, exam: &NewExam) -> Result<Exam, DbError> {
        let now = now_ts();
        let row: ExamRow = sqlx::query_as(&format!(
            "INSERT INTO exams ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            EXAMS.columns, EXAMS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(exam.school_id.to_string())
        .bind(exam.term_id.to_string())
        .bind(exam.class_id.to_string())
        .bind(exam.subject_id.to_string())
        .bind(exam.title.trim())
        .bind(fmt_date(exam.exam_date))
        .bind(exam.start_time.to_string())
        .bind(exam.end_time.to_string())
        .bind(exam.total_marks)
        .bind(exam.passing_marks)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Exam>, DbError> {
        EXAMS.find::<ExamRow, Exam>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ExamFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Exam>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("class_id", filter.class_id)
            .eq_opt("term_id", filter.term_id)
            .eq_opt("subject_id", filter.subject_id)
            .gte_opt("exam_date", filter.from)
            .lte_opt("exam_date", filter.to);
        EXAMS
            .list::<ExamRow, Exam>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn overlapping(
        &self,
        class_id: Uuid,
        date: NaiveDate,
        start: ClockTime,
        end: ClockTime,
        except: Option<Uuid>,
    ) -> Result<Option<Exam>, DbError> {
        let row: Option<ExamRow> = sqlx::query_as(&format!(
            "SELECT {} FROM exams \
             WHERE class_id = ? AND exam_date = ? AND ? <= end_time AND start_time <= ? \
             AND id != ? ORDER BY start_time LIMIT 1",
            EXAMS.columns
        ))
        .bind(class_id.to_string())
        .bind(fmt_date(date))
        .bind(start.to_string())
        .bind(end.to_string())
        .bind(except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Exam::try_from).transpose()
    }

    async fn update(&self, id: Uuid, update: &ExamUpdate) -> Result<Exam, DbError> {
        let changes = Changes::new()
            .set_opt("title", update.title.as_deref().map(str::trim))
            .set_opt("exam_date", update.exam_date)
            .set_opt("start_time", update.start_time)
            .set_opt("end_time", update.end_time)
            .set_opt("total_marks", update.total_marks)
            .set_opt("passing_marks", update.passing_marks);
        if !EXAMS.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Exam", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Exam", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        EXAMS.delete(&self.pool, id).await
    }

    async fn add_question(
        &self,
        exam: &Exam,
        question: &NewExamQuestion,
    ) -> Result<ExamQuestion, DbError> {
        let now = now_ts();
        let row: QuestionRow = sqlx::query_as(&format!(
            "INSERT INTO exam_questions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            QUESTIONS.columns, QUESTIONS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(exam.school_id.to_string())
        .bind(exam.id.to_string())
        .bind(exam.subject_id.to_string())
        .bind(question.prompt.trim())
        .bind(question.marks)
        .bind(question.position)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn questions(&self, exam_id: Uuid) -> Result<Vec<ExamQuestion>, DbError> {
        QUESTIONS
            .all::<QuestionRow, ExamQuestion>(
                &self.pool,
                &Predicate::Unrestricted,
                &RowFilter::new().eq("exam_id", exam_id),
            )
            .await
    }

    async fn delete_question(&self, exam_id: Uuid, question_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM exam_questions WHERE id = ? AND exam_id = ?")
            .bind(question_id.to_string())
            .bind(exam_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_results(
        &self,
        exam: &Exam,
        entries: &[ResultEntry],
    ) -> Result<Vec<ExamResult>, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let now = now_ts();
        let sql = format!(
            "INSERT INTO exam_results ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (exam_id, student_id) DO UPDATE SET \
             marks_obtained = excluded.marks_obtained, remarks = excluded.remarks, \
             updated_at = excluded.updated_at \
             RETURNING {}",
            RESULTS.columns, RESULTS.columns
        );
        let mut saved = Vec::with_capacity(entries.len());
        for entry in entries {
            let row: ResultRow = sqlx::query_as(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(exam.school_id.to_string())
                .bind(exam.id.to_string())
                .bind(entry.student_id.to_string())
                .bind(entry.marks_obtained)
                .bind(&entry.remarks)
                .bind(&now)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?;
            saved.push(ExamResult::try_from(row)?);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(saved)
    }

    async fn results(
        &self,
        predicate: &Predicate,
        exam_id: Uuid,
    ) -> Result<Vec<ExamResult>, DbError> {
        RESULTS
            .all::<ResultRow, ExamResult>(
                &self.pool,
                predicate,
                &RowFilter::new().eq("exam_id", exam_id),
            )
            .await
    }
}

pub fn create_exam_repository(pool: &DbPool) -> Box<dyn ExamRepository> {
    Box::new(SqliteExamRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct ExamRow {
    id: String,
    school_id: String,
    term_id: String,
    class_id: String,
    subject_id: String,
    title: String,
    exam_date: String,
    start_time: String,
    end_time: String,
    total_marks: f64,
    passing_marks: f64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ExamRow> for Exam {
    type Error = DbError;

    fn try_from(row: ExamRow) -> Result<Self, Self::Error> {
        Ok(Exam {
            id: parse_uuid(&row.id, "exams.id")?,
            school_id: parse_uuid(&row.school_id, "exams.school_id")?,
            term_id: parse_uuid(&row.term_id, "exams.term_id")?,
            class_id: parse_uuid(&row.class_id, "exams.class_id")?,
            subject_id: parse_uuid(&row.subject_id, "exams.subject_id")?,
            title: row.title,
            exam_date: parse_date(&row.exam_date)?,
            start_time: parse_enum(&row.start_time, "exams.start_time")?,
            end_time: parse_enum(&row.end_time, "exams.end_time")?,
            total_marks: row.total_marks,
            passing_marks: row.passing_marks,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: String,
    school_id: String,
    exam_id: String,
    subject_id: String,
    prompt: String,
    marks: f64,
    position: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<QuestionRow> for ExamQuestion {
    type Error = DbError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(ExamQuestion {
            id: parse_uuid(&row.id, "exam_questions.id")?,
            school_id: parse_uuid(&row.school_id, "exam_questions.school_id")?,
            exam_id: parse_uuid(&row.exam_id, "exam_questions.exam_id")?,
            subject_id: parse_uuid(&row.subject_id, "exam_questions.subject_id")?,
            prompt: row.prompt,
            marks: row.marks,
            position: row.position,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: String,
    school_id: String,
    exam_id: String,
    student_id: String,
    marks_obtained: f64,
    remarks: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ResultRow> for ExamResult {
    type Error = DbError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        Ok(ExamResult {
            id: parse_uuid(&row.id, "exam_results.id")?,
            school_id: parse_uuid(&row.school_id, "exam_results.school_id")?,
            exam_id: parse_uuid(&row.exam_id, "exam_results.exam_id")?,
            student_id: parse_uuid(&row.student_id, "exam_results.student_id")?,
            marks_obtained: row.marks_obtained,
            remarks: row.remarks,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{
        date, seed_class, seed_exam, seed_school, seed_student, seed_subject, seed_term,
        test_pool, time,
    };

    #[tokio::test]
    async fn test_exam_overlap_same_class_and_date() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "EXO").await;
        let class = seed_class(&pool, school.id, "A", None).await;
        let other = seed_class(&pool, school.id, "B", None).await;
        let subject = seed_subject(&pool, school.id, "MATH").await;
        let term = seed_term(&pool, school.id).await;
        let exam = seed_exam(&pool, &class, subject.id, term.id, "2024-11-04").await;

        let repo = create_exam_repository(&pool);
        let day = date("2024-11-04");
        assert_eq!(
            repo.overlapping(class.id, day, time("10:30"), time("11:30"), None)
                .await
                .unwrap()
                .map(|e| e.id),
            Some(exam.id)
        );
        assert!(repo
            .overlapping(other.id, day, time("10:30"), time("11:30"), None)
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .overlapping(class.id, date("2024-11-05"), time("10:30"), time("11:30"), None)
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .overlapping(class.id, day, time("10:30"), time("11:30"), Some(exam.id))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_result_upsert_replaces_marks() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "RES").await;
        let class = seed_class(&pool, school.id, "A", None).await;
        let subject = seed_subject(&pool, school.id, "SCI").await;
        let term = seed_term(&pool, school.id).await;
        let exam = seed_exam(&pool, &class, subject.id, term.id, "2024-11-04").await;
        let s1 = seed_student(&pool, school.id, Some(class.id), "R-1").await;
        let s2 = seed_student(&pool, school.id, Some(class.id), "R-2").await;

        let repo = create_exam_repository(&pool);
        let entry = |student_id, marks| ResultEntry {
            student_id,
            marks_obtained: marks,
            remarks: None,
        };
        let saved = repo
            .upsert_results(&exam, &[entry(s1.id, 55.0), entry(s2.id, 80.0)])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);

        repo.upsert_results(&exam, &[entry(s1.id, 65.0)]).await.unwrap();
        let results = repo.results(&Predicate::Unrestricted, exam.id).await.unwrap();
        assert_eq!(results.len(), 2);
        let s1_result = results.iter().find(|r| r.student_id == s1.id).unwrap();
        assert_eq!(s1_result.marks_obtained, 65.0);

        assert_eq!(repo.dependents(exam.id).await.unwrap().get("results"), Some(2));
    }

    #[tokio::test]
    async fn test_failed_upsert_writes_nothing() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "RBK").await;
        let class = seed_class(&pool, school.id, "A", None).await;
        let subject = seed_subject(&pool, school.id, "GEO").await;
        let term = seed_term(&pool, school.id).await;
        let exam = seed_exam(&pool, &class, subject.id, term.id, "2024-11-04").await;
        let s1 = seed_student(&pool, school.id, Some(class.id), "K-1").await;

        let repo = create_exam_repository(&pool);
        let entries = [
            ResultEntry {
                student_id: s1.id,
                marks_obtained: 70.0,
                remarks: None,
            },
            ResultEntry {
                student_id: Uuid::new_v4(),
                marks_obtained: 10.0,
                remarks: None,
            },
        ];
        assert!(repo.upsert_results(&exam, &entries).await.is_err());
        assert!(repo.results(&Predicate::Unrestricted, exam.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_questions_inherit_exam_subject() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "QST").await;
        let class = seed_class(&pool, school.id, "A", None).await;
        let subject = seed_subject(&pool, school.id, "HIS").await;
        let term = seed_term(&pool, school.id).await;
        let exam = seed_exam(&pool, &class, subject.id, term.id, "2024-11-04").await;

        let repo = create_exam_repository(&pool);
        let q = repo
            .add_question(
                &exam,
                &NewExamQuestion {
                    prompt: "When did it happen?".into(),
                    marks: 5.0,
                    position: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(q.subject_id, subject.id);
        assert_eq!(repo.questions(exam.id).await.unwrap().len(), 1);
        assert!(repo.delete_question(exam.id, q.id).await.unwrap());
        assert!(repo.dependents(exam.id).await.unwrap().is_clear());
    }
}
