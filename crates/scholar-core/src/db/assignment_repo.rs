//! Coursework assignments and student submissions.

use super::convert::{fmt_date, now_ts, parse_date, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{
    Assignment, AssignmentUpdate, NewAssignment, NewSubmission, Submission,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

const ASSIGNMENTS: ScopedTable = ScopedTable {
    kind: ResourceKind::Assignment,
    columns: "id, school_id, class_id, subject_id, teacher_id, title, description, due_date, \
              max_score, created_at, updated_at",
    order_by: "due_date ASC, title ASC",
};

const SUBMISSIONS: ScopedTable = ScopedTable {
    kind: ResourceKind::Submission,
    columns: "id, school_id, assignment_id, student_id, content, score, feedback, \
              submitted_at, graded_at",
    order_by: "submitted_at ASC",
};

const DEPENDENTS: &[DependentRef] = &[("submissions", "assignment_submissions", "assignment_id")];

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub class_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn create(&self, assignment: &NewAssignment) -> Result<Assignment, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Assignment>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &AssignmentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Assignment>, DbError>;

    async fn update(&self, id: Uuid, update: &AssignmentUpdate) -> Result<Assignment, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Records a submission; resubmitting replaces the content and clears
    /// any previous grade.
    async fn submit(
        &self,
        assignment: &Assignment,
        submission: &NewSubmission,
    ) -> Result<Submission, DbError>;

    async fn submissions(
        &self,
        predicate: &Predicate,
        assignment_id: Uuid,
    ) -> Result<Vec<Submission>, DbError>;

    async fn find_submission(
        &self,
        assignment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Option<Submission>, DbError>;

    async fn grade_submission(
        &self,
        submission_id: Uuid,
        score: f64,
        feedback: Option<&str>,
    ) -> Result<Submission, DbError>;
}

pub struct SqliteAssignmentRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteAssignmentRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    async fn create(&self, assignment: &NewAssignment) -> Result<Assignment, DbError> {
        let now = now_ts();
        let row: AssignmentRow = sqlx::query_as(&format!(
            "INSERT INTO assignments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            ASSIGNMENTS.columns, ASSIGNMENTS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(assignment.school_id.to_string())
        .bind(assignment.class_id.to_string())
        .bind(assignment.subject_id.to_string())
        .bind(assignment.teacher_id.map(|id| id.to_string()))
        .bind(assignment.title.trim())
        .bind(&assignment.description)
        .bind(fmt_date(assignment.due_date))
        .bind(assignment.max_score)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Assignment>, DbError> {
        ASSIGNMENTS
            .find::<AssignmentRow, Assignment>(&self.pool, predicate, id)
            .await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &AssignmentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Assignment>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("class_id", filter.class_id)
            .eq_opt("subject_id", filter.subject_id)
            .eq_opt("teacher_id", filter.teacher_id)
            .gte_opt("due_date", filter.due_from)
            .lte_opt("due_date", filter.due_to);
        ASSIGNMENTS
            .list::<AssignmentRow, Assignment>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn update(&self, id: Uuid, update: &AssignmentUpdate) -> Result<Assignment, DbError> {
        let changes = Changes::new()
            .set_opt("title", update.title.as_deref().map(str::trim))
            .set_opt("description", update.description.clone())
            .set_opt("due_date", update.due_date)
            .set_opt("max_score", update.max_score);
        if !ASSIGNMENTS.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Assignment", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Assignment", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        ASSIGNMENTS.delete(&self.pool, id).await
    }

    async fn submit(
        &self,
        assignment: &Assignment,
        submission: &NewSubmission,
    ) -> Result<Submission, DbError> {
        let row: SubmissionRow = sqlx::query_as(&format!(
            "INSERT INTO assignment_submissions ({}) VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, NULL) \
             ON CONFLICT (assignment_id, student_id) DO UPDATE SET \
             content = excluded.content, score = NULL, feedback = NULL, \
             submitted_at = excluded.submitted_at, graded_at = NULL \
             RETURNING {}",
            SUBMISSIONS.columns, SUBMISSIONS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(assignment.school_id.to_string())
        .bind(assignment.id.to_string())
        .bind(submission.student_id.to_string())
        .bind(&submission.content)
        .bind(now_ts())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn submissions(
        &self,
        predicate: &Predicate,
        assignment_id: Uuid,
    ) -> Result<Vec<Submission>, DbError> {
        SUBMISSIONS
            .all::<SubmissionRow, Submission>(
                &self.pool,
                predicate,
                &RowFilter::new().eq("assignment_id", assignment_id),
            )
            .await
    }

    async fn find_submission(
        &self,
        assignment_id: Uuid,
        submission_id: Uuid,
    ) -> Result<Option<Submission>, DbError> {
        let row: Option<SubmissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM assignment_submissions WHERE id = ? AND assignment_id = ?",
            SUBMISSIONS.columns
        ))
        .bind(submission_id.to_string())
        .bind(assignment_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Submission::try_from).transpose()
    }

    async fn grade_submission(
        &self,
        submission_id: Uuid,
        score: f64,
        feedback: Option<&str>,
    ) -> Result<Submission, DbError> {
        let row: Option<SubmissionRow> = sqlx::query_as(&format!(
            "UPDATE assignment_submissions SET score = ?, feedback = ?, graded_at = ? \
             WHERE id = ? RETURNING {}",
            SUBMISSIONS.columns
        ))
        .bind(score)
        .bind(feedback)
        .bind(now_ts())
        .bind(submission_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Submission::try_from)
            .transpose()?
            .ok_or_else(|| DbError::not_found("Submission", submission_id))
    }
}

pub fn create_assignment_repository(pool: &DbPool) -> Box<dyn AssignmentRepository> {
    Box::new(SqliteAssignmentRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    school_id: String,
    class_id: String,
    subject_id: String,
    teacher_id: Option<String>,
    title: String,
    description: Option<String>,
    due_date: String,
    max_score: f64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = DbError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(Assignment {
            id: parse_uuid(&row.id, "assignments.id")?,
            school_id: parse_uuid(&row.school_id, "assignments.school_id")?,
            class_id: parse_uuid(&row.class_id, "assignments.class_id")?,
            subject_id: parse_uuid(&row.subject_id, "assignments.subject_id")?,
            teacher_id: parse_opt_uuid(row.teacher_id, "assignments.teacher_id")?,
            title: row.title,
            description: row.description,
            due_date: parse_date(&row.due_date)?,
            max_score: row.max_score,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: String,
    school_id: String,
    assignment_id: String,
    student_id: String,
    content: Option<String>,
    score: Option<f64>,
    feedback: Option<String>,
    submitted_at: String,
    graded_at: Option<String>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = DbError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        Ok(Submission {
            id: parse_uuid(&row.id, "assignment_submissions.id")?,
            school_id: parse_uuid(&row.school_id, "assignment_submissions.school_id")?,
            assignment_id: parse_uuid(&row.assignment_id, "assignment_submissions.assignment_id")?,
            student_id: parse_uuid(&row.student_id, "assignment_submissions.student_id")?,
            content: row.content,
            score: row.score,
            feedback: row.feedback,
            submitted_at: parse_ts(&row.submitted_at)?,
            graded_at: parse_opt_ts(row.graded_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Relationship;
    use crate::db::test_support::{
        seed_assignment, seed_class, seed_parent, seed_school, seed_student, seed_subject,
        test_pool,
    };
    use crate::db::create_parent_repository;

    #[tokio::test]
    async fn test_resubmission_clears_grade() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "SUBM").await;
        let class = seed_class(&pool, school.id, "A", None).await;
        let subject = seed_subject(&pool, school.id, "ENG").await;
        let assignment = seed_assignment(&pool, &class, subject.id).await;
        let student = seed_student(&pool, school.id, Some(class.id), "S-1").await;

        let repo = create_assignment_repository(&pool);
        let first = repo
            .submit(
                &assignment,
                &NewSubmission {
                    student_id: student.id,
                    content: Some("draft".into()),
                },
            )
            .await
            .unwrap();
        let graded = repo
            .grade_submission(first.id, 7.5, Some("good start"))
            .await
            .unwrap();
        assert_eq!(graded.score, Some(7.5));
        assert!(graded.graded_at.is_some());

        let again = repo
            .submit(
                &assignment,
                &NewSubmission {
                    student_id: student.id,
                    content: Some("final".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.content.as_deref(), Some("final"));
        assert!(again.score.is_none());
        assert_eq!(repo.dependents(assignment.id).await.unwrap().get("submissions"), Some(1));
    }

    #[tokio::test]
    async fn test_parent_sees_only_their_childs_submissions() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "PSUB").await;
        let class = seed_class(&pool, school.id, "A", None).await;
        let subject = seed_subject(&pool, school.id, "ART").await;
        let assignment = seed_assignment(&pool, &class, subject.id).await;
        let mine = seed_student(&pool, school.id, Some(class.id), "P-1").await;
        let other = seed_student(&pool, school.id, Some(class.id), "P-2").await;
        let (parent, _) = seed_parent(&pool, school.id, "p@psub.test").await;
        create_parent_repository(&pool)
            .add_guardianship(parent.id, mine.id, "mother")
            .await
            .unwrap();

        let repo = create_assignment_repository(&pool);
        for student in [&mine, &other] {
            repo.submit(
                &assignment,
                &NewSubmission {
                    student_id: student.id,
                    content: None,
                },
            )
            .await
            .unwrap();
        }

        let visible = repo
            .submissions(
                &Predicate::Related {
                    school_id: school.id,
                    relationship: Relationship::Guardian {
                        parent_id: parent.id,
                    },
                },
                assignment.id,
            )
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].student_id, mine.id);
    }

    #[tokio::test]
    async fn test_grading_unknown_submission_is_not_found() {
        let pool = test_pool().await;
        let err = create_assignment_repository(&pool)
            .grade_submission(Uuid::new_v4(), 1.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
