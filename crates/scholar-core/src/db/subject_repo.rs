//! Subjects taught in a school.

use super::convert::{now_ts, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{NewSubject, Subject, SubjectUpdate};
use async_trait::async_trait;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::Subject,
    columns: "id, school_id, name, code, description, created_at, updated_at",
    order_by: "name ASC",
};

const DEPENDENTS: &[DependentRef] = &[
    ("lessons", "lessons", "subject_id"),
    ("assignments", "assignments", "subject_id"),
    ("examQuestions", "exam_questions", "subject_id"),
];

#[async_trait]
pub trait SubjectRepository: Send + Sync {
    async fn create(&self, subject: &NewSubject) -> Result<Subject, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Subject>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        search: Option<&str>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Subject>, DbError>;

    /// Codes are compared case-insensitively within one school.
    async fn code_taken(
        &self,
        school_id: Uuid,
        code: &str,
        except: Option<Uuid>,
    ) -> Result<bool, DbError>;

    async fn update(&self, id: Uuid, update: &SubjectUpdate) -> Result<Subject, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteSubjectRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteSubjectRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[async_trait]
impl SubjectRepository for SqliteSubjectRepository {
    async fn create(&self, subject: &NewSubject) -> Result<Subject, DbError> {
        let now = now_ts();
        let row: SubjectRow = sqlx::query_as(&format!(
            "INSERT INTO subjects ({}) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            TABLE.columns, TABLE.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(subject.school_id.to_string())
        .bind(subject.name.trim())
        .bind(normalize_code(&subject.code))
        .bind(&subject.description)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Subject>, DbError> {
        TABLE.find::<SubjectRow, Subject>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        search: Option<&str>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Subject>, DbError> {
        let rows = RowFilter::new().search(&["name", "code"], search);
        TABLE
            .list::<SubjectRow, Subject>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn code_taken(
        &self,
        school_id: Uuid,
        code: &str,
        except: Option<Uuid>,
    ) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subjects WHERE school_id = ? AND code = ? AND id != ?",
        )
        .bind(school_id.to_string())
        .bind(normalize_code(code))
        .bind(except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn update(&self, id: Uuid, update: &SubjectUpdate) -> Result<Subject, DbError> {
        let changes = Changes::new()
            .set_opt("name", update.name.as_deref().map(str::trim))
            .set_opt("code", update.code.as_deref().map(normalize_code))
            .set_opt("description", update.description.clone());
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Subject", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Subject", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        TABLE.delete(&self.pool, id).await
    }
}

pub fn create_subject_repository(pool: &DbPool) -> Box<dyn SubjectRepository> {
    Box::new(SqliteSubjectRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: String,
    school_id: String,
    name: String,
    code: String,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SubjectRow> for Subject {
    type Error = DbError;

    fn try_from(row: SubjectRow) -> Result<Self, Self::Error> {
        Ok(Subject {
            id: parse_uuid(&row.id, "subjects.id")?,
            school_id: parse_uuid(&row.school_id, "subjects.school_id")?,
            name: row.name,
            code: row.code,
            description: row.description,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
