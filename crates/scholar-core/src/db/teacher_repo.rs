//! Teachers and their login accounts.

use super::convert::{fmt_date, now_ts, parse_opt_date, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::user_repo::insert_user;
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::auth::{Role, User};
use crate::models::{NewTeacher, Teacher, TeacherUpdate};
use async_trait::async_trait;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::Teacher,
    columns: "id, school_id, first_name, last_name, email, phone, qualification, hire_date, \
              created_at, updated_at",
    order_by: "last_name ASC, first_name ASC",
};

const DEPENDENTS: &[DependentRef] = &[
    ("supervisedClasses", "classes", "supervisor_id"),
    ("lessons", "lessons", "teacher_id"),
    ("assignments", "assignments", "teacher_id"),
];

#[derive(Debug, Clone, Default)]
pub struct TeacherFilter {
    pub search: Option<String>,
}

#[async_trait]
pub trait TeacherRepository: Send + Sync {
    /// Creates the teacher record and a linked `Teacher` login in one
    /// transaction.
    async fn create_with_account(
        &self,
        teacher: &NewTeacher,
        password_hash: &str,
    ) -> Result<(Teacher, User), DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Teacher>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &TeacherFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Teacher>, DbError>;

    async fn update(&self, id: Uuid, update: &TeacherUpdate) -> Result<Teacher, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    /// Deletes the teacher and deactivates the linked login.
    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// True when the teacher supervises the class or teaches a lesson in it.
    async fn teaches_class(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteTeacherRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteTeacherRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeacherRepository for SqliteTeacherRepository {
    async fn create_with_account(
        &self,
        teacher: &NewTeacher,
        password_hash: &str,
    ) -> Result<(Teacher, User), DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let id = Uuid::new_v4();
        let now = now_ts();
        let email = teacher.email.trim().to_lowercase();
        let row: TeacherRow = sqlx::query_as(&format!(
            "INSERT INTO teachers ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            TABLE.columns, TABLE.columns
        ))
        .bind(id.to_string())
        .bind(teacher.school_id.to_string())
        .bind(&teacher.first_name)
        .bind(&teacher.last_name)
        .bind(&email)
        .bind(&teacher.phone)
        .bind(&teacher.qualification)
        .bind(teacher.hire_date.map(fmt_date))
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        let user = User::new(
            &email,
            password_hash,
            &teacher.first_name,
            &teacher.last_name,
            Role::Teacher,
            Some(teacher.school_id),
        )
        .with_teacher(id);
        insert_user(&mut *tx, &user).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok((row.try_into()?, user))
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Teacher>, DbError> {
        TABLE.find::<TeacherRow, Teacher>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &TeacherFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Teacher>, DbError> {
        let rows = RowFilter::new().search(
            &["first_name", "last_name", "email"],
            filter.search.as_deref(),
        );
        TABLE
            .list::<TeacherRow, Teacher>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn update(&self, id: Uuid, update: &TeacherUpdate) -> Result<Teacher, DbError> {
        let changes = Changes::new()
            .set_opt("first_name", update.first_name.clone())
            .set_opt("last_name", update.last_name.clone())
            .set_opt("phone", update.phone.clone())
            .set_opt("qualification", update.qualification.clone())
            .set_opt("hire_date", update.hire_date);
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Teacher", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Teacher", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE teacher_id = ?")
            .bind(now_ts())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM teachers WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn teaches_class(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM classes c WHERE c.id = ? AND (c.supervisor_id = ? \
             OR EXISTS (SELECT 1 FROM lessons l WHERE l.class_id = c.id AND l.teacher_id = ?))",
        )
        .bind(class_id.to_string())
        .bind(teacher_id.to_string())
        .bind(teacher_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

pub fn create_teacher_repository(pool: &DbPool) -> Box<dyn TeacherRepository> {
    Box::new(SqliteTeacherRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct TeacherRow {
    id: String,
    school_id: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    qualification: Option<String>,
    hire_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TeacherRow> for Teacher {
    type Error = DbError;

    fn try_from(row: TeacherRow) -> Result<Self, Self::Error> {
        Ok(Teacher {
            id: parse_uuid(&row.id, "teachers.id")?,
            school_id: parse_uuid(&row.school_id, "teachers.school_id")?,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            qualification: row.qualification,
            hire_date: parse_opt_date(row.hire_date)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
