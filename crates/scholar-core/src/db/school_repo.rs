//! Schools (tenants) and their verification lifecycle.

use super::convert::{now_ts, parse_enum, parse_opt_ts, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::user_repo::insert_user;
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::auth::User;
use crate::models::{NewSchool, School, SchoolUpdate, VerificationStatus};
use async_trait::async_trait;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::School,
    columns: "id, name, code, email, phone, address, verification_status, verification_note, \
              verified_at, created_at, updated_at",
    order_by: "name ASC",
};

const DEPENDENTS: &[DependentRef] = &[
    ("students", "students", "school_id"),
    ("teachers", "teachers", "school_id"),
    ("classes", "classes", "school_id"),
];

/// Filter for school listings.
#[derive(Debug, Clone, Default)]
pub struct SchoolFilter {
    pub verification_status: Option<VerificationStatus>,
    pub search: Option<String>,
}

impl SchoolFilter {
    fn rows(&self) -> RowFilter {
        RowFilter::new()
            .eq_opt("verification_status", self.verification_status.map(|s| s.as_str()))
            .search(&["name", "code"], self.search.as_deref())
    }
}

#[async_trait]
pub trait SchoolRepository: Send + Sync {
    async fn create(&self, school: &NewSchool) -> Result<School, DbError>;

    /// Creates a school and its first administrator in one transaction.
    async fn create_with_admin(
        &self,
        school: &NewSchool,
        admin: &User,
    ) -> Result<(School, User), DbError>;

    /// Looks up a school regardless of caller scope.
    async fn get(&self, id: Uuid) -> Result<Option<School>, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<School>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &SchoolFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<School>, DbError>;

    async fn code_taken(&self, code: &str, except: Option<Uuid>) -> Result<bool, DbError>;

    async fn update(&self, id: Uuid, update: &SchoolUpdate) -> Result<School, DbError>;

    async fn set_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        note: Option<&str>,
    ) -> Result<School, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    /// Deletes the school and deactivates its accounts.
    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteSchoolRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteSchoolRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

async fn insert_school<'e, E>(executor: E, school: &NewSchool) -> Result<School, DbError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let id = Uuid::new_v4();
    let now = now_ts();
    let verified_at = (school.verification_status != VerificationStatus::Pending).then(|| now.clone());

    let row: SchoolRow = sqlx::query_as(&format!(
        "INSERT INTO schools ({}) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?) RETURNING {}",
        TABLE.columns, TABLE.columns
    ))
    .bind(id.to_string())
    .bind(&school.name)
    .bind(school.code.trim().to_uppercase())
    .bind(&school.email)
    .bind(&school.phone)
    .bind(&school.address)
    .bind(school.verification_status.as_str())
    .bind(&verified_at)
    .bind(&now)
    .bind(&now)
    .fetch_one(executor)
    .await?;

    row.try_into()
}

#[async_trait]
impl SchoolRepository for SqliteSchoolRepository {
    async fn create(&self, school: &NewSchool) -> Result<School, DbError> {
        insert_school(&self.pool, school).await
    }

    async fn create_with_admin(
        &self,
        school: &NewSchool,
        admin: &User,
    ) -> Result<(School, User), DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let created = insert_school(&mut *tx, school).await?;
        let mut admin = admin.clone();
        admin.school_id = Some(created.id);
        insert_user(&mut *tx, &admin).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok((created, admin))
    }

    async fn get(&self, id: Uuid) -> Result<Option<School>, DbError> {
        TABLE
            .find::<SchoolRow, School>(&self.pool, &Predicate::Unrestricted, id)
            .await
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<School>, DbError> {
        TABLE.find::<SchoolRow, School>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &SchoolFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<School>, DbError> {
        TABLE
            .list::<SchoolRow, School>(&self.pool, predicate, &filter.rows(), pagination)
            .await
    }

    async fn code_taken(&self, code: &str, except: Option<Uuid>) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM schools WHERE code = ? AND id != COALESCE(?, '')",
        )
        .bind(code.trim().to_uppercase())
        .bind(except.map(|id| id.to_string()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn update(&self, id: Uuid, update: &SchoolUpdate) -> Result<School, DbError> {
        let changes = Changes::new()
            .set_opt("name", update.name.clone())
            .set_opt("email", update.email.clone())
            .set_opt("phone", update.phone.clone())
            .set_opt("address", update.address.clone());
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("School", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("School", id))
    }

    async fn set_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        note: Option<&str>,
    ) -> Result<School, DbError> {
        let mut changes = Changes::new()
            .set("verification_status", status.as_str())
            .set_opt("verification_note", note);
        if status != VerificationStatus::Pending {
            changes = changes.set("verified_at", now_ts());
        }
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("School", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("School", id))
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

        sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE school_id = ?")
            .bind(now_ts())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM schools WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_school_repository(pool: &DbPool) -> Box<dyn SchoolRepository> {
    Box::new(SqliteSchoolRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct SchoolRow {
    id: String,
    name: String,
    code: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    verification_status: String,
    verification_note: Option<String>,
    verified_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SchoolRow> for School {
    type Error = DbError;

    fn try_from(row: SchoolRow) -> Result<Self, Self::Error> {
        Ok(School {
            id: parse_uuid(&row.id, "schools.id")?,
            name: row.name,
            code: row.code,
            email: row.email,
            phone: row.phone,
            address: row.address,
            verification_status: parse_enum(&row.verification_status, "verification_status")?,
            verification_note: row.verification_note,
            verified_at: parse_opt_ts(row.verified_at)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
