//! Parents, their login accounts, and guardianship edges.

use super::convert::{now_ts, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::user_repo::insert_user;
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::auth::{Role, User};
use crate::models::{Guardianship, NewParent, Parent, ParentUpdate};
use async_trait::async_trait;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::Parent,
    columns: "id, school_id, first_name, last_name, email, phone, address, created_at, updated_at",
    order_by: "last_name ASC, first_name ASC",
};

const DEPENDENTS: &[DependentRef] = &[
    ("students", "guardianships", "parent_id"),
    ("orders", "material_orders", "parent_id"),
];

#[derive(Debug, Clone, Default)]
pub struct ParentFilter {
    /// Only guardians of this student.
    pub student_id: Option<Uuid>,
    pub search: Option<String>,
}

#[async_trait]
pub trait ParentRepository: Send + Sync {
    async fn create_with_account(
        &self,
        parent: &NewParent,
        password_hash: &str,
    ) -> Result<(Parent, User), DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Parent>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ParentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Parent>, DbError>;

    async fn update(&self, id: Uuid, update: &ParentUpdate) -> Result<Parent, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Links a parent to a student; relinking updates the relationship label.
    async fn add_guardianship(
        &self,
        parent_id: Uuid,
        student_id: Uuid,
        relationship: &str,
    ) -> Result<Guardianship, DbError>;

    async fn remove_guardianship(&self, parent_id: Uuid, student_id: Uuid) -> Result<bool, DbError>;

    async fn is_guardian(&self, parent_id: Uuid, student_id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteParentRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteParentRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParentRepository for SqliteParentRepository {
    async fn create_with_account(
        &self,
        parent: &NewParent,
        password_hash: &str,
    ) -> Result<(Parent, User), DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let id = Uuid::new_v4();
        let now = now_ts();
        let email = parent.email.trim().to_lowercase();
        let row: ParentRow = sqlx::query_as(&format!(
            "INSERT INTO parents ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            TABLE.columns, TABLE.columns
        ))
        .bind(id.to_string())
        .bind(parent.school_id.to_string())
        .bind(&parent.first_name)
        .bind(&parent.last_name)
        .bind(&email)
        .bind(&parent.phone)
        .bind(&parent.address)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        let user = User::new(
            &email,
            password_hash,
            &parent.first_name,
            &parent.last_name,
            Role::Parent,
            Some(parent.school_id),
        )
        .with_parent(id);
        insert_user(&mut *tx, &user).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok((row.try_into()?, user))
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Parent>, DbError> {
        TABLE.find::<ParentRow, Parent>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ParentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Parent>, DbError> {
        let mut rows = RowFilter::new().search(
            &["first_name", "last_name", "email"],
            filter.search.as_deref(),
        );
        if let Some(student_id) = filter.student_id {
            rows = rows.in_select(
                "id",
                "SELECT g.parent_id FROM guardianships g WHERE g.student_id = ",
                student_id,
            );
        }
        TABLE
            .list::<ParentRow, Parent>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn update(&self, id: Uuid, update: &ParentUpdate) -> Result<Parent, DbError> {
        let changes = Changes::new()
            .set_opt("first_name", update.first_name.clone())
            .set_opt("last_name", update.last_name.clone())
            .set_opt("phone", update.phone.clone())
            .set_opt("address", update.address.clone());
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Parent", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Parent", id))
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

        sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE parent_id = ?")
            .bind(now_ts())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM parents WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_guardianship(
        &self,
        parent_id: Uuid,
        student_id: Uuid,
        relationship: &str,
    ) -> Result<Guardianship, DbError> {
        let row: GuardianshipRow = sqlx::query_as(
            "INSERT INTO guardianships (parent_id, student_id, relationship, created_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (parent_id, student_id) DO UPDATE SET relationship = excluded.relationship \
             RETURNING parent_id, student_id, relationship, created_at",
        )
        .bind(parent_id.to_string())
        .bind(student_id.to_string())
        .bind(relationship)
        .bind(now_ts())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn remove_guardianship(&self, parent_id: Uuid, student_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM guardianships WHERE parent_id = ? AND student_id = ?")
            .bind(parent_id.to_string())
            .bind(student_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_guardian(&self, parent_id: Uuid, student_id: Uuid) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM guardianships WHERE parent_id = ? AND student_id = ?",
        )
        .bind(parent_id.to_string())
        .bind(student_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

pub fn create_parent_repository(pool: &DbPool) -> Box<dyn ParentRepository> {
    Box::new(SqliteParentRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct ParentRow {
    id: String,
    school_id: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    address: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ParentRow> for Parent {
    type Error = DbError;

    fn try_from(row: ParentRow) -> Result<Self, Self::Error> {
        Ok(Parent {
            id: parse_uuid(&row.id, "parents.id")?,
            school_id: parse_uuid(&row.school_id, "parents.school_id")?,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GuardianshipRow {
    parent_id: String,
    student_id: String,
    relationship: String,
    created_at: String,
}

impl TryFrom<GuardianshipRow> for Guardianship {
    type Error = DbError;

    fn try_from(row: GuardianshipRow) -> Result<Self, Self::Error> {
        Ok(Guardianship {
            parent_id: parse_uuid(&row.parent_id, "guardianships.parent_id")?,
            student_id: parse_uuid(&row.student_id, "guardianships.student_id")?,
            relationship: row.relationship,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_parent, seed_school, seed_student, test_pool};

    #[tokio::test]
    async fn test_guardianship_lifecycle() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "GRD").await;
        let (parent, user) = seed_parent(&pool, school.id, "mum@grd.test").await;
        let student = seed_student(&pool, school.id, None, "G-1").await;
        let repo = create_parent_repository(&pool);

        assert_eq!(user.parent_id, Some(parent.id));
        assert!(!repo.is_guardian(parent.id, student.id).await.unwrap());

        repo.add_guardianship(parent.id, student.id, "mother").await.unwrap();
        let relinked = repo
            .add_guardianship(parent.id, student.id, "guardian")
            .await
            .unwrap();
        assert_eq!(relinked.relationship, "guardian");
        assert!(repo.is_guardian(parent.id, student.id).await.unwrap());

        let guardians = repo
            .list(
                &Predicate::Unrestricted,
                &ParentFilter {
                    student_id: Some(student.id),
                    search: None,
                },
                &Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(guardians.total, 1);

        assert_eq!(repo.dependents(parent.id).await.unwrap().get("students"), Some(1));
        assert!(repo.remove_guardianship(parent.id, student.id).await.unwrap());
        assert!(repo.dependents(parent.id).await.unwrap().is_clear());
    }
}
