//! User repository for database operations.

use super::convert::{fmt_ts, now_ts, parse_enum, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid};
use super::scope::{Changes, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::auth::{Role, User, UserFilter};
use async_trait::async_trait;
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, \
     school_id, teacher_id, parent_id, student_id, is_active, last_login_at, created_at, updated_at";

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::User,
    columns: USER_COLUMNS,
    order_by: "last_name ASC, first_name ASC",
};

/// Repository trait for user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<User>, DbError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    /// Users visible under `predicate`.
    async fn list(
        &self,
        predicate: &Predicate,
        filter: &UserFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<User>, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<User>, DbError>;

    async fn email_taken(&self, email: &str) -> Result<bool, DbError>;

    /// Activates or deactivates an account. Deactivation also revokes every
    /// outstanding refresh token.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<User, DbError>;

    async fn update_last_login(&self, id: Uuid) -> Result<(), DbError>;

    async fn any_super_admin(&self) -> Result<bool, DbError>;
}

/// SQLite implementation of UserRepository.
pub struct SqliteUserRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

/// Inserts `user` with the ids and timestamps it already carries.
pub(crate) async fn insert_user<'e, E>(executor: E, user: &User) -> Result<(), DbError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(&format!(
        "INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        USER_COLUMNS
    ))
    .bind(user.id.to_string())
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.role.as_str())
    .bind(user.school_id.map(|id| id.to_string()))
    .bind(user.teacher_id.map(|id| id.to_string()))
    .bind(user.parent_id.map(|id| id.to_string()))
    .bind(user.student_id.map(|id| id.to_string()))
    .bind(user.is_active)
    .bind(user.last_login_at.map(fmt_ts))
    .bind(fmt_ts(user.created_at))
    .bind(fmt_ts(user.updated_at))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> Result<User, DbError> {
        insert_user(&self.pool, user).await?;
        Ok(user.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, DbError> {
        TABLE
            .find::<UserRow, User>(&self.pool, &Predicate::Unrestricted, id)
            .await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
                .bind(email.trim().to_lowercase())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &UserFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<User>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("role", filter.role.map(|r| r.as_str()))
            .eq_opt("is_active", filter.is_active)
            .search(&["email", "first_name", "last_name"], filter.search.as_deref());
        TABLE
            .list::<UserRow, User>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<User>, DbError> {
        TABLE.find::<UserRow, User>(&self.pool, predicate, id).await
    }

    async fn email_taken(&self, email: &str) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<User, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let now = now_ts();
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(&now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        if !active {
            sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
            )
            .bind(&now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        self.get(id).await?.ok_or_else(|| DbError::not_found("User", id))
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), DbError> {
        let changes = Changes::new().set("last_login_at", now_ts());
        TABLE.update(&self.pool, id, changes).await?;
        Ok(())
    }

    async fn any_super_admin(&self) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(Role::SuperAdmin.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

pub fn create_user_repository(pool: &DbPool) -> Box<dyn UserRepository> {
    Box::new(SqliteUserRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    school_id: Option<String>,
    teacher_id: Option<String>,
    parent_id: Option<String>,
    student_id: Option<String>,
    is_active: bool,
    last_login_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_uuid(&row.id, "users.id")?,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            role: parse_enum(&row.role, "role")?,
            school_id: parse_opt_uuid(row.school_id, "users.school_id")?,
            teacher_id: parse_opt_uuid(row.teacher_id, "users.teacher_id")?,
            parent_id: parse_opt_uuid(row.parent_id, "users.parent_id")?,
            student_id: parse_opt_uuid(row.student_id, "users.student_id")?,
            is_active: row.is_active,
            last_login_at: parse_opt_ts(row.last_login_at)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_school, test_pool};

    #[tokio::test]
    async fn test_create_and_lookup() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "LKP").await;
        let repo = create_user_repository(&pool);

        let user = User::new("Admin@Lkp.test", "hash", "A", "D", Role::SchoolAdmin, Some(school.id));
        repo.create(&user).await.unwrap();

        let by_email = repo.get_by_email("ADMIN@lkp.test").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.role, Role::SchoolAdmin);
        assert!(repo.email_taken("admin@lkp.test").await.unwrap());
        assert!(!repo.any_super_admin().await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_tenant_scoped() {
        let pool = test_pool().await;
        let a = seed_school(&pool, "UA").await;
        let b = seed_school(&pool, "UB").await;
        let repo = create_user_repository(&pool);
        repo.create(&User::new("a@ua.test", "h", "A", "A", Role::Principal, Some(a.id)))
            .await
            .unwrap();
        let other = User::new("b@ub.test", "h", "B", "B", Role::Principal, Some(b.id));
        repo.create(&other).await.unwrap();

        let scoped = Predicate::Tenant { school_id: a.id };
        let page = repo
            .list(&scoped, &UserFilter::default(), &Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(repo.find(&scoped, other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivate_and_last_login() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);
        let user = User::new("t@x.test", "h", "T", "X", Role::SuperAdmin, None);
        repo.create(&user).await.unwrap();
        assert!(repo.any_super_admin().await.unwrap());

        repo.update_last_login(user.id).await.unwrap();
        let inactive = repo.set_active(user.id, false).await.unwrap();
        assert!(!inactive.is_active);
        assert!(inactive.last_login_at.is_some());

        assert!(matches!(
            repo.set_active(Uuid::new_v4(), true).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
