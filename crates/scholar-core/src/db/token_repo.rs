//! Refresh-token storage. Only SHA-256 digests are persisted.

use super::convert::{fmt_ts, now_ts, parse_uuid};
use super::{DbError, DbPool};
use crate::auth::token::IssuedRefreshToken;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn store(&self, user_id: Uuid, token: &IssuedRefreshToken) -> Result<(), DbError>;

    /// Owner of a live (unexpired, unrevoked) token with this digest.
    async fn find_active(&self, token_hash: &str) -> Result<Option<Uuid>, DbError>;

    /// Revokes `old_hash` and stores `replacement` atomically. Returns the
    /// owner, or `None` when the old token was not live.
    async fn rotate(
        &self,
        old_hash: &str,
        replacement: &IssuedRefreshToken,
    ) -> Result<Option<Uuid>, DbError>;

    /// Revokes a token. Revoking an unknown or already revoked token is not
    /// an error; returns whether anything changed.
    async fn revoke(&self, token_hash: &str) -> Result<bool, DbError>;
}

pub struct SqliteRefreshTokenRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteRefreshTokenRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

async fn insert_token<'e, E>(executor: E, user_id: Uuid, token: &IssuedRefreshToken) -> Result<(), DbError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked_at, created_at) \
         VALUES (?, ?, ?, ?, NULL, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(&token.hash)
    .bind(fmt_ts(token.expires_at))
    .bind(now_ts())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl RefreshTokenRepository for SqliteRefreshTokenRepository {
    async fn store(&self, user_id: Uuid, token: &IssuedRefreshToken) -> Result<(), DbError> {
        insert_token(&self.pool, user_id, token).await
    }

    async fn find_active(&self, token_hash: &str) -> Result<Option<Uuid>, DbError> {
        let user_id: Option<String> = sqlx::query_scalar(
            "SELECT user_id FROM refresh_tokens \
             WHERE token_hash = ? AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;
        user_id
            .map(|id| parse_uuid(&id, "refresh_tokens.user_id"))
            .transpose()
    }

    async fn rotate(
        &self,
        old_hash: &str,
        replacement: &IssuedRefreshToken,
    ) -> Result<Option<Uuid>, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let now = now_ts();
        let owner: Option<String> = sqlx::query_scalar(
            "UPDATE refresh_tokens SET revoked_at = ? \
             WHERE token_hash = ? AND revoked_at IS NULL AND expires_at > ? \
             RETURNING user_id",
        )
        .bind(&now)
        .bind(old_hash)
        .bind(&now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(owner) = owner else {
            return Ok(None);
        };
        let user_id = parse_uuid(&owner, "refresh_tokens.user_id")?;
        insert_token(&mut *tx, user_id, replacement).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(Some(user_id))
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL",
        )
        .bind(now_ts())
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn create_refresh_token_repository(pool: &DbPool) -> Box<dyn RefreshTokenRepository> {
    Box::new(SqliteRefreshTokenRepository::new(pool.inner().clone()))
}
