//! SQLite connection pool.

use super::DbError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Escapes `%`, `_` and `\` for a LIKE pattern declared with `ESCAPE '\'`.
///
/// ```
/// use scholar_core::db::escape_like_pattern;
///
/// assert_eq!(escape_like_pattern("50%_off"), r"50\%\_off");
/// ```
pub fn escape_like_pattern(pattern: &str) -> String {
    pattern
        .chars()
        .fold(String::with_capacity(pattern.len()), |mut out, c| {
            if matches!(c, '%' | '_' | '\\') {
                out.push('\\');
            }
            out.push(c);
            out
        })
}

/// `%term%` with `term` escaped.
pub fn make_like_pattern(search: &str) -> String {
    format!("%{}%", escape_like_pattern(search))
}

/// Handle to the relational store, constructed once at start-up and shared
/// by every repository.
#[derive(Debug, Clone)]
pub struct DbPool(SqlitePool);

/// Sizing and timeouts for [`create_pool_with_options`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a query waits for a free connection.
    pub acquire_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

fn env_setting<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

impl Default for PoolOptions {
    /// Reads `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS` and
    /// `DATABASE_ACQUIRE_TIMEOUT_SECS`, falling back to 10, 1 and 30.
    fn default() -> Self {
        Self {
            max_connections: env_setting("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env_setting("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(env_setting(
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                30,
            )),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
        }
    }
}

impl PoolOptions {
    /// One long-lived connection. Shared-cache in-memory databases vanish
    /// when their last connection closes.
    pub fn single_connection() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            max_lifetime: None,
            idle_timeout: None,
        }
    }
}

/// Opens a pool for a `sqlite:` URL with [`PoolOptions::default`].
pub async fn create_pool(database_url: &str) -> Result<DbPool, DbError> {
    create_pool_with_options(database_url, PoolOptions::default()).await
}

/// Opens a pool with explicit options.
///
/// Every connection enforces foreign keys, and a missing database file is
/// created.
pub async fn create_pool_with_options(
    database_url: &str,
    options: PoolOptions,
) -> Result<DbPool, DbError> {
    let Some(scheme) = database_url.split(':').next().filter(|s| *s == "sqlite") else {
        return Err(DbError::Configuration(format!(
            "Only sqlite: URLs are supported, got '{}'",
            database_url.split(':').next().unwrap_or_default()
        )));
    };

    let connect = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    info!(
        scheme,
        max_connections = options.max_connections,
        min_connections = options.min_connections,
        "Opening database pool"
    );
    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .min_connections(options.min_connections)
        .acquire_timeout(options.acquire_timeout)
        .max_lifetime(options.max_lifetime)
        .idle_timeout(options.idle_timeout)
        .connect_with(connect)
        .await?;

    Ok(DbPool(pool))
}

impl DbPool {
    pub fn inner(&self) -> &SqlitePool {
        &self.0
    }

    /// Driver name reported by the health endpoint.
    pub fn db_type(&self) -> &'static str {
        "sqlite"
    }

    /// Round-trips a trivial query.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.0)
            .await
            .is_ok()
    }

    pub async fn close(&self) {
        self.0.close().await
    }

    /// Open connections, busy or idle.
    pub fn pool_size(&self) -> u32 {
        self.0.size()
    }

    pub fn idle_connections(&self) -> usize {
        self.0.num_idle()
    }
}
