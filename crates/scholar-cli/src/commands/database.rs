//! Database maintenance commands.

use anyhow::{Context, Result};
use colored::Colorize;
use scholar_core::db::{
    create_pool_with_options, ensure_super_admin, run_migrations, DbPool, PoolOptions,
};

use crate::config::AppConfig;

/// Opens the configured database and brings the schema up to date.
pub async fn open_database(config: &AppConfig) -> Result<DbPool> {
    let mut options = PoolOptions::default();
    if let Some(max) = config.database.max_connections {
        options.max_connections = max;
    }
    if let Some(min) = config.database.min_connections {
        options.min_connections = min;
    }

    println!("  {} Database: {}", "→".green(), config.database.url);
    let pool = create_pool_with_options(&config.database.url, options)
        .await
        .context("Failed to create database connection pool")?;

    println!("  {} Running migrations...", "→".green());
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    println!("  {} Migrations complete", "✓".green());

    Ok(pool)
}

/// Creates the platform SuperAdmin if none exists yet.
///
/// A generated password is printed once; it is not stored anywhere else.
pub async fn seed_super_admin(pool: &DbPool, config: &AppConfig) -> Result<()> {
    let generated = ensure_super_admin(
        pool,
        &config.auth.admin_email,
        config.auth.admin_password.clone(),
    )
    .await
    .context("Failed to seed SuperAdmin account")?;

    match generated {
        Some(password) => {
            println!(
                "  {} Created SuperAdmin {}",
                "✓".green(),
                config.auth.admin_email.cyan()
            );
            println!(
                "  {} Generated password: {}",
                "!".yellow().bold(),
                password.bold()
            );
            println!("    Store it now; it will not be shown again.");
        }
        None => println!("  {} SuperAdmin present", "✓".green()),
    }
    Ok(())
}

/// `scholar migrate`
pub async fn run_migrate(config: AppConfig) -> Result<()> {
    println!("{} Migrating database...", "[db]".cyan());
    let pool = open_database(&config).await?;
    pool.close().await;
    Ok(())
}

/// `scholar seed-admin`
pub async fn run_seed_admin(config: AppConfig) -> Result<()> {
    println!("{} Seeding SuperAdmin...", "[db]".cyan());
    let pool = open_database(&config).await?;
    let result = seed_super_admin(&pool, &config).await;
    pool.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholar_core::db::{create_user_repository, UserRepository};

    fn memory_config(name: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite:file:cli_{}?mode=memory&cache=shared", name);
        config.database.max_connections = Some(1);
        config.auth.admin_email = "root@scholar.test".to_string();
        config
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let config = memory_config("seed");
        let pool = open_database(&config).await.unwrap();

        seed_super_admin(&pool, &config).await.unwrap();
        seed_super_admin(&pool, &config).await.unwrap();

        let users = create_user_repository(&pool);
        assert!(users.any_super_admin().await.unwrap());
        let admin = users.get_by_email("root@scholar.test").await.unwrap();
        assert!(admin.is_some());
    }
}
