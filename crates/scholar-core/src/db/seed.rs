//! First-run seeding.

use super::{create_user_repository, DbError, DbPool};
use crate::auth::password::{generate_password, hash_password, PasswordError};
use crate::auth::{Role, User};
use thiserror::Error;
use tracing::{info, warn};

/// Length of the password generated when none is configured.
const GENERATED_PASSWORD_LENGTH: usize = 16;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Ensures the platform has a SuperAdmin account.
///
/// Does nothing when any SuperAdmin exists. Otherwise creates one with the
/// given email and `password`, generating a random password when none is
/// supplied.
///
/// Returns the generated password so the caller can show it once, or `None`
/// when no password was generated.
pub async fn ensure_super_admin(
    pool: &DbPool,
    email: &str,
    password: Option<String>,
) -> Result<Option<String>, SeedError> {
    let users = create_user_repository(pool);

    if users.any_super_admin().await? {
        info!("SuperAdmin already exists, skipping seed");
        return Ok(None);
    }

    let (password, generated) = match password {
        Some(password) => (password, false),
        None => {
            warn!("No SCHOLAR_ADMIN_PASSWORD set, generated random password");
            (generate_password(GENERATED_PASSWORD_LENGTH), true)
        }
    };

    let admin = User::new(
        email,
        hash_password(&password)?,
        "Platform",
        "Administrator",
        Role::SuperAdmin,
        None,
    );
    let admin = users.create(&admin).await?;
    info!(user_id = %admin.id, email = %admin.email, "Created SuperAdmin account");

    Ok(generated.then_some(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::db::test_support::test_pool;

    #[tokio::test]
    async fn test_seeds_once_with_given_password() {
        let pool = test_pool().await;

        let first = ensure_super_admin(&pool, "root@scholar.test", Some("Rootpass123".into()))
            .await
            .unwrap();
        assert!(first.is_none());

        let users = create_user_repository(&pool);
        let admin = users.get_by_email("root@scholar.test").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::SuperAdmin);
        assert!(verify_password("Rootpass123", &admin.password_hash).unwrap());

        let again = ensure_super_admin(&pool, "other@scholar.test", None).await.unwrap();
        assert!(again.is_none());
        assert!(users.get_by_email("other@scholar.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generates_password_when_missing() {
        let pool = test_pool().await;

        let generated = ensure_super_admin(&pool, "root@scholar.test", None)
            .await
            .unwrap()
            .expect("generated password");
        assert_eq!(generated.len(), GENERATED_PASSWORD_LENGTH);

        let admin = create_user_repository(&pool)
            .get_by_email("root@scholar.test")
            .await
            .unwrap()
            .unwrap();
        assert!(verify_password(&generated, &admin.password_hash).unwrap());
    }
}
