//! Bearer-token authentication.
//!
//! [`CurrentUser`] verifies the access token, reloads the account and
//! rejects deactivated accounts and members of schools that are not
//! approved. The resulting [`Identity`] carries the role exactly as the token
//! claimed it, so an unrecognised role reaches the guard and filter as "no
//! role" and fails closed.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use scholar_core::access::{authorize, resolve_filter, Identity, Predicate, ResourceKind};
use scholar_core::auth::{Role, User};
use scholar_core::db::{create_school_repository, create_user_repository};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub identity: Identity,
}

impl CurrentUser {
    /// Role guard; runs before any lookup of the target resource.
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        authorize(&self.identity, allowed).map_err(ApiError::from)
    }

    /// Row predicate for `kind`. `narrowing` only affects super admins.
    pub fn filter(&self, kind: ResourceKind, narrowing: Option<Uuid>) -> Predicate {
        resolve_filter(&self.identity, kind, narrowing)
    }

    /// School a write lands in.
    ///
    /// Tenant-bound callers always write into their own school. A super
    /// admin names the school explicitly and it must exist.
    pub async fn target_school(
        &self,
        state: &AppState,
        requested: Option<Uuid>,
    ) -> Result<Uuid, ApiError> {
        if !self.identity.is_super_admin() {
            return self.identity.school_id.ok_or_else(|| {
                ApiError::Forbidden("Account is not attached to a school".to_string())
            });
        }

        let school_id = requested.ok_or_else(|| {
            ApiError::validation_field("schoolId", "required", "schoolId is required")
        })?;
        match create_school_repository(&state.db).get(school_id).await? {
            Some(school) => Ok(school.id),
            None => Err(ApiError::validation_field(
                "schoolId",
                "not_found",
                "School not found",
            )),
        }
    }
}

/// Extracts the bearer token from the Authorization header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rejects accounts that may not use the API right now.
pub async fn ensure_may_sign_in(state: &AppState, user: &User) -> Result<(), ApiError> {
    if !user.is_active {
        warn!(user_id = %user.id, "Deactivated account rejected");
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    if let Some(school_id) = user.school_id {
        let school = create_school_repository(&state.db).get(school_id).await?;
        if !school.is_some_and(|s| s.is_operational()) {
            warn!(user_id = %user.id, school_id = %school_id, "School not verified");
            return Err(ApiError::Forbidden(
                "School has not been verified".to_string(),
            ));
        }
    }

    Ok(())
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        let claims = state.tokens.verify(token)?;

        let user_id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid access token".to_string()))?;
        let user = create_user_repository(&state.db)
            .get(user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

        ensure_may_sign_in(&state, &user).await?;

        let identity = Identity::from_claimed_role(&user, &claims.role);
        debug!(user_id = %user.id, role = identity.role_name(), "Authenticated request");

        Ok(CurrentUser { user, identity })
    }
}
