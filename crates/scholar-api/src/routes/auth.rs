//! Sign-in, token refresh and school self-registration.

use axum::{extract::State, routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use scholar_core::auth::token::hash_refresh_token;
use scholar_core::auth::{Role, User};
use scholar_core::db::{
    create_refresh_token_repository, create_school_repository, create_user_repository,
};
use scholar_core::models::{NewSchool, VerificationStatus};
use scholar_core::{hash_password, validate_password_strength, verify_password};

use crate::auth::{ensure_may_sign_in, CurrentUser};
use crate::dto::Reply;
use crate::error::{ApiError, ApiResult};
use crate::extract::Body;
use crate::state::AppState;

/// Creates the auth routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// Public registration of a new school and its first administrator.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 200, message = "School name must be 2-200 characters"))]
    pub school_name: String,
    #[validate(length(min = 2, max = 20, message = "School code must be 2-20 characters"))]
    pub school_code: String,
    #[validate(email(message = "Invalid school email address"))]
    pub school_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Signs an access token and stores a fresh refresh token for `user`.
async fn issue_tokens(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    let access_token = state.tokens.issue_access(user)?;
    let refresh = state.tokens.new_refresh_token();
    create_refresh_token_repository(&state.db)
        .store(user.id, &refresh)
        .await?;

    Ok(TokenPair {
        access_token,
        refresh_token: refresh.token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.access_ttl_secs(),
    })
}

fn ensure_strong(password: &str) -> ApiResult<()> {
    let problems = validate_password_strength(password);
    if problems.is_empty() {
        return Ok(());
    }
    Err(ApiError::validation_field(
        "password",
        "weak_password",
        &problems.join("; "),
    ))
}

/// Registers a school. It stays pending until a super admin approves it.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "School registered, awaiting verification"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 409, description = "School code or email already in use", body = crate::error::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Body(request): Body<RegisterRequest>,
) -> ApiResult<Reply> {
    request.validate()?;
    ensure_strong(&request.password)?;

    let schools = create_school_repository(&state.db);
    let users = create_user_repository(&state.db);
    if schools.code_taken(&request.school_code, None).await? {
        return Err(ApiError::Conflict("School code already registered".to_string()));
    }
    if users.email_taken(&request.email).await? {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let school = NewSchool {
        name: request.school_name.trim().to_string(),
        code: request.school_code,
        email: request.school_email,
        phone: request.phone,
        address: request.address,
        verification_status: VerificationStatus::Pending,
    };
    let admin = User::new(
        &request.email,
        hash_password(&request.password)?,
        request.first_name,
        request.last_name,
        Role::SchoolAdmin,
        None,
    );
    let (school, admin) = schools.create_with_admin(&school, &admin).await?;

    info!(school_id = %school.id, user_id = %admin.id, "School registered");

    Reply::created("School registered successfully; awaiting verification")
        .with("school", &school)?
        .with("user", &admin)
}

/// Exchanges credentials for an access and refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in"),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 403, description = "Account deactivated or school not verified", body = crate::error::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Body(request): Body<LoginRequest>,
) -> ApiResult<Reply> {
    request.validate()?;

    let users = create_user_repository(&state.db);
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let Some(user) = users.get_by_email(&request.email).await? else {
        warn!(email = %request.email, "Login attempt for unknown account");
        return Err(invalid());
    };
    if !verify_password(&request.password, &user.password_hash)? {
        warn!(user_id = %user.id, "Invalid password");
        return Err(invalid());
    }

    ensure_may_sign_in(&state, &user).await?;

    let tokens = issue_tokens(&state, &user).await?;
    users.update_last_login(user.id).await?;

    info!(user_id = %user.id, role = %user.role, "User logged in");

    Reply::ok("Login successful")
        .with("accessToken", &tokens.access_token)?
        .with("refreshToken", &tokens.refresh_token)?
        .with("tokenType", &tokens.token_type)?
        .with("expiresIn", &tokens.expires_in)?
        .with("user", &user)
}

/// Rotates a refresh token. The presented token stops working.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Unknown, expired or revoked refresh token", body = crate::error::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Body(request): Body<RefreshRequest>,
) -> ApiResult<Reply> {
    request.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid refresh token".to_string());
    let replacement = state.tokens.new_refresh_token();
    let owner = create_refresh_token_repository(&state.db)
        .rotate(&hash_refresh_token(&request.refresh_token), &replacement)
        .await?
        .ok_or_else(invalid)?;

    let user = create_user_repository(&state.db)
        .get(owner)
        .await?
        .ok_or_else(invalid)?;
    ensure_may_sign_in(&state, &user).await?;

    let tokens = TokenPair {
        access_token: state.tokens.issue_access(&user)?,
        refresh_token: replacement.token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.access_ttl_secs(),
    };

    Reply::ok("Token refreshed successfully").with("tokens", &tokens)
}

/// Revokes a refresh token. Unknown tokens are accepted silently.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = RefreshRequest,
    responses((status = 200, description = "Signed out")),
    tag = "Auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    Body(request): Body<RefreshRequest>,
) -> ApiResult<Reply> {
    request.validate()?;

    let revoked = create_refresh_token_repository(&state.db)
        .revoke(&hash_refresh_token(&request.refresh_token))
        .await?;
    if revoked {
        info!("Refresh token revoked");
    }

    Ok(Reply::ok("Logged out successfully"))
}

/// The caller's account and resolved identity.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user"),
        (status = 401, description = "Not signed in", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn me(caller: CurrentUser) -> ApiResult<Reply> {
    Reply::ok("Current user retrieved successfully")
        .with("user", &caller.user)?
        .with("identity", &caller.identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_password_is_a_field_error() {
        let err = ensure_strong("short").unwrap_err();
        match err {
            ApiError::ValidationError(details) => {
                assert_eq!(details.errors[0].field, "password");
                assert_eq!(details.errors[0].code, "weak_password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
