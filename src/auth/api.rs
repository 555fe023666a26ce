//! Authentication API Endpoints
//! Mission: Register, log in and report the current session

use crate::auth::{
    jwt::JwtHandler,
    models::{Claims, LoginRequest, LoginResponse, RegisterRequest, UserResponse},
    user_store::{Registration, UserStore},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

const MIN_PASSWORD_LEN: usize = 8;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
}

impl AuthState {
    pub fn new(user_store: Arc<UserStore>, jwt_handler: Arc<JwtHandler>) -> Self {
        Self {
            user_store,
            jwt_handler,
        }
    }
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AuthApiError> {
    let email = payload.email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(AuthApiError::InvalidEmail);
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthApiError::WeakPassword);
    }

    let store = state.user_store.clone();
    let registered_email = email.clone();
    let outcome = tokio::task::spawn_blocking(move || store.register(&email, &payload.password))
        .await
        .map_err(|e| {
            error!("Registration task failed: {}", e);
            AuthApiError::InternalError
        })?
        .map_err(|e| {
            error!("Registration failed: {:#}", e);
            AuthApiError::InternalError
        })?;

    match outcome {
        Registration::Created(user_id) => Ok((
            StatusCode::CREATED,
            Json(json!({ "userId": user_id, "email": registered_email, "role": "user" })),
        )),
        Registration::EmailTaken => {
            warn!("Registration rejected: email already in use");
            Err(AuthApiError::EmailTaken)
        }
    }
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    let store = state.user_store.clone();
    let user = tokio::task::spawn_blocking(move || {
        store.authenticate(payload.email.trim(), &payload.password)
    })
    .await
    .map_err(|_| AuthApiError::InternalError)?
    .map_err(|e| {
        error!("Login lookup failed: {:#}", e);
        AuthApiError::InternalError
    })?
    .ok_or_else(|| {
        warn!("Failed login attempt");
        AuthApiError::InvalidCredentials
    })?;

    let (token, expires_in) = state
        .jwt_handler
        .generate_token(&user)
        .map_err(|_| AuthApiError::InternalError)?;

    info!(user_id = %user.id, role = %user.role, "Login successful");

    Ok(Json(LoginResponse {
        token,
        expires_in,
        user: UserResponse::from_user(&user),
    }))
}

/// Get current user info - GET /api/auth/me
/// Built from the token claims, no database lookup.
pub async fn get_current_user(Extension(claims): Extension<Claims>) -> Json<UserResponse> {
    Json(UserResponse::from_claims(&claims))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    InvalidEmail,
    WeakPassword,
    EmailTaken,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid email or password",
            ),
            AuthApiError::InvalidEmail => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                "email: must be a valid address",
            ),
            AuthApiError::WeakPassword => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                "password: must be at least 8 characters",
            ),
            AuthApiError::EmailTaken => (StatusCode::CONFLICT, "user_exists", "User already exists"),
            AuthApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error",
            ),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert!(is_plausible_email("a@b.io"));
        assert!(!is_plausible_email("no-at-sign"));
        assert!(!is_plausible_email("@b.io"));
        assert!(!is_plausible_email("a@localhost"));
    }

    #[test]
    fn test_auth_api_error_responses() {
        assert_eq!(
            AuthApiError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthApiError::WeakPassword.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AuthApiError::EmailTaken.into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
