use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, validation};
use crate::api::types::{
    ApiKeyResponse, LoginRequest, LoginResponse, MessageResponse, RegisterRequest, UserDto,
};

const SESSION_USER_KEY: &str = "user_id";

/// Verified identity attached to the request by the auth middleware.
/// Handlers never see credentials, only this claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub is_admin: bool,
}

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware that checks:
/// 1. Session cookie (from login)
/// 2. `Authorization: Bearer <api_key>` header
/// 3. `X-Api-Key` header
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    // Session first (fastest path for the web client)
    if let Ok(Some(user_id)) = session.get::<i32>(SESSION_USER_KEY).await {
        if let Ok(Some(user)) = state.store().get_user(user_id).await {
            tracing::Span::current().record("user_id", user.id);
            request.extensions_mut().insert(Claims {
                user_id: user.id,
                is_admin: user.is_admin,
            });
            return Ok(next.run(request).await);
        }
    }

    if let Some(key) = extract_api_key(&headers) {
        if let Ok(Some(user)) = state.store().verify_api_key(&key).await {
            tracing::Span::current().record("user_id", user.id);
            request.extensions_mut().insert(Claims {
                user_id: user.id,
                is_admin: user.is_admin,
            });
            return Ok(next.run(request).await);
        }
    }

    let response = (StatusCode::UNAUTHORIZED, "Unauthorized");
    Ok(response.into_response())
}

/// Layered inside `auth_middleware`; rejects non-admin claims.
pub async fn require_admin(
    Extension(claims): Extension<Claims>,
    request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    if !claims.is_admin {
        return Err(ApiError::Forbidden("Admin privileges required".to_string()));
    }
    Ok(next.run(request).await)
}

/// Extract API key from headers
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    if let Some(api_key) = headers.get("X-Api-Key")
        && let Ok(key_str) = api_key.to_str()
    {
        return Some(key_str.to_string());
    }

    None
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let username = validation::validate_username(&payload.username)?;
    validation::validate_password(&payload.password)?;
    let email = validation::validate_email(&payload.email)?;

    let existing = state
        .store()
        .get_user_by_username(username)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to check username: {e}")))?;

    if existing.is_some() {
        return Err(ApiError::Conflict("Username is already taken".to_string()));
    }

    let security = state.config().read().await.security.clone();
    let user = state
        .store()
        .create_user(username, &payload.password, email, &security)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create user: {e}")))?;

    tracing::info!("Registered user: {}", user.username);

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}

/// POST /api/login
/// Verify credentials, stamp activity, create a session. Returns the
/// profile plus the API key for non-browser clients.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let is_valid = state
        .store()
        .verify_user_password(&payload.username, &payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?;

    if !is_valid {
        return Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    }

    let user = state
        .store()
        .get_user_by_username(&payload.username)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

    state
        .store()
        .touch_last_login(user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stamp login: {e}")))?;

    if let Err(e) = session.insert(SESSION_USER_KEY, user.id).await {
        return Err(ApiError::internal(format!("Failed to create session: {e}")));
    }

    tracing::info!("User logged in: {}", user.username);

    let api_key = user.api_key.clone();
    Ok(Json(ApiResponse::success(LoginResponse {
        user: UserDto::from(user),
        api_key,
    })))
}

/// POST /api/logout
pub async fn logout(session: Session) -> Json<ApiResponse<MessageResponse>> {
    let _ = session.flush().await;
    Json(ApiResponse::success(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// POST /api/api-key/regenerate
/// Swap the caller's API key for a fresh one, invalidating the old one.
pub async fn regenerate_api_key(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>, ApiError> {
    let api_key = state.store().regenerate_api_key(claims.user_id).await?;

    tracing::info!("API key regenerated for user {}", claims.user_id);

    Ok(Json(ApiResponse::success(ApiKeyResponse { api_key })))
}

/// GET /api/me
/// Current profile; reading it counts as activity.
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    state
        .store()
        .touch_last_active(claims.user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stamp activity: {e}")))?;

    let user = state
        .store()
        .get_user(claims.user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::not_found("User", claims.user_id))?;

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}
