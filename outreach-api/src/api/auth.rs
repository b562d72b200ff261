//! Session authentication
//!
//! Login exchanges a known account email for an opaque bearer token; only
//! the token's SHA-256 hash is stored. The middleware resolves the bearer
//! token back to an identity on every protected request and rejects
//! expired or unknown tokens with 401.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use outreach_common::db::get_setting_i64;
use outreach_common::token::{generate_token, hash_token};

use super::ApiError;
use crate::tenant::Identity;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// POST /api/auth/login
///
/// Issues a session token for an existing account. Unknown emails get the
/// same 401 as bad credentials.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::Validation("email is required".to_string()));
    }

    let user_id: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    let Some(user_id) = user_id else {
        return Err(ApiError::AuthRequired);
    };

    let ttl_seconds = get_setting_i64(&state.db, "session_ttl_seconds", 2_592_000)
        .await
        .map_err(ApiError::from)?;
    let expires_at = Utc::now() + Duration::seconds(ttl_seconds);

    let token = generate_token();
    // datetime() normalizes the RFC3339 binding to the column's stored
    // format so the expiry comparison against CURRENT_TIMESTAMP holds
    sqlx::query("INSERT INTO auth_sessions (token_hash, user_id, expires_at) VALUES (?, ?, datetime(?))")
        .bind(hash_token(&token))
        .bind(&user_id)
        .bind(expires_at)
        .execute(&state.db)
        .await?;

    info!("Issued session for user {}", user_id);

    Ok(Json(LoginResponse {
        token,
        user_id,
        expires_at,
    }))
}

/// Resolve a bearer token to an identity (None when absent/expired/unknown)
pub async fn resolve_bearer(
    db: &sqlx::SqlitePool,
    authorization: Option<&str>,
) -> Result<Option<Identity>, sqlx::Error> {
    let Some(token) = authorization.and_then(|v| v.strip_prefix("Bearer ")) else {
        return Ok(None);
    };
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }

    let row: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT u.id, u.email
        FROM auth_sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ? AND s.expires_at > CURRENT_TIMESTAMP
        "#,
    )
    .bind(hash_token(token))
    .fetch_optional(db)
    .await?;

    Ok(row.map(|(user_id, email)| Identity { user_id, email }))
}

/// Middleware guarding session-authenticated routes
///
/// On success the resolved `Identity` is inserted into request extensions
/// for handlers to pick up.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let identity = resolve_bearer(&state.db, authorization.as_deref()).await?;
    let Some(identity) = identity else {
        return Err(ApiError::AuthRequired);
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
