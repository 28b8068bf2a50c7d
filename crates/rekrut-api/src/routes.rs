//! Auth route handlers
//!
//! Wire contract: camelCase JSON bodies, session token carried only in an
//! HttpOnly cookie, never in a response body.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Extension, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rekrut_auth::{LoginAttempt, LoginMethod};
use rekrut_core::types::Identity;
use rekrut_core::Error;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::middleware::CurrentUser;
use crate::server::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    /// "ldap" or "local"; the directory path is the default
    pub preferred_method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLocalPasswordRequest {
    pub email: Option<String>,
    /// Current credential, verified through the configured path
    pub password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_admin: bool,
}

impl From<&Identity> for UserPayload {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            email: identity.email.clone(),
            name: identity.display_name(),
            role: identity.role.to_string(),
            is_admin: identity.role.is_admin(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapStatusResponse {
    pub success: bool,
    pub ldap_available: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
}

/// Error wrapper translating the core taxonomy into HTTP responses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if err.http_status() >= 500 {
            error!(error = %err, "request failed");
        }
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            success: false,
            error: err.code(),
            message: err.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Validation(format!("{} is required", name)).into()),
    }
}

fn parse_method(method: Option<&str>) -> Result<LoginMethod, ApiError> {
    match method {
        None | Some("ldap") => Ok(LoginMethod::Ldap),
        Some("local") => Ok(LoginMethod::Local),
        Some(other) => {
            Err(Error::Validation(format!("unknown preferredMethod: {}", other)).into())
        }
    }
}

/// Caller IP for the audit trail. Falls back to "unknown" when the server
/// runs without connect info (tests, reverse-proxy setups).
pub struct Peer(pub String);

impl<S> FromRequestParts<S> for Peer
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Peer(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    // HttpOnly + SameSite always; Secure per deployment config. The token
    // does not appear anywhere scripts can read it.
    Cookie::build((state.config.session.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.session.cookie_secure)
        .build()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ldap-status - directory reachability probe, diagnostic only
pub async fn ldap_status(State(state): State<AppState>) -> Json<LdapStatusResponse> {
    let ldap_available =
        state.config.ldap.enabled && state.directory.is_service_reachable().await;

    Json(LdapStatusResponse {
        success: true,
        ldap_available,
    })
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Peer(peer): Peer,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>), ApiError> {
    let attempt = LoginAttempt {
        email: required(request.email, "email")?,
        secret: required(request.password, "password")?,
        method: parse_method(request.preferred_method.as_deref())?,
        peer,
    };

    let identity = state.authenticator.login(attempt).await?;
    let token = state.issuer.issue(&identity)?;

    Ok((
        StatusCode::OK,
        jar.add(session_cookie(&state, token)),
        Json(UserResponse {
            success: true,
            user: UserPayload::from(&identity),
        }),
    ))
}

/// POST /logout - idempotent, succeeds with or without a session
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(
        Cookie::build((state.config.session.cookie_name.clone(), ""))
            .path("/")
            .build(),
    );

    (jar, Json(serde_json::json!({ "success": true })))
}

/// POST /register - local-path account creation, where enabled
pub async fn register(
    State(state): State<AppState>,
    Peer(peer): Peer,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>), ApiError> {
    let email = required(request.email, "email")?;
    let password = required(request.password, "password")?;

    let identity = state
        .authenticator
        .register(
            &email,
            &password,
            request.first_name.as_deref(),
            request.last_name.as_deref(),
            &peer,
        )
        .await?;
    let token = state.issuer.issue(&identity)?;

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(&state, token)),
        Json(UserResponse {
            success: true,
            user: UserPayload::from(&identity),
        }),
    ))
}

/// POST /set-local-password
pub async fn set_local_password(
    State(state): State<AppState>,
    Peer(peer): Peer,
    Json(request): Json<SetLocalPasswordRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let email = required(request.email, "email")?;
    let password = required(request.password, "password")?;
    let new_password = required(request.new_password, "newPassword")?;

    let identity = state
        .authenticator
        .set_local_password(&email, &password, &new_password, &peer)
        .await?;

    Ok(Json(UserResponse {
        success: true,
        user: UserPayload::from(&identity),
    }))
}

/// GET /me - the caller's session, as seen by the server
pub async fn me(
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "user": {
            "id": claims.sub.to_string(),
            "email": claims.email,
            "name": claims.name,
            "role": claims.role.to_string(),
            "isAdmin": claims.role.is_admin(),
        }
    }))
}
