//! Session middleware
//!
//! Turns the session cookie into a `CurrentUser` extension for downstream
//! handlers, and gates admin-only routes on the administrator role.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use rekrut_auth::SessionClaims;

use crate::server::AppState;

/// Verified session claims of the caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionClaims);

/// Reject requests without a valid, unexpired session cookie.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let cookie_name = state.config.session.cookie_name.as_str();
    let token = jar
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Expired and invalid both answer 401; the distinction stays in logs
    let claims = state
        .issuer
        .verify(&token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(CurrentUser(claims));
    Ok(next.run(request).await)
}

/// Admin gate. Runs after `require_session`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, StatusCode> {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| user.0.role.is_admin())
        .unwrap_or(false);

    if !is_admin {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
