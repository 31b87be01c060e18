use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;

use crate::config::BasicAuth;
use crate::error::AppError;

/// HTTP basic authentication middleware
pub async fn basic_auth(
    State(credentials): State<Arc<BasicAuth>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    match presented_credentials(request.headers()) {
        Some((username, password)) if credentials_match(&credentials, &username, &password) => {
            Ok(next.run(request).await)
        },
        _ => Err(AppError::Unauthorized),
    }
}

/// Compare both halves in constant time, without short-circuiting
fn credentials_match(credentials: &BasicAuth, username: &str, password: &str) -> bool {
    let user_ok = username.as_bytes().ct_eq(credentials.username.as_bytes());
    let pass_ok = password.as_bytes().ct_eq(credentials.password.as_bytes());
    (user_ok & pass_ok).into()
}

/// Decode `Authorization: Basic <base64(user:pass)>`
fn presented_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
