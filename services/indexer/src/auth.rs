//! HTTP basic auth in front of the admin routes

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::state::SharedState;

pub async fn require_admin(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let cfg = &state.config;
    if !check_basic(request.headers(), &cfg.admin_username, &cfg.admin_password) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn check_basic(headers: &HeaderMap, username: &str, password: &str) -> bool {
    let Some(credentials) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| STANDARD.decode(v.trim()).ok())
        .and_then(|v| String::from_utf8(v).ok())
    else {
        return false;
    };

    match credentials.split_once(':') {
        Some((user, pass)) => user == username && pass == password,
        None => false,
    }
}
