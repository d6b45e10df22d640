//! Admin password gate for moderation routes.
//!
//! Implements constant-time comparison to mitigate timing attacks.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Header name for the admin password.
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

/// Admin gate layer function that takes the expected password as a parameter.
///
/// Unlike the public listing routes, admin routes stay closed when no
/// password is configured.
pub async fn admin_gate_layer(
    expected_password: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected_password else {
        return AppError::Unauthorized("Admin access is disabled".to_string()).into_response();
    };

    match provided_password(request.headers()) {
        Some(provided) if constant_time_compare(&provided, &expected) => next.run(request).await,
        Some(_) => AppError::Unauthorized("Invalid admin password".to_string()).into_response(),
        None => AppError::Unauthorized("Missing admin password".to_string()).into_response(),
    }
}

/// Read the password from the dedicated header, or a bearer token.
fn provided_password(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
        .map(String::from)
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
