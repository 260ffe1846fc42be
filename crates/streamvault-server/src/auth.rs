//! Request authentication against the catalog.

use axum::http::{header, HeaderMap};

use crate::app::App;
use crate::error::ApiError;

/// The raw Authorization header value, if present and valid UTF-8.
#[must_use]
pub fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Resolves the Authorization header to a known user.
///
/// # Errors
///
/// [`ApiError::Unauthorized`] for a missing or unknown credential.
pub fn current_user(app: &App, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = authorization(headers).ok_or(ApiError::Unauthorized)?;
    app.catalog
        .verify_user(token)?
        .ok_or(ApiError::Unauthorized)
}

/// Resolves the Authorization header to a user holding the manager role.
///
/// # Errors
///
/// [`ApiError::Unauthorized`] / [`ApiError::NotManager`].
pub fn current_manager(app: &App, headers: &HeaderMap) -> Result<String, ApiError> {
    let user = current_user(app, headers)?;
    if app.catalog.is_manager(&user)? {
        Ok(user)
    } else {
        Err(ApiError::NotManager)
    }
}

/// The activation token a core presents. Validity is checked by the
/// manager's token index, not here.
///
/// # Errors
///
/// [`ApiError::Unauthorized`] when the header is missing.
pub fn core_token(headers: &HeaderMap) -> Result<String, ApiError> {
    authorization(headers)
        .map(str::to_owned)
        .ok_or(ApiError::Unauthorized)
}
