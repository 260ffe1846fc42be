//! HTTP-facing error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use streamvault_catalog::CatalogError;
use streamvault_core::VaultError;
use streamvault_store::StoreError;

/// Errors a request handler can surface. Each maps to a status code and a
/// plain-text reason; the core never sees HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A lifecycle manager failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A payload store failure outside a manager callback.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A catalog failure outside the deferred queue.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A malformed request body or header.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or unrecognized credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// A valid user without the manager role.
    #[error("not a manager")]
    NotManager,

    /// A background task failed to complete.
    #[error("internal error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Vault(err) => match err {
                VaultError::NotFound(_) | VaultError::NoSuchTarget(_) => StatusCode::NOT_FOUND,
                VaultError::BadToken => StatusCode::UNAUTHORIZED,
                VaultError::NotOwner { .. } => StatusCode::FORBIDDEN,
                VaultError::Duplicate(_)
                | VaultError::NoStreamsAvailable(_)
                | VaultError::DuplicateFrame
                | VaultError::CallbackFailed(_) => StatusCode::BAD_REQUEST,
            },
            Self::Store(StoreError::InvalidPath(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(_) | Self::Catalog(_) | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotManager => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
