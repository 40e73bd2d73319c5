//! Error types for the feed service

use self_updating_cache::CacheError;
use thiserror::Error;

/// Failures reported by a query backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Membership filter of {requested} ids exceeds limit of {limit}")]
    MembershipLimit { requested: usize, limit: usize },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Cache error: {0}")]
    Cache(CacheError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Updater failures carrying a backend error surface as that backend error
impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        if let Some(backend) = err.fetch_error::<BackendError>() {
            return AppError::Backend(backend.clone());
        }
        AppError::Cache(err)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
