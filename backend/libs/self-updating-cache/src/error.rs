//! Cache error types

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the cache.
///
/// Cloneable so a single in-flight lookup can hand the same failure to every
/// caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(Arc<redis::RedisError>),

    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// The updater rejected; the original error is kept intact.
    #[error("Updater failed: {0}")]
    Fetch(Arc<dyn StdError + Send + Sync>),

    #[error("Background write failed: {0}")]
    Task(Arc<tokio::task::JoinError>),
}

impl CacheError {
    pub fn fetch<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CacheError::Fetch(Arc::new(err))
    }

    /// Borrow the updater's own error if this is a `Fetch` failure of type `E`.
    pub fn fetch_error<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            CacheError::Fetch(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Redis(Arc::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(Arc::new(err))
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(Arc::new(err))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
