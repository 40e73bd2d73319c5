//! Updater abstraction invoked when an entry is missing or stale

use std::error::Error as StdError;
use std::future::Future;
use std::marker::PhantomData;

/// Produces a fresh value for a cache key.
///
/// `Args` are whatever the caller needs to pass through `get` to compute the
/// value (an id, a request struct, ...).
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Args: Send + 'static;
    type Output: Send + 'static;
    type Error: StdError + Send + Sync + 'static;

    async fn fetch(&self, args: Self::Args) -> Result<Self::Output, Self::Error>;
}

/// Closure-backed [`Fetcher`]
pub struct FnFetcher<F, A, T, E> {
    f: F,
    _marker: PhantomData<fn(A) -> Result<T, E>>,
}

/// Wrap an async closure as a [`Fetcher`]
pub fn fetcher_fn<F, Fut, A, T, E>(f: F) -> FnFetcher<F, A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    FnFetcher {
        f,
        _marker: PhantomData,
    }
}

#[async_trait::async_trait]
impl<F, Fut, A, T, E> Fetcher for FnFetcher<F, A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    type Args = A;
    type Output = T;
    type Error = E;

    async fn fetch(&self, args: A) -> Result<T, E> {
        (self.f)(args).await
    }
}
