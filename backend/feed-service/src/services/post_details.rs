//! Post detail reads through the self-updating cache

use crate::backend::PostQueryBackend;
use crate::error::{AppError, BackendError, Result};
use crate::models::Post;
use async_trait::async_trait;
use self_updating_cache::{CacheKey, Fetcher, PersistedStore, SelfUpdatingCache};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct PostFetcher<B> {
    backend: Arc<B>,
}

#[async_trait]
impl<B: PostQueryBackend> Fetcher for PostFetcher<B> {
    type Args = Uuid;
    type Output = Option<Post>;
    type Error = BackendError;

    async fn fetch(&self, post_id: Uuid) -> std::result::Result<Option<Post>, BackendError> {
        let post = self.backend.read_post(post_id).await?;
        Ok(post.filter(|p| !p.deleted))
    }
}

pub struct PostDetails<B: PostQueryBackend> {
    cache: SelfUpdatingCache<PostFetcher<B>>,
}

impl<B: PostQueryBackend> PostDetails<B> {
    pub fn new(backend: Arc<B>, store: impl PersistedStore) -> Self {
        Self {
            cache: SelfUpdatingCache::new(store, PostFetcher { backend }),
        }
    }

    /// Soft-deleted posts read as `None`
    pub async fn get_post(&self, post_id: Uuid, max_age: Duration) -> Result<Option<Post>> {
        let entry = self
            .cache
            .get(&CacheKey::post(post_id), max_age, post_id)
            .await?;
        Ok(entry.data)
    }

    pub async fn require_post(&self, post_id: Uuid, max_age: Duration) -> Result<Post> {
        self.get_post(post_id, max_age)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))
    }

    /// Seed the cache with content the caller already holds
    pub async fn set_post(&self, post: Post) -> Result<()> {
        let key = CacheKey::post(post.id);
        self.cache.set(&key, Some(post)).await?;
        Ok(())
    }
}
