//! User profiles served through the self-updating cache
//!
//! Absent users are cached as `None` so repeated lookups of a deleted
//! account do not hit the user data service until the entry goes stale.

use crate::backend::UserDataSource;
use crate::error::{AppError, BackendError, Result};
use crate::models::UserProfile;
use async_trait::async_trait;
use futures::future::try_join_all;
use self_updating_cache::{CacheEntry, CacheKey, Fetcher, PersistedStore, SelfUpdatingCache};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

struct UserFetcher<S> {
    source: Arc<S>,
}

#[async_trait]
impl<S: UserDataSource> Fetcher for UserFetcher<S> {
    type Args = Uuid;
    type Output = Option<UserProfile>;
    type Error = BackendError;

    async fn fetch(&self, user_id: Uuid) -> std::result::Result<Option<UserProfile>, BackendError> {
        debug!(user_id = %user_id, "Reading user from source");
        self.source.read_user(user_id).await
    }
}

/// User lookup
pub struct UserDirectory<S: UserDataSource> {
    cache: SelfUpdatingCache<UserFetcher<S>>,
    max_age: Duration,
}

impl<S: UserDataSource> Clone for UserDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            max_age: self.max_age,
        }
    }
}

impl<S: UserDataSource> UserDirectory<S> {
    /// `max_age` is the default freshness bound for [`get_user`](Self::get_user)
    pub fn new(source: Arc<S>, store: impl PersistedStore, max_age: Duration) -> Self {
        Self {
            cache: SelfUpdatingCache::new(store, UserFetcher { source }),
            max_age,
        }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.get_user_with_max_age(user_id, self.max_age).await
    }

    pub async fn get_user_with_max_age(
        &self,
        user_id: Uuid,
        max_age: Duration,
    ) -> Result<Option<UserProfile>> {
        let entry = self
            .cache
            .get(&CacheKey::user(user_id), max_age, user_id)
            .await?;
        Ok(entry.data)
    }

    /// Like [`get_user`](Self::get_user) but an unknown user is an error
    pub async fn require_user(&self, user_id: Uuid) -> Result<UserProfile> {
        self.get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    /// Record a profile the caller already has, e.g. after a local edit
    pub async fn set_user(&self, profile: UserProfile) -> Result<CacheEntry<Option<UserProfile>>> {
        let key = CacheKey::user(profile.id);
        Ok(self.cache.set(&key, Some(profile)).await?)
    }

    /// Batch lookup. Unknown users are left out of the map.
    pub async fn get_users(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let profiles = try_join_all(user_ids.iter().map(|&id| self.get_user(id))).await?;
        Ok(profiles
            .into_iter()
            .flatten()
            .map(|profile| (profile.id, profile))
            .collect())
    }

    /// Bypass freshness and read through to the source
    pub async fn refresh(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.get_user_with_max_age(user_id, Duration::ZERO).await
    }

    /// Every cached profile, skipping cached absences
    pub async fn cached_users(&self) -> Result<Vec<UserProfile>> {
        let entries = self.cache.get_all().await?;
        Ok(entries.into_iter().filter_map(|entry| entry.data).collect())
    }

    pub async fn clear(&self) -> Result<()> {
        self.cache.clear().await.map_err(AppError::from)
    }
}
