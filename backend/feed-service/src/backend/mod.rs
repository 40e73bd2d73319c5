//! Query backend contract
//!
//! The remote store is opaque: point reads by id, plus a range query filtered
//! by a bounded owner-membership set, ordered by creation time descending,
//! with a limit and a resume-after cursor.

mod memory;

pub use memory::{Fixture, InMemoryBackend};

use crate::error::BackendError;
use crate::models::{Post, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque position marker. Only the backend that issued it can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `WHERE owner IN owner_ids AND deleted == false ORDER BY created_at DESC
/// LIMIT limit [AFTER start_after]`
#[derive(Debug, Clone, PartialEq)]
pub struct PostQuery {
    pub owner_ids: Vec<Uuid>,
    pub limit: usize,
    pub start_after: Option<Cursor>,
}

/// One range-query hit. The full document needs a separate read.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRef {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub created_at: i64,
    pub cursor: Cursor,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub refs: Vec<PostRef>,
}

impl QueryPage {
    /// Cursor of the last hit, for resuming after this page
    pub fn last_cursor(&self) -> Option<&Cursor> {
        self.refs.last().map(|r| &r.cursor)
    }
}

#[async_trait::async_trait]
pub trait PostQueryBackend: Send + Sync + 'static {
    async fn query_posts(&self, query: PostQuery) -> Result<QueryPage, BackendError>;

    /// Point read of a post's full content. A missing post is `None`.
    async fn read_post(&self, post_id: Uuid) -> Result<Option<Post>, BackendError>;
}

/// User data service: point reads of user records
#[async_trait::async_trait]
pub trait UserDataSource: Send + Sync + 'static {
    async fn read_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, BackendError>;
}

#[async_trait::async_trait]
impl<B: PostQueryBackend + ?Sized> PostQueryBackend for Arc<B> {
    async fn query_posts(&self, query: PostQuery) -> Result<QueryPage, BackendError> {
        (**self).query_posts(query).await
    }

    async fn read_post(&self, post_id: Uuid) -> Result<Option<Post>, BackendError> {
        (**self).read_post(post_id).await
    }
}

#[async_trait::async_trait]
impl<S: UserDataSource + ?Sized> UserDataSource for Arc<S> {
    async fn read_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, BackendError> {
        (**self).read_user(user_id).await
    }
}
