//! In-process query backend
//!
//! Serves seeded users and posts with the same contract as the remote store,
//! including its membership limit. Every issued query is recorded, and calls
//! can be made to fail on demand.

use super::{Cursor, PostQuery, PostQueryBackend, PostRef, QueryPage, UserDataSource};
use crate::error::BackendError;
use crate::models::{FetchedItem, Post, UserProfile};
use base64::{engine::general_purpose, Engine as _};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

/// Seed data for [`InMemoryBackend`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub posts: Vec<Post>,
    /// Ids the viewing user follows
    #[serde(default)]
    pub viewer_follows: Vec<Uuid>,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Default)]
struct Documents {
    posts: HashMap<Uuid, Post>,
    users: HashMap<Uuid, UserProfile>,
}

pub struct InMemoryBackend {
    membership_limit: usize,
    documents: RwLock<Documents>,
    queries: Mutex<Vec<PostQuery>>,
    fail_queries: AtomicUsize,
    fail_reads: AtomicUsize,
    post_reads: AtomicU64,
    user_reads: AtomicU64,
}

impl InMemoryBackend {
    pub fn new(membership_limit: usize) -> Self {
        Self {
            membership_limit,
            documents: RwLock::new(Documents::default()),
            queries: Mutex::new(Vec::new()),
            fail_queries: AtomicUsize::new(0),
            fail_reads: AtomicUsize::new(0),
            post_reads: AtomicU64::new(0),
            user_reads: AtomicU64::new(0),
        }
    }

    pub fn from_fixture(fixture: &Fixture, membership_limit: usize) -> Self {
        let backend = Self::new(membership_limit);
        for user in &fixture.users {
            backend.insert_user(user.clone());
        }
        for post in &fixture.posts {
            backend.insert_post(post.clone());
        }
        backend
    }

    pub fn membership_limit(&self) -> usize {
        self.membership_limit
    }

    pub fn insert_post(&self, post: Post) {
        self.documents.write().posts.insert(post.id, post);
    }

    pub fn insert_user(&self, user: UserProfile) {
        self.documents.write().users.insert(user.id, user);
    }

    /// Soft delete, as the remote store does
    pub fn delete_post(&self, post_id: Uuid) -> bool {
        match self.documents.write().posts.get_mut(&post_id) {
            Some(post) => {
                post.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Drop a post entirely so content reads come back empty
    pub fn purge_post(&self, post_id: Uuid) -> Option<Post> {
        self.documents.write().posts.remove(&post_id)
    }

    /// Every range query issued so far, in order
    pub fn queries(&self) -> Vec<PostQuery> {
        self.queries.lock().clone()
    }

    pub fn post_reads(&self) -> u64 {
        self.post_reads.load(Ordering::SeqCst)
    }

    pub fn user_reads(&self) -> u64 {
        self.user_reads.load(Ordering::SeqCst)
    }

    /// Make the next `n` range queries fail with `Unavailable`
    pub fn fail_next_queries(&self, n: usize) {
        self.fail_queries.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` point reads fail with `Unavailable`
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn encode_cursor(created_at: i64, post_id: Uuid) -> Cursor {
        Cursor::new(general_purpose::STANDARD.encode(format!("{}:{}", created_at, post_id)))
    }

    fn decode_cursor(cursor: &Cursor) -> Result<(i64, Uuid), BackendError> {
        let invalid = || BackendError::InvalidCursor(cursor.as_str().to_string());
        let decoded = general_purpose::STANDARD
            .decode(cursor.as_str())
            .map_err(|_| invalid())?;
        let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
        let (ts, id) = decoded.split_once(':').ok_or_else(invalid)?;
        Ok((
            ts.parse::<i64>().map_err(|_| invalid())?,
            Uuid::parse_str(id).map_err(|_| invalid())?,
        ))
    }
}

#[async_trait::async_trait]
impl PostQueryBackend for InMemoryBackend {
    async fn query_posts(&self, query: PostQuery) -> Result<QueryPage, BackendError> {
        if query.owner_ids.len() > self.membership_limit {
            return Err(BackendError::MembershipLimit {
                requested: query.owner_ids.len(),
                limit: self.membership_limit,
            });
        }
        self.queries.lock().push(query.clone());
        if Self::take_failure(&self.fail_queries) {
            return Err(BackendError::Unavailable("injected query failure".into()));
        }

        let after = query
            .start_after
            .as_ref()
            .map(Self::decode_cursor)
            .transpose()?;
        let owners: HashSet<Uuid> = query.owner_ids.iter().copied().collect();

        let mut matching: Vec<FetchedItem> = self
            .documents
            .read()
            .posts
            .values()
            .filter(|p| !p.deleted && owners.contains(&p.owner_id))
            .map(|p| FetchedItem::new(p.clone(), 0))
            .collect();
        matching.sort_by(FetchedItem::feed_order);

        let refs: Vec<PostRef> = matching
            .into_iter()
            .map(|item| item.post)
            .filter(|p| match after {
                Some((ts, id)) => p.created_at < ts || (p.created_at == ts && p.id > id),
                None => true,
            })
            .take(query.limit)
            .map(|p| PostRef {
                id: p.id,
                owner_id: p.owner_id,
                created_at: p.created_at,
                cursor: Self::encode_cursor(p.created_at, p.id),
            })
            .collect();

        debug!(
            owners = query.owner_ids.len(),
            limit = query.limit,
            hits = refs.len(),
            "In-memory range query"
        );
        Ok(QueryPage { refs })
    }

    async fn read_post(&self, post_id: Uuid) -> Result<Option<Post>, BackendError> {
        if Self::take_failure(&self.fail_reads) {
            return Err(BackendError::Unavailable("injected read failure".into()));
        }
        self.post_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.read().posts.get(&post_id).cloned())
    }
}

#[async_trait::async_trait]
impl UserDataSource for InMemoryBackend {
    async fn read_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, BackendError> {
        if Self::take_failure(&self.fail_reads) {
            return Err(BackendError::Unavailable("injected read failure".into()));
        }
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.read().users.get(&user_id).cloned())
    }
}
