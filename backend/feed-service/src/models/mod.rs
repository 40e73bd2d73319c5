use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Full post document as returned by a content read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub content: String,
    /// Unix epoch milliseconds
    pub created_at: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// User record served by the user data service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Display name, falling back to the username
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

/// One fetched-but-maybe-not-yet-returned feed item, tagged with the chunk
/// that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedItem {
    pub post: Post,
    pub sort_key: i64,
    pub chunk_index: usize,
}

impl FetchedItem {
    pub fn new(post: Post, chunk_index: usize) -> Self {
        Self {
            sort_key: post.created_at,
            post,
            chunk_index,
        }
    }

    /// Feed order: newest first, ties broken by ascending post id
    pub fn feed_order(a: &Self, b: &Self) -> Ordering {
        b.sort_key
            .cmp(&a.sort_key)
            .then_with(|| a.post.id.cmp(&b.post.id))
    }
}

/// Cumulative work counters for one aggregation session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStats {
    /// Backend range queries issued
    pub fetch_count: u64,
    /// Documents read: query results plus content reads
    pub doc_read_count: u64,
    pub chunks: usize,
    pub users: usize,
}

/// Snapshot handed to the status callback after each page load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    /// Everything visible so far, newest first
    pub posts: Vec<Post>,
    pub is_complete: bool,
    pub page: u32,
    pub stats: FeedStats,
}
