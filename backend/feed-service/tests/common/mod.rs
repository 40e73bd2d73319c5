//! Shared fixtures for feed-service integration tests

#![allow(dead_code)]

use feed_service::backend::InMemoryBackend;
use feed_service::config::FeedConfig;
use feed_service::models::{Post, UserProfile};
use std::sync::Arc;
use uuid::Uuid;

pub fn user_id(n: u128) -> Uuid {
    Uuid::from_u128(1_000 + n)
}

pub fn post(id: u128, owner: Uuid, created_at: i64) -> Post {
    Post {
        id: Uuid::from_u128(id),
        owner_id: owner,
        content: format!("post {}", id),
        created_at,
        deleted: false,
        media_urls: vec![],
    }
}

pub fn profile(n: u128, username: &str) -> UserProfile {
    UserProfile {
        id: user_id(n),
        username: username.to_string(),
        display_name: None,
        avatar_url: None,
    }
}

pub fn config(page_size: usize, chunk_size: usize) -> FeedConfig {
    FeedConfig {
        page_size,
        chunk_size,
    }
}

/// `users` authors with `posts_each` posts apiece. Timestamps interleave
/// across authors so every chunk contributes to every stretch of the feed,
/// and are all distinct.
pub fn seeded_backend(
    users: u128,
    posts_each: u128,
    membership_limit: usize,
) -> (Arc<InMemoryBackend>, Vec<Uuid>) {
    let backend = Arc::new(InMemoryBackend::new(membership_limit));
    let ids: Vec<Uuid> = (0..users).map(user_id).collect();
    for k in 0..posts_each {
        for u in 0..users {
            let seq = k * users + u + 1;
            backend.insert_post(post(seq, user_id(u), (seq as i64) * 1_000));
        }
    }
    (backend, ids)
}

/// Strictly newest first
pub fn assert_feed_order(posts: &[Post]) {
    for pair in posts.windows(2) {
        assert!(
            pair[0].created_at > pair[1].created_at
                || (pair[0].created_at == pair[1].created_at && pair[0].id < pair[1].id),
            "out of order: {:?} before {:?}",
            pair[0].id,
            pair[1].id
        );
    }
}
