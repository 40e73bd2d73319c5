//! Integration Tests: Feed Aggregator
//!
//! Coverage:
//! - Global newest-first ordering across chunks
//! - Membership limit respected by every query
//! - Cumulative pages, completion, and no-op loads after completion
//! - Partial progress kept across query and content-read failures
//! - Loading and status callbacks
//! - Fixture-driven sessions with author lookup

mod common;

use common::{assert_feed_order, config, post, profile, seeded_backend, user_id};
use feed_service::backend::{
    Cursor, Fixture, InMemoryBackend, PostQuery, PostQueryBackend, PostRef, QueryPage,
};
use feed_service::models::Post;
use feed_service::{AppError, BackendError, FeedAggregator, FeedStats, UserDirectory};
use mockall::mock;
use parking_lot::Mutex;
use self_updating_cache::MemoryStore;
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

mock! {
    pub Backend {}

    #[async_trait::async_trait]
    impl PostQueryBackend for Backend {
        async fn query_posts(&self, query: PostQuery) -> Result<QueryPage, BackendError>;
        async fn read_post(&self, post_id: Uuid) -> Result<Option<Post>, BackendError>;
    }
}

fn times(posts: &[Post]) -> Vec<i64> {
    posts.iter().map(|p| p.created_at).collect()
}

// ============================================
// Ordering and paging
// ============================================

#[tokio::test]
async fn test_two_users_page_size_one() {
    let backend = Arc::new(InMemoryBackend::new(10));
    backend.insert_post(post(1, user_id(0), 1_000));
    backend.insert_post(post(2, user_id(1), 2_000));
    backend.insert_post(post(3, user_id(0), 3_000));
    backend.insert_post(post(4, user_id(1), 4_000));

    let mut feed =
        FeedAggregator::new(backend, &[user_id(0), user_id(1)], config(1, 10)).unwrap();

    let expected = [4_000, 3_000, 2_000, 1_000];
    for call in 1..=4 {
        let status = feed.load_next_page().await.unwrap().unwrap();
        assert_eq!(times(&status.posts), expected[..call].to_vec());
        assert_eq!(status.page, call as u32);
        assert!(!status.is_complete);
    }

    // The last full page only proves exhaustion once a short page comes back
    let status = feed.load_next_page().await.unwrap().unwrap();
    assert!(status.is_complete);
    assert_eq!(times(&status.posts), expected.to_vec());
    assert_eq!(status.page, 5);
    assert_eq!(
        status.stats,
        FeedStats {
            fetch_count: 5,
            doc_read_count: 8,
            chunks: 1,
            users: 2,
        }
    );

    assert!(feed.load_next_page().await.unwrap().is_none());
    assert_eq!(feed.page(), 5);
}

#[tokio::test]
async fn test_global_order_across_chunks() {
    let (backend, users) = seeded_backend(25, 4, 10);
    let mut feed = FeedAggregator::new(Arc::clone(&backend), &users, config(7, 10)).unwrap();

    let mut previous: Vec<Post> = Vec::new();
    let mut last = None;
    while let Some(status) = feed.load_next_page().await.unwrap() {
        assert_eq!(&status.posts[..previous.len()], &previous[..]);
        if !status.is_complete {
            assert_eq!(status.posts.len(), status.page as usize * 7);
        }
        previous = status.posts.clone();
        last = Some(status);
    }

    let last = last.unwrap();
    assert!(last.is_complete);
    assert_eq!(last.posts.len(), 100);
    assert_feed_order(&last.posts);
    let unique: HashSet<Uuid> = last.posts.iter().map(|p| p.id).collect();
    assert_eq!(unique.len(), 100);
    assert_eq!(last.stats.chunks, 3);
    assert_eq!(last.stats.users, 25);

    let queries = backend.queries();
    assert!(queries.iter().all(|q| q.owner_ids.len() <= 10));
    assert_eq!(queries.len() as u64, last.stats.fetch_count);
}

#[tokio::test]
async fn test_first_load_fans_out_one_query_per_chunk() {
    let (backend, users) = seeded_backend(25, 1, 10);
    let mut feed = FeedAggregator::new(Arc::clone(&backend), &users, config(5, 10)).unwrap();

    let status = feed.load_next_page().await.unwrap().unwrap();
    assert_eq!(status.posts.len(), 5);
    assert_eq!(status.stats.fetch_count, 3);

    let queries = backend.queries();
    let sizes: Vec<usize> = queries.iter().map(|q| q.owner_ids.len()).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(queries.iter().all(|q| q.limit == 5 && q.start_after.is_none()));
}

#[tokio::test]
async fn test_equal_timestamps_break_ties_by_id() {
    let backend = Arc::new(InMemoryBackend::new(1));
    backend.insert_post(post(9, user_id(0), 5_000));
    backend.insert_post(post(5, user_id(1), 5_000));

    let mut feed =
        FeedAggregator::new(backend, &[user_id(0), user_id(1)], config(1, 1)).unwrap();
    feed.load_next_page().await.unwrap();
    let status = feed.load_next_page().await.unwrap().unwrap();

    let ids: Vec<Uuid> = status.posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![Uuid::from_u128(5), Uuid::from_u128(9)]);
}

#[tokio::test]
async fn test_deleted_posts_never_surface() {
    let (backend, users) = seeded_backend(2, 3, 10);
    backend.delete_post(Uuid::from_u128(6));

    let mut feed = FeedAggregator::new(Arc::clone(&backend), &users, config(10, 10)).unwrap();
    let status = feed.load_next_page().await.unwrap().unwrap();
    assert!(status.is_complete);
    assert_eq!(status.posts.len(), 5);
    assert!(status.posts.iter().all(|p| p.id != Uuid::from_u128(6)));
}

// ============================================
// Session edges
// ============================================

#[tokio::test]
async fn test_empty_user_list_completes_immediately() {
    let backend = Arc::new(InMemoryBackend::new(10));
    let mut feed = FeedAggregator::new(Arc::clone(&backend), &[], config(10, 10)).unwrap();

    let status = feed.load_next_page().await.unwrap().unwrap();
    assert!(status.posts.is_empty());
    assert!(status.is_complete);
    assert_eq!(status.stats, FeedStats::default());
    assert!(backend.queries().is_empty());

    assert!(feed.load_next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_users_are_counted_once() {
    let (backend, _) = seeded_backend(2, 1, 10);
    let users = [user_id(0), user_id(1), user_id(0)];
    let feed = FeedAggregator::new(backend, &users, config(10, 10)).unwrap();

    assert_eq!(feed.stats().users, 2);
    assert_eq!(feed.stats().chunks, 1);
    assert_eq!(feed.chunks()[0].member_ids, vec![user_id(0), user_id(1)]);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let backend = Arc::new(InMemoryBackend::new(10));
    let err = FeedAggregator::new(backend, &[user_id(0)], config(0, 10))
        .err()
        .unwrap();
    assert!(matches!(err, AppError::Config(_)));
}

// ============================================
// Failures and retry
// ============================================

#[tokio::test]
async fn test_failed_query_keeps_sibling_progress() {
    let (backend, users) = seeded_backend(2, 2, 1);
    let mut feed = FeedAggregator::new(Arc::clone(&backend), &users, config(1, 1)).unwrap();

    backend.fail_next_queries(1);
    let err = feed.load_next_page().await.unwrap_err();
    assert!(matches!(err, AppError::Backend(BackendError::Unavailable(_))));
    assert_eq!(feed.page(), 0);
    assert_eq!(feed.stats().fetch_count, 2);
    assert!(feed.status().posts.is_empty());

    let fetched: Vec<usize> = feed.chunks().iter().map(|c| c.fetched_count).collect();
    assert_eq!(fetched.iter().sum::<usize>(), 1);

    // Only the failed chunk is queried again
    let status = feed.load_next_page().await.unwrap().unwrap();
    assert_eq!(status.page, 1);
    assert_eq!(times(&status.posts), vec![4_000]);
    assert_eq!(backend.queries().len(), 3);

    while feed.load_next_page().await.unwrap().is_some() {}
    assert_eq!(times(&feed.status().posts), vec![4_000, 3_000, 2_000, 1_000]);
}

#[tokio::test]
async fn test_failed_content_read_does_not_advance_cursor() {
    let (backend, users) = seeded_backend(1, 3, 10);
    let mut feed = FeedAggregator::new(Arc::clone(&backend), &users, config(2, 10)).unwrap();

    backend.fail_next_reads(1);
    assert_err!(feed.load_next_page().await);
    assert!(feed.chunks()[0].cursor.is_none());
    assert_eq!(feed.chunks()[0].fetched_count, 0);

    let status = feed.load_next_page().await.unwrap().unwrap();
    assert_eq!(times(&status.posts), vec![3_000, 2_000]);
    let queries = backend.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries.iter().all(|q| q.start_after.is_none()));
}

#[tokio::test]
async fn test_permission_denied_surfaces() {
    let mut backend = MockBackend::new();
    backend
        .expect_query_posts()
        .times(1)
        .returning(|_| Err(BackendError::PermissionDenied("posts".into())));
    backend.expect_read_post().never();

    let mut feed = FeedAggregator::new(Arc::new(backend), &[user_id(0)], config(10, 10)).unwrap();
    let err = feed.load_next_page().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Backend(BackendError::PermissionDenied(_))
    ));
    assert!(!feed.is_complete());
}

#[tokio::test]
async fn test_missing_content_is_skipped() {
    let kept = post(1, user_id(0), 2_000);
    let vanished = Uuid::from_u128(2);

    let mut backend = MockBackend::new();
    let hits = vec![
        PostRef {
            id: kept.id,
            owner_id: kept.owner_id,
            created_at: kept.created_at,
            cursor: Cursor::new("c1"),
        },
        PostRef {
            id: vanished,
            owner_id: user_id(0),
            created_at: 1_000,
            cursor: Cursor::new("c2"),
        },
    ];
    backend
        .expect_query_posts()
        .times(2)
        .returning(move |query| match query.start_after {
            None => Ok(QueryPage { refs: hits.clone() }),
            Some(cursor) => {
                assert_eq!(cursor.as_str(), "c2");
                Ok(QueryPage::default())
            }
        });
    let stored = kept.clone();
    backend
        .expect_read_post()
        .times(2)
        .returning(move |id| Ok((id == stored.id).then(|| stored.clone())));

    let mut feed = FeedAggregator::new(Arc::new(backend), &[user_id(0)], config(2, 10)).unwrap();
    let status = feed.load_next_page().await.unwrap().unwrap();

    assert_eq!(status.posts, vec![kept]);
    assert!(status.is_complete);
    assert_eq!(status.stats.fetch_count, 2);
    assert_eq!(status.stats.doc_read_count, 4);
}

#[tokio::test]
async fn test_chunk_with_vanished_hits_is_refetched_before_merge() {
    let hit = |id: u128, owner: Uuid, created_at: i64, cursor: &str| PostRef {
        id: Uuid::from_u128(id),
        owner_id: owner,
        created_at,
        cursor: Cursor::new(cursor),
    };
    let older = post(90, user_id(0), 90);
    let other = post(50, user_id(1), 50);

    let mut backend = MockBackend::new();
    backend.expect_query_posts().returning(move |query| {
        let cursor = query.start_after.as_ref().map(|c| c.as_str().to_string());
        let refs = match (query.owner_ids[0] == user_id(0), cursor.as_deref()) {
            // First hit of this chunk lost its content
            (true, None) => vec![hit(100, user_id(0), 100, "a1")],
            (true, Some("a1")) => vec![hit(90, user_id(0), 90, "a2")],
            (false, None) => vec![hit(50, user_id(1), 50, "b1")],
            _ => vec![],
        };
        Ok(QueryPage { refs })
    });
    let documents = vec![older.clone(), other.clone()];
    backend.expect_read_post().returning(move |id| {
        Ok(documents.iter().find(|p| p.id == id).cloned())
    });

    let mut feed = FeedAggregator::new(
        Arc::new(backend),
        &[user_id(0), user_id(1)],
        config(1, 1),
    )
    .unwrap();

    let first = feed.load_next_page().await.unwrap().unwrap();
    assert_eq!(times(&first.posts), vec![90]);

    while feed.load_next_page().await.unwrap().is_some() {}
    let status = feed.status();
    assert!(status.is_complete);
    assert_eq!(status.posts, vec![older, other]);
    assert_eq!(status.stats.fetch_count, 5);
}

// ============================================
// Callbacks
// ============================================

#[tokio::test]
async fn test_callbacks_fire_around_each_load() {
    let (backend, users) = seeded_backend(1, 1, 10);
    let loading = Arc::new(Mutex::new(Vec::new()));
    let statuses = Arc::new(AtomicUsize::new(0));

    let loading_log = Arc::clone(&loading);
    let status_count = Arc::clone(&statuses);
    let mut feed = FeedAggregator::new(backend, &users, config(5, 10))
        .unwrap()
        .with_loading_callback(move |state| loading_log.lock().push(state))
        .with_status_callback(move |status| {
            assert!(status.is_complete);
            status_count.fetch_add(1, Ordering::SeqCst);
        });

    assert_ok!(feed.load_next_page().await);
    assert_eq!(*loading.lock(), vec![true, false]);
    assert_eq!(statuses.load(Ordering::SeqCst), 1);

    // Complete: nothing fires
    assert!(feed.load_next_page().await.unwrap().is_none());
    assert_eq!(loading.lock().len(), 2);
    assert_eq!(statuses.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_load_skips_status_callback() {
    let (backend, users) = seeded_backend(1, 1, 10);
    let loading = Arc::new(Mutex::new(Vec::new()));
    let statuses = Arc::new(AtomicUsize::new(0));

    let loading_log = Arc::clone(&loading);
    let status_count = Arc::clone(&statuses);
    let mut feed = FeedAggregator::new(Arc::clone(&backend), &users, config(5, 10))
        .unwrap()
        .with_loading_callback(move |state| loading_log.lock().push(state))
        .with_status_callback(move |_| {
            status_count.fetch_add(1, Ordering::SeqCst);
        });

    backend.fail_next_queries(1);
    assert_err!(feed.load_next_page().await);
    assert_eq!(*loading.lock(), vec![true, false]);
    assert_eq!(statuses.load(Ordering::SeqCst), 0);
}

// ============================================
// Fixtures
// ============================================

#[tokio::test]
async fn test_fixture_session_with_authors() {
    let fixture_json = serde_json::json!({
        "users": [
            { "id": user_id(0), "username": "alice", "displayName": "Alice" },
            { "id": user_id(1), "username": "bob" }
        ],
        "posts": [
            { "id": Uuid::from_u128(1), "ownerId": user_id(0), "content": "hi", "createdAt": 1000 },
            { "id": Uuid::from_u128(2), "ownerId": user_id(1), "content": "yo", "createdAt": 2000 },
            { "id": Uuid::from_u128(3), "ownerId": user_id(2), "content": "no", "createdAt": 3000 }
        ],
        "viewerFollows": [user_id(0), user_id(1)]
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", fixture_json).unwrap();

    let fixture = Fixture::load(file.path()).unwrap();
    assert_eq!(fixture.viewer_follows.len(), 2);

    let backend = Arc::new(InMemoryBackend::from_fixture(&fixture, 10));
    let users = UserDirectory::new(
        Arc::clone(&backend),
        MemoryStore::open("users"),
        Duration::from_secs(60),
    );
    let mut feed =
        FeedAggregator::new(Arc::clone(&backend), &fixture.viewer_follows, config(10, 10))
            .unwrap();

    let status = feed.load_next_page().await.unwrap().unwrap();
    assert!(status.is_complete);
    assert_eq!(times(&status.posts), vec![2_000, 1_000]);

    let owners: Vec<Uuid> = status.posts.iter().map(|p| p.owner_id).collect();
    let authors = users.get_users(&owners).await.unwrap();
    assert_eq!(authors[&user_id(0)].label(), "Alice");
    assert_eq!(authors[&user_id(1)].label(), "bob");

    // Second resolution is served from the cache
    users.get_users(&owners).await.unwrap();
    assert_eq!(backend.user_reads(), 2);
    assert_eq!(
        users.require_user(user_id(1)).await.unwrap(),
        profile(1, "bob")
    );
}

#[test]
fn test_fixture_load_rejects_garbage() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();
    assert!(Fixture::load(file.path()).is_err());
}
