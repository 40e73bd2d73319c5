//! Multi-source chunked feed aggregation
//!
//! The backend can only filter by membership in a small id set, so the
//! followed users are split into chunks and each chunk is paged separately.
//! Results are merged into one buffer ordered newest first, and an item is
//! only handed out once every chunk that could still produce something newer
//! has at least one unreturned item buffered. That keeps the concatenation of
//! all pages globally ordered even though each query is only sorted locally.

use crate::backend::{PostQuery, PostQueryBackend, QueryPage};
use crate::config::FeedConfig;
use crate::error::{AppError, BackendError, Result};
use crate::metrics;
use crate::models::{FeedStats, FeedStatus, FetchedItem, Post};
use crate::services::chunks::{ChunkManager, UserChunk};
use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type StatusCallback = Box<dyn Fn(&FeedStatus) + Send + Sync>;
pub type LoadingCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Result of one chunk query plus its content reads
struct ChunkFetch {
    page: QueryPage,
    posts: Vec<Post>,
    content_reads: usize,
}

/// Aggregation session for one feed view
pub struct FeedAggregator<B: PostQueryBackend> {
    backend: Arc<B>,
    config: FeedConfig,
    chunks: Vec<UserChunk>,
    /// Everything fetched so far. `buffer[..returned]` has been handed out and
    /// never moves; the tail is kept in feed order.
    buffer: Vec<FetchedItem>,
    returned: usize,
    page: u32,
    is_complete: bool,
    stats: FeedStats,
    on_status: Option<StatusCallback>,
    on_loading: Option<LoadingCallback>,
}

impl<B: PostQueryBackend> FeedAggregator<B> {
    /// Chunks are fixed for the lifetime of the aggregator. Build a new one
    /// when the followed set changes.
    pub fn new(backend: Arc<B>, user_ids: &[Uuid], config: FeedConfig) -> Result<Self> {
        config.validate().map_err(AppError::Config)?;
        let chunks = ChunkManager::partition(user_ids, config.chunk_size)?;
        let stats = FeedStats {
            chunks: chunks.len(),
            users: chunks.iter().map(|c| c.member_ids.len()).sum(),
            ..FeedStats::default()
        };

        debug!(
            users = stats.users,
            chunks = stats.chunks,
            page_size = config.page_size,
            "Feed aggregator created"
        );

        Ok(Self {
            backend,
            config,
            chunks,
            buffer: Vec::new(),
            returned: 0,
            page: 0,
            is_complete: false,
            stats,
            on_status: None,
            on_loading: None,
        })
    }

    /// Called with the visible feed after every successful page load
    pub fn with_status_callback(mut self, callback: impl Fn(&FeedStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Box::new(callback));
        self
    }

    /// Called with `true` before and `false` after every page load
    pub fn with_loading_callback(mut self, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_loading = Some(Box::new(callback));
        self
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Pages loaded successfully so far
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn chunks(&self) -> &[UserChunk] {
        &self.chunks
    }

    /// Visible feed: every item returned so far, newest first
    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            posts: self.buffer[..self.returned]
                .iter()
                .map(|item| item.post.clone())
                .collect(),
            is_complete: self.is_complete,
            page: self.page,
            stats: self.stats,
        }
    }

    /// Extend the visible feed by one page.
    ///
    /// Returns `None` without touching the backend or the callbacks once the
    /// feed is complete. On error, whatever was merged before the failure is
    /// kept and the page counter does not move, so calling again resumes the
    /// same page.
    pub async fn load_next_page(&mut self) -> Result<Option<FeedStatus>> {
        if self.is_complete {
            debug!(page = self.page, "Feed already complete, ignoring load");
            return Ok(None);
        }

        let started = Instant::now();
        self.notify_loading(true);
        let result = self.fill_page(self.page + 1).await;
        self.notify_loading(false);

        if let Err(e) = result {
            warn!(page = self.page + 1, error = %e, "Feed page load failed");
            metrics::record_page_load("error", started.elapsed());
            return Err(e);
        }

        self.page += 1;
        metrics::record_page_load("success", started.elapsed());
        if self.is_complete {
            metrics::record_feed_completed();
        }

        let status = self.status();
        info!(
            page = status.page,
            visible = status.posts.len(),
            complete = status.is_complete,
            fetch_count = status.stats.fetch_count,
            doc_read_count = status.stats.doc_read_count,
            "Feed page loaded"
        );
        if let Some(callback) = &self.on_status {
            callback(&status);
        }
        Ok(Some(status))
    }

    fn notify_loading(&self, loading: bool) {
        if let Some(callback) = &self.on_loading {
            callback(loading);
        }
    }

    async fn fill_page(&mut self, page: u32) -> Result<()> {
        let target = page as usize * self.config.page_size;

        while self.returned < target && !self.is_complete {
            // A chunk whose hits all lost their content has nothing buffered
            // yet may still hold newer items than the buffer head
            while self.chunks.iter().any(UserChunk::needs_fetch) {
                self.fetch_pending_chunks().await?;
            }
            self.advance();
            self.is_complete = self.chunks.iter().all(UserChunk::is_done);
        }
        Ok(())
    }

    /// Query every chunk that has handed out everything it fetched and may
    /// still have more upstream, in parallel.
    async fn fetch_pending_chunks(&mut self) -> Result<()> {
        let pending: Vec<usize> = self
            .chunks
            .iter()
            .filter(|chunk| chunk.needs_fetch())
            .map(|chunk| chunk.chunk_index)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let fetches: Vec<_> = pending
            .iter()
            .map(|&idx| {
                let chunk = &self.chunks[idx];
                let query = PostQuery {
                    owner_ids: chunk.member_ids.clone(),
                    limit: self.config.page_size,
                    start_after: chunk.cursor.clone(),
                };
                Self::fetch_chunk(Arc::clone(&self.backend), query)
            })
            .collect();
        self.stats.fetch_count += pending.len() as u64;
        debug!(chunks = ?pending, "Fetching chunks");

        let results = join_all(fetches).await;

        let mut first_error: Option<BackendError> = None;
        for (idx, result) in pending.into_iter().zip(results) {
            match result {
                Ok(fetch) => {
                    metrics::record_backend_query("success");
                    self.merge_chunk(idx, fetch);
                }
                Err(e) => {
                    metrics::record_backend_query("error");
                    warn!(chunk = idx, error = %e, "Chunk fetch failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.buffer[self.returned..].sort_by(FetchedItem::feed_order);

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn fetch_chunk(backend: Arc<B>, query: PostQuery) -> std::result::Result<ChunkFetch, BackendError> {
        let page = backend.query_posts(query).await?;
        let documents = try_join_all(page.refs.iter().map(|r| backend.read_post(r.id))).await?;
        let content_reads = documents.len();

        let posts = page
            .refs
            .iter()
            .zip(documents)
            .filter_map(|(r, doc)| match doc {
                Some(post) if !post.deleted => Some(post),
                _ => {
                    debug!(post_id = %r.id, "Post content missing, skipping");
                    None
                }
            })
            .collect();

        Ok(ChunkFetch {
            page,
            posts,
            content_reads,
        })
    }

    fn merge_chunk(&mut self, idx: usize, fetch: ChunkFetch) {
        let hits = fetch.page.refs.len();
        let reads = (hits + fetch.content_reads) as u64;
        self.stats.doc_read_count += reads;
        metrics::record_doc_reads(reads);

        let chunk = &mut self.chunks[idx];
        chunk.is_exhausted = hits < self.config.page_size;
        if let Some(cursor) = fetch.page.last_cursor() {
            chunk.cursor = Some(cursor.clone());
        }
        chunk.fetched_count += fetch.posts.len();

        debug!(
            chunk = idx,
            hits,
            kept = fetch.posts.len(),
            exhausted = chunk.is_exhausted,
            "Chunk merged"
        );

        self.buffer
            .extend(fetch.posts.into_iter().map(|post| FetchedItem::new(post, idx)));
    }

    /// Hand out the newest unreturned item, if any
    fn advance(&mut self) {
        let Some(item) = self.buffer.get(self.returned) else {
            return;
        };
        let chunk = &mut self.chunks[item.chunk_index];
        chunk.returned_count += 1;
        self.returned += 1;

        if chunk.is_done() {
            debug!(chunk = chunk.chunk_index, "Chunk finished");
        } else if chunk.needs_fetch() {
            debug!(chunk = chunk.chunk_index, "Chunk drained, refetching next round");
        }
    }
}
