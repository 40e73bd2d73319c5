//! Service layer for feed-service
//!
//! Active modules:
//! - chunks: Partitioning of followed users into membership-limited chunks
//! - aggregator: Chunked, globally ordered feed paging
//! - users: User profiles through the self-updating cache
//! - post_details: Post content through the self-updating cache

pub mod aggregator;
pub mod chunks;
pub mod post_details;
pub mod users;

pub use aggregator::{FeedAggregator, LoadingCallback, StatusCallback};
pub use chunks::{ChunkManager, UserChunk};
pub use post_details::PostDetails;
pub use users::UserDirectory;
