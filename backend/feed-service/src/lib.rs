pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::{Config, FeedConfig};
pub use error::{AppError, BackendError, Result};
pub use models::{FeedStats, FeedStatus, Post, UserProfile};

// Re-export feed service components
pub use services::{ChunkManager, FeedAggregator, PostDetails, UserChunk, UserDirectory};
