//! Cache key schema
//!
//! Key format: v{VERSION}:{entity}:{identifier}

use uuid::Uuid;

/// Cache schema version - increment when changing key formats or entry layout
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Persisted table backing one cache instance
    /// Format: v1:cache:{cache_name}
    pub fn store(cache_name: &str) -> String {
        format!("v{}:cache:{}", CACHE_VERSION, cache_name)
    }

    /// User profile entry
    /// Format: v1:user:{user_id}
    pub fn user(user_id: Uuid) -> String {
        format!("v{}:user:{}", CACHE_VERSION, user_id)
    }

    /// Post content entry
    /// Format: v1:post:{post_id}
    pub fn post(post_id: Uuid) -> String {
        format!("v{}:post:{}", CACHE_VERSION, post_id)
    }
}
