use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub feed: FeedConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// JSON fixture seeding the in-memory backend
    pub fixture_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Items per page, also the per-query limit
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Backend membership-filter limit
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("FEED_PAGE_SIZE must be at least 1".to_string());
        }
        if self.chunk_size == 0 {
            return Err("FEED_CHUNK_SIZE must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persist caches in Redis when set, otherwise in process memory
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_max_age_secs")]
    pub user_max_age_secs: u64,
    #[serde(default = "default_max_age_secs")]
    pub post_max_age_secs: u64,
}

impl CacheConfig {
    pub fn user_max_age(&self) -> Duration {
        Duration::from_secs(self.user_max_age_secs)
    }

    pub fn post_max_age(&self) -> Duration {
        Duration::from_secs(self.post_max_age_secs)
    }

    /// Table name for one cache, e.g. `feedline-users`
    pub fn table(&self, cache: &str) -> String {
        format!("{}-{}", self.name_prefix, cache)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let feed = FeedConfig {
            page_size: std::env::var("FEED_PAGE_SIZE")
                .unwrap_or_else(|_| default_page_size().to_string())
                .parse()?,
            chunk_size: std::env::var("FEED_CHUNK_SIZE")
                .unwrap_or_else(|_| default_chunk_size().to_string())
                .parse()?,
        };
        feed.validate()?;

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                fixture_path: std::env::var("FEED_FIXTURE_PATH").ok(),
            },
            feed,
            cache: CacheConfig {
                redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
                name_prefix: std::env::var("CACHE_NAME_PREFIX")
                    .unwrap_or_else(|_| default_cache_name_prefix()),
                user_max_age_secs: std::env::var("USER_CACHE_MAX_AGE_SECS")
                    .unwrap_or_else(|_| default_max_age_secs().to_string())
                    .parse()?,
                post_max_age_secs: std::env::var("POST_CACHE_MAX_AGE_SECS")
                    .unwrap_or_else(|_| default_max_age_secs().to_string())
                    .parse()?,
            },
        })
    }
}

fn default_page_size() -> usize {
    10
}

// Document-store `in` filters commonly cap membership at 10 values
fn default_chunk_size() -> usize {
    10
}

fn default_cache_name_prefix() -> String {
    "feedline".to_string()
}

fn default_max_age_secs() -> u64 {
    3600
}
