use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use feed_service::backend::{Fixture, InMemoryBackend};
use feed_service::config::Config;
use feed_service::{FeedAggregator, PostDetails, UserDirectory};
use self_updating_cache::{MemoryStore, PersistedStore, RedisStore};

async fn open_store(config: &Config, cache: &str) -> anyhow::Result<Box<dyn PersistedStore>> {
    let name = config.cache.table(cache);
    match &config.cache.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url, &name)
                .await
                .with_context(|| format!("connecting cache {} to Redis", name))?;
            Ok(Box::new(store))
        }
        None => Ok(Box::new(MemoryStore::open(&name))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.app.log_level.clone().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_line_number(true)
                .with_target(true),
        )
        .init();

    info!("Starting feed-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let fixture = match &config.app.fixture_path {
        Some(path) => Fixture::load(path).with_context(|| format!("loading fixture {}", path))?,
        None => {
            warn!("FEED_FIXTURE_PATH not set, serving an empty feed");
            Fixture::default()
        }
    };
    info!(
        users = fixture.users.len(),
        posts = fixture.posts.len(),
        follows = fixture.viewer_follows.len(),
        "Fixture loaded"
    );

    let backend = Arc::new(InMemoryBackend::from_fixture(
        &fixture,
        config.feed.chunk_size,
    ));
    info!(
        membership_limit = backend.membership_limit(),
        page_size = config.feed.page_size,
        "Query backend ready"
    );
    let users = UserDirectory::new(
        Arc::clone(&backend),
        open_store(&config, "users").await?,
        config.cache.user_max_age(),
    );
    let posts = PostDetails::new(Arc::clone(&backend), open_store(&config, "posts").await?);

    let mut feed = FeedAggregator::new(Arc::clone(&backend), &fixture.viewer_follows, config.feed)?
        .with_loading_callback(|loading| tracing::debug!(loading, "Feed loading state"));

    while let Some(status) = feed.load_next_page().await? {
        let owners: Vec<Uuid> = status.posts.iter().map(|p| p.owner_id).collect();
        let authors = users.get_users(&owners).await?;

        let start = (status.page as usize - 1) * config.feed.page_size;
        for post in status.posts.iter().skip(start) {
            let author = authors
                .get(&post.owner_id)
                .map(|u| u.label().to_string())
                .unwrap_or_else(|| post.owner_id.to_string());
            info!(
                page = status.page,
                post_id = %post.id,
                author = %author,
                created_at = post.created_at,
                "Feed item"
            );
            // Warm detail views for what the reader can now open
            posts.set_post(post.clone()).await?;
        }
    }

    let visible = feed.status();
    if let Some(newest) = visible.posts.first() {
        let detail = posts
            .require_post(newest.id, config.cache.post_max_age())
            .await?;
        info!(post_id = %detail.id, media = detail.media_urls.len(), "Newest post detail");
    }

    let stats = feed.stats();
    info!(
        pages = feed.page(),
        fetch_count = stats.fetch_count,
        doc_read_count = stats.doc_read_count,
        chunks = stats.chunks,
        users = stats.users,
        "Feed complete"
    );
    Ok(())
}
