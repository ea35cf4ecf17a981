use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use mention_curator::config::{AppConfig, RuntimeConfig};
use mention_curator::distribution::{DistributionService, PluginCatalog, PluginRegistry};
use mention_curator::feed::{FeedClient, HttpFeedClient};
use mention_curator::pipeline::{
    AdminCache, MentionIngestor, MentionPoller, SubmissionProcessor, spawn_poller,
};
use mention_curator::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let runtime = RuntimeConfig::from_env();

    let config = AppConfig::load(&runtime.config_path).unwrap_or_else(|e| {
        eprintln!(
            "Error: invalid configuration at {}: {}",
            runtime.config_path.display(),
            e
        );
        eprintln!("  export CURATOR_CONFIG=./curator.config.json");
        std::process::exit(1);
    });
    let config = Arc::new(config);
    let interval_secs = runtime
        .poll_interval_secs
        .unwrap_or(config.global.poll_interval_secs)
        .max(1);

    eprintln!("📰 Mention Curator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bot: @{}", config.global.bot_handle.trim_start_matches('@'));
    eprintln!("   Feeds: {}", config.feeds.len());
    eprintln!("   Feed API: {}", runtime.feed_api_url);
    eprintln!("   Poll interval: {}s", interval_secs);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&runtime.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", runtime.db_path.display()))?,
    );
    eprintln!("   Database: {}", runtime.db_path.display());

    // ── Feed client ──────────────────────────────────────────────────────
    let client: Arc<dyn FeedClient> = Arc::new(HttpFeedClient::new(
        runtime.feed_api_url.clone(),
        runtime.feed_api_token.clone(),
    ));
    client.login().await.context("feed login failed")?;

    // ── Plugins ──────────────────────────────────────────────────────────
    let registry = Arc::new(
        PluginRegistry::load(&config.plugins, &PluginCatalog::with_builtins())
            .context("plugin configuration is invalid")?,
    );
    eprintln!("   Plugins: {}", registry.list().join(", "));

    // ── Pipeline ─────────────────────────────────────────────────────────
    let admins = AdminCache::build(client.as_ref(), &config.feeds).await;
    if admins.is_empty() {
        warn!("No approver resolved; moderation replies will be ignored");
    }

    let distribution = Arc::new(DistributionService::new(
        Arc::clone(&config),
        Arc::clone(&registry),
        Arc::clone(&db),
    ));

    let processor = Arc::new(
        SubmissionProcessor::new(
            Arc::clone(&config),
            Arc::clone(&db),
            Arc::clone(&client),
            admins,
            distribution,
        )
        .context("invalid submission marker")?,
    );
    processor.sync_feeds().await.context("failed to sync feeds")?;

    let ingestor = MentionIngestor::new(
        Arc::clone(&client),
        MentionIngestor::mentions_query(&config.global.bot_handle),
        config.global.page_size,
        config.global.max_pages,
    );
    let poller = Arc::new(MentionPoller::new(ingestor, processor, Arc::clone(&db)));

    match poller.cursor().await {
        Ok(Some(cursor)) => eprintln!("   Resuming after item {}", cursor),
        Ok(None) => eprintln!("   No cursor stored; fetching recent mentions"),
        Err(e) => warn!("Could not read cursor: {e}"),
    }

    let handle = spawn_poller(poller, Duration::from_secs(interval_secs));

    // ── Shutdown ─────────────────────────────────────────────────────────
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down");

    handle.stop().await;
    registry.shutdown_all().await;
    if let Err(e) = client.logout().await {
        warn!("Feed logout failed: {e}");
    }

    Ok(())
}
