//! Relay entrypoint: load config, authenticate both ends, then poll until a
//! shutdown signal arrives.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use discord_x_notifier::config::AppConfig;
use discord_x_notifier::engine::PollEngine;
use discord_x_notifier::metrics::Metrics;
use discord_x_notifier::notify::{DiscordNotifier, NotificationSink};
use discord_x_notifier::scheduler::{shutdown_signal, Runner};
use discord_x_notifier::source::{SourceAdapter, XSource};
use discord_x_notifier::state::WatermarkStore;

/// `LOG_FORMAT=json` switches to JSON lines; compact text otherwise.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("discord_x_notifier=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables take precedence.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        handles = ?cfg.handles,
        single_handle = ?cfg.single_handle,
        "configuration loaded"
    );

    if let Some(addr) = cfg.metrics_addr {
        let metrics = Metrics::init().context("failed to install metrics recorder")?;
        metrics.serve(addr).await.context("failed to bind metrics endpoint")?;
    }

    let source = XSource::new(cfg.policy.fetch_count).context("failed to build x client")?;
    source
        .authenticate(&cfg.credentials)
        .await
        .context("x authentication failed, re-export cookies")?;
    let source: Arc<dyn SourceAdapter> = Arc::new(source);

    let sink = DiscordNotifier::new(&cfg.discord.bot_token, &cfg.discord.channel_id)
        .connect(&cfg.discord.guild_id)
        .await
        .context("discord setup failed")?;
    let sink: Arc<dyn NotificationSink> = Arc::new(sink);

    let store = WatermarkStore::load(&cfg.store_scope());
    tracing::info!(
        path = %store.path().display(),
        entries = store.entries().len(),
        "watermarks loaded"
    );

    let engine = PollEngine::new(source, sink, store, &cfg.policy);
    let runner = Runner::new(engine, cfg.handles.clone(), &cfg.policy);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    runner.run(shutdown).await;
    tracing::info!("stopped");
    Ok(())
}
