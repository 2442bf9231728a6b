//! feedwatch daemon: polls the configured sources and serves the status API.
//!
//! Config comes from `FEEDWATCH_CONFIG` / `config/feedwatch.toml`; sinks and the
//! store are picked from env (see `.env.example`).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedwatch::cache::{CacheStore, MemoryStore};
use feedwatch::config::WatchConfig;
use feedwatch::metrics::Metrics;
use feedwatch::notify::NotifierMux;
use feedwatch::scheduler::{PollScheduler, ReadySignal, WatchContext};

/// Compact logs by default; JSON lines with FEEDWATCH_LOG_JSON=1.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feedwatch=info,warn"));

    let json = std::env::var("FEEDWATCH_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn open_store() -> Result<Arc<dyn CacheStore>> {
    #[cfg(feature = "redis")]
    {
        if let Ok(url) = std::env::var("REDIS_URL") {
            let store = feedwatch::cache::RedisStore::open(&url).context("opening REDIS_URL")?;
            tracing::info!("using redis store");
            return Ok(Arc::new(store));
        }
    }
    #[cfg(not(feature = "redis"))]
    {
        if std::env::var("REDIS_URL").is_ok() {
            tracing::warn!("REDIS_URL set but built without the `redis` feature; using memory");
        }
    }

    tracing::info!("using in-memory store");
    Ok(Arc::new(MemoryStore::new()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = WatchConfig::load_default().context("loading watch config")?;
    let metrics = Metrics::init().context("installing metrics recorder")?;

    let ready = ReadySignal::new();
    let ctx = WatchContext {
        store: open_store()?,
        notifier: Arc::new(NotifierMux::from_env()),
        ready: ready.clone(),
    };
    tracing::info!(
        sources = cfg.sources.len(),
        sinks = ?ctx.notifier.names(),
        "starting feedwatch"
    );

    let schedulers = cfg.build_schedulers(&ctx)?;
    let app = feedwatch::create_router(schedulers.clone()).merge(metrics.router());
    let handles: Vec<_> = schedulers.into_iter().map(PollScheduler::start).collect();

    let addr = cfg.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "status api listening");

    ready.mark_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving status api")?;

    for h in handles {
        h.shutdown().await;
    }
    tracing::info!("feedwatch stopped");
    Ok(())
}
