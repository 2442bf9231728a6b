//! One-shot fetch of a configured source: prints `id  title` per record,
//! newest first. No store, no sinks.
//!
//! Usage: `feed_probe <source-name>` (config resolved like the daemon's).

use anyhow::{anyhow, Context, Result};
use feedwatch::config::WatchConfig;
use feedwatch::notify::render;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let name = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: feed_probe <source-name>"))?;

    let cfg = WatchConfig::load_default().context("loading watch config")?;
    let source = cfg.source(&name).ok_or_else(|| {
        let known: Vec<&str> = cfg.sources.iter().map(|s| s.name.as_str()).collect();
        anyhow!("unknown source `{name}` (configured: {})", known.join(", "))
    })?;

    let fetcher = source.build_fetcher()?;
    let fetched = fetcher
        .fetch()
        .await
        .with_context(|| format!("fetching `{name}`"))?;

    for rec in &fetched.records {
        println!("{}\t{}", rec.id, render::title_of(rec));
    }
    println!(
        "{} records, {} bytes, settled={}",
        fetched.records.len(),
        fetched.raw.len(),
        fetcher.is_settled(&fetched.records)
    );
    Ok(())
}
