// src/ingest/providers/mod.rs
pub mod json;
pub mod rss;

use reqwest::Client;

use crate::error::FetchError;
use crate::ingest::http::HttpSource;

pub use json::JsonFetcher;
pub use rss::RssFetcher;

/// Where a provider gets its body from.
pub(crate) enum Mode {
    // Owned copy so tests can hand in non-'static strings.
    Fixture(String),
    Http { source: HttpSource, client: Client },
}

impl Mode {
    pub(crate) fn http(source: HttpSource) -> reqwest::Result<Self> {
        let client = source.build_client()?;
        Ok(Self::Http { source, client })
    }

    pub(crate) fn cache_resource(&self) -> String {
        match self {
            Mode::Fixture(_) => "raw".to_string(),
            Mode::Http { source, .. } => source.cache_resource(),
        }
    }

    pub(crate) async fn raw(&self, provider: &str) -> Result<String, FetchError> {
        match self {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { source, client } => source.get_text(client).await.inspect_err(|e| {
                tracing::debug!(
                    target: "feedwatch::ingest",
                    provider,
                    url = %source.url(),
                    error = %e,
                    "provider http error"
                );
            }),
        }
    }
}
