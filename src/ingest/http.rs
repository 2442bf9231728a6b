// src/ingest/http.rs
use std::time::{Duration, Instant};

use metrics::histogram;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client, Url};
use sha2::{Digest, Sha256};

use crate::error::FetchError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: usize = 10;
const USER_AGENT: &str = concat!("feedwatch/", env!("CARGO_PKG_VERSION"));

/// Where and how to fetch a remote document.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: Url,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    timeout: Duration,
    follow_redirects: bool,
}

impl HttpSource {
    /// `url` must be an absolute http(s) URL.
    pub fn new(url: &str) -> Result<Self, String> {
        let url = Url::parse(url).map_err(|e| format!("invalid url `{url}`: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported url scheme `{}`", url.scheme()));
        }
        Ok(Self {
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            follow_redirects: true,
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, String> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("invalid header name `{name}`: {e}"))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| format!("invalid header value: {e}"))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Client honouring this source's redirect policy.
    pub fn build_client(&self) -> reqwest::Result<Client> {
        let policy = if self.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };
        Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(self.timeout.min(Duration::from_secs(5)))
            .timeout(self.timeout)
            .redirect(policy)
            .build()
    }

    /// GET the document. Non-2xx (including unfollowed redirects) is `Remote`.
    pub async fn get_text(&self, client: &Client) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let resp = client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .query(&self.query)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Remote {
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;

        histogram!("fetch_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(body)
    }

    /// Stable cache resource name for this exact request (`lookup:<16 hex>`).
    pub fn cache_resource(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_str().as_bytes());
        for (k, v) in &self.query {
            hasher.update([0u8]);
            hasher.update(k.as_bytes());
            hasher.update([b'=']);
            hasher.update(v.as_bytes());
        }
        let digest = hasher.finalize();
        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        format!("lookup:{hex}")
    }
}
