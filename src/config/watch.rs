// src/config/watch.rs
use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlPolicy;
use crate::error::ConfigError;
use crate::ingest::http::HttpSource;
use crate::ingest::providers::{JsonFetcher, RssFetcher};
use crate::ingest::types::Fetcher;
use crate::scheduler::{PollScheduler, PollSettings, WatchContext};
use crate::tracker::MAX_SEEN_LIMIT;

const ENV_PATH: &str = "FEEDWATCH_CONFIG";
const MIN_INTERVAL_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 120;
// Grace on top of the per-request timeout for the whole fetch (incl. parse).
const FETCH_GRACE: Duration = Duration::from_secs(5);

fn valid_name(name: &str) -> bool {
    static RE_NAME: OnceCell<Regex> = OnceCell::new();
    RE_NAME
        .get_or_init(|| Regex::new(r"^[a-z0-9_-]+$").unwrap())
        .is_match(name)
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_interval() -> u64 {
    600
}
fn default_timeout() -> u64 {
    15
}
fn default_max_seen() -> usize {
    crate::tracker::DEFAULT_MAX_SEEN
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Json,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default = "default_max_seen")]
    pub max_seen: usize,
    /// Single TTL; mutually exclusive with the short/long pair.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub cache_ttl_short_secs: Option<u64>,
    #[serde(default)]
    pub cache_ttl_long_secs: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    // json only
    #[serde(default)]
    pub items_pointer: Option<String>,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub settled_field: Option<String>,
    #[serde(default)]
    pub settled_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            sources: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Load from an explicit path. Format is picked by extension (TOML or JSON).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading watch config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext).with_context(|| format!("in {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $FEEDWATCH_CONFIG
    /// 2) config/feedwatch.toml
    /// 3) config/feedwatch.json
    ///
    /// No file at all yields an empty config.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/feedwatch.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/feedwatch.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    pub fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        let cfg: Self = match hint_ext {
            "toml" => toml::from_str(s).context("parsing TOML")?,
            "json" => serde_json::from_str(s).context("parsing JSON")?,
            _ => match toml::from_str(s) {
                Ok(c) => c,
                Err(_) => serde_json::from_str(s).map_err(|_| ConfigError::UnsupportedFormat)?,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for src in &self.sources {
            src.validate()?;
            if !names.insert(src.name.as_str()) {
                return Err(ConfigError::DuplicateSource(src.name.clone()));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid bind address `{}`", self.bind))
    }

    /// One scheduler per configured source, all sharing `ctx`.
    pub fn build_schedulers(&self, ctx: &WatchContext) -> Result<Vec<PollScheduler>> {
        self.sources
            .iter()
            .map(|src| {
                let fetcher = src.build_fetcher()?;
                Ok(PollScheduler::new(fetcher, ctx.clone(), src.poll_settings()))
            })
            .collect()
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

impl SourceConfig {
    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidSource {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !valid_name(&self.name) {
            return Err(self.invalid("name must match [a-z0-9_-]+"));
        }
        if self.interval_secs < MIN_INTERVAL_SECS {
            return Err(self.invalid(format!("interval_secs must be >= {MIN_INTERVAL_SECS}")));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(self.invalid(format!("timeout_secs must be in 1..={MAX_TIMEOUT_SECS}")));
        }
        if !(1..=MAX_SEEN_LIMIT).contains(&self.max_seen) {
            return Err(self.invalid(format!("max_seen must be in 1..={MAX_SEEN_LIMIT}")));
        }

        match (
            self.cache_ttl_secs,
            self.cache_ttl_short_secs,
            self.cache_ttl_long_secs,
        ) {
            (None, None, None) => {}
            (Some(t), None, None) if t > 0 => {}
            (None, Some(s), Some(l)) if s > 0 && l >= s => {}
            _ => {
                return Err(self.invalid(
                    "use either cache_ttl_secs, or cache_ttl_short_secs with cache_ttl_long_secs >= short (all > 0)",
                ))
            }
        }

        if self.kind == SourceKind::Rss
            && (self.items_pointer.is_some()
                || self.id_field.is_some()
                || self.settled_field.is_some()
                || self.settled_value.is_some())
        {
            return Err(self.invalid("items_pointer/id_field/settled_* only apply to json sources"));
        }
        if let Some(p) = &self.items_pointer {
            if !p.is_empty() && !p.starts_with('/') {
                return Err(self.invalid("items_pointer must be empty or start with `/`"));
            }
        }
        if self.settled_field.is_some() != self.settled_value.is_some() {
            return Err(self.invalid("settled_field and settled_value go together"));
        }

        self.http_source().map(|_| ())
    }

    pub fn http_source(&self) -> Result<HttpSource, ConfigError> {
        let mut source = HttpSource::new(&self.url)
            .map_err(|e| self.invalid(e))?
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .follow_redirects(self.follow_redirects);
        for (k, v) in &self.headers {
            source = source.with_header(k, v).map_err(|e| self.invalid(e))?;
        }
        for (k, v) in &self.query {
            source = source.with_query(k, v);
        }
        Ok(source)
    }

    pub fn ttl_policy(&self) -> Option<TtlPolicy> {
        match (
            self.cache_ttl_secs,
            self.cache_ttl_short_secs,
            self.cache_ttl_long_secs,
        ) {
            (Some(t), _, _) => Some(TtlPolicy::fixed(Duration::from_secs(t))),
            (None, Some(s), Some(l)) => Some(TtlPolicy::split(
                Duration::from_secs(s),
                Duration::from_secs(l),
            )),
            _ => None,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.interval_secs),
            fetch_timeout: Duration::from_secs(self.timeout_secs) + FETCH_GRACE,
            cache_ttl: self.ttl_policy(),
            max_seen: self.max_seen,
        }
    }

    pub fn build_fetcher(&self) -> Result<Arc<dyn Fetcher>> {
        let source = self.http_source()?;
        let fetcher: Arc<dyn Fetcher> = match self.kind {
            SourceKind::Rss => Arc::new(
                RssFetcher::from_source(&self.name, source).context("building http client")?,
            ),
            SourceKind::Json => {
                let mut f = JsonFetcher::from_source(&self.name, source)
                    .context("building http client")?;
                if let Some(p) = &self.items_pointer {
                    f = f.items_at(p);
                }
                if let Some(id) = &self.id_field {
                    f = f.id_field(id);
                }
                if let (Some(field), Some(value)) = (&self.settled_field, &self.settled_value) {
                    f = f.settled_when(field, value.clone());
                }
                Arc::new(f)
            }
        };
        Ok(fetcher)
    }
}
