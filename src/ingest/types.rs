// src/ingest/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FetchError;

/// One item produced by a remote source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String, // stable within its source
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// String view of a field, if present and a string.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Parsed records together with the raw body they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub records: Vec<Record>,
    pub raw: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Perform the network call and return the body untouched.
    async fn fetch_raw(&self) -> Result<String, FetchError>;

    /// Turn a raw body into records, newest first. All or nothing.
    fn parse(&self, raw: &str) -> Result<Vec<Record>, FetchError>;

    /// Whether the data has stopped changing (selects the long cache TTL).
    fn is_settled(&self, _records: &[Record]) -> bool {
        false
    }

    /// Resource part of the cache key for this fetcher's raw body.
    fn cache_resource(&self) -> String {
        "raw".to_string()
    }

    async fn fetch(&self) -> Result<Fetched, FetchError> {
        let raw = self.fetch_raw().await?;
        let records = self.parse(&raw)?;
        Ok(Fetched { records, raw })
    }
}
