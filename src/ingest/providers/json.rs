// src/ingest/providers/json.rs
use async_trait::async_trait;
use serde_json::Value;

use super::Mode;
use crate::error::FetchError;
use crate::ingest::http::HttpSource;
use crate::ingest::types::{Fetcher, Record};

/// JSON API returning an array of objects somewhere in its document.
pub struct JsonFetcher {
    name: String,
    mode: Mode,
    /// RFC 6901 pointer to the items array; empty means the root.
    items_pointer: String,
    id_field: String,
    settled_when: Option<(String, Value)>,
}

impl JsonFetcher {
    pub fn from_fixture(name: &str, body: &str) -> Self {
        Self::with_mode(name, Mode::Fixture(body.to_string()))
    }

    pub fn from_source(name: &str, source: HttpSource) -> reqwest::Result<Self> {
        Ok(Self::with_mode(name, Mode::http(source)?))
    }

    fn with_mode(name: &str, mode: Mode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            items_pointer: String::new(),
            id_field: "id".to_string(),
            settled_when: None,
        }
    }

    pub fn items_at(mut self, pointer: &str) -> Self {
        self.items_pointer = pointer.to_string();
        self
    }

    pub fn id_field(mut self, field: &str) -> Self {
        self.id_field = field.to_string();
        self
    }

    /// Data counts as settled once every record has `field == value`
    /// (e.g. a flight whose status is "landed").
    pub fn settled_when(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.settled_when = Some((field.to_string(), value.into()));
        self
    }

    fn id_of(
        &self,
        idx: usize,
        item: &serde_json::Map<String, Value>,
        raw: &str,
    ) -> Result<String, FetchError> {
        match item.get(&self.id_field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(FetchError::parse(
                raw,
                format!("item {idx} has no usable `{}`", self.id_field),
            )),
        }
    }
}

#[async_trait]
impl Fetcher for JsonFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_raw(&self) -> Result<String, FetchError> {
        self.mode.raw(&self.name).await
    }

    fn parse(&self, raw: &str) -> Result<Vec<Record>, FetchError> {
        let doc: Value =
            serde_json::from_str(raw).map_err(|e| FetchError::parse(raw, format!("json: {e}")))?;

        let target = if self.items_pointer.is_empty() {
            Some(&doc)
        } else {
            doc.pointer(&self.items_pointer)
        };
        let items = target
            .ok_or_else(|| FetchError::parse(raw, format!("`{}` not found", self.items_pointer)))?
            .as_array()
            .ok_or_else(|| FetchError::parse(raw, "items are not an array"))?;

        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let obj = item
                .as_object()
                .ok_or_else(|| FetchError::parse(raw, format!("item {idx} is not an object")))?;
            let id = self.id_of(idx, obj, raw)?;
            out.push(Record {
                id,
                fields: obj.clone(),
            });
        }
        Ok(out)
    }

    fn is_settled(&self, records: &[Record]) -> bool {
        match &self.settled_when {
            Some((field, value)) => {
                !records.is_empty() && records.iter().all(|r| r.fields.get(field) == Some(value))
            }
            None => false,
        }
    }

    fn cache_resource(&self) -> String {
        self.mode.cache_resource()
    }
}
