// src/ingest/providers/rss.rs
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::Mode;
use crate::error::FetchError;
use crate::ingest::http::HttpSource;
use crate::ingest::normalize_text;
use crate::ingest::types::{Fetcher, Record};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// RSS 2.0 feed. Records come out in feed order (newest first).
pub struct RssFetcher {
    name: String,
    mode: Mode,
}

impl RssFetcher {
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_source(name: &str, source: HttpSource) -> reqwest::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            mode: Mode::http(source)?,
        })
    }

    fn item_to_record(idx: usize, it: Item, raw: &str) -> Result<Record, FetchError> {
        let id = non_empty(it.guid.as_ref().map(|g| g.value.as_str()))
            .or_else(|| non_empty(it.link.as_deref()))
            .ok_or_else(|| FetchError::parse(raw, format!("item {idx} has neither guid nor link")))?
            .to_string();

        let mut rec = Record::new(id);
        if let Some(title) = it.title.as_deref().map(normalize_text) {
            rec = rec.with_field("title", title);
        }
        if let Some(link) = non_empty(it.link.as_deref()) {
            rec = rec.with_field("url", link);
        }
        if let Some(desc) = it.description.as_deref().map(normalize_text) {
            if !desc.is_empty() {
                rec = rec.with_field("summary", desc);
            }
        }
        if let Some(ts) = it.pub_date.as_deref().and_then(parse_rfc2822_to_unix) {
            rec = rec.with_field("published_at", ts);
        }
        Ok(rec)
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_raw(&self) -> Result<String, FetchError> {
        self.mode.raw(&self.name).await
    }

    fn parse(&self, raw: &str) -> Result<Vec<Record>, FetchError> {
        let xml_clean = scrub_html_entities_for_xml(raw);
        let rss: Rss =
            from_str(&xml_clean).map_err(|e| FetchError::parse(raw, format!("rss xml: {e}")))?;

        rss.channel
            .item
            .into_iter()
            .enumerate()
            .map(|(idx, it)| Self::item_to_record(idx, it, raw))
            .collect()
    }

    fn cache_resource(&self) -> String {
        self.mode.cache_resource()
    }
}

// HTML entities that are not valid XML show up in real feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
