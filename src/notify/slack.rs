use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{render, Notifier, RecordEvent};
use crate::error::SinkDeliveryError;

const SINK: &str = "slack";

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    /// `None` when `SLACK_WEBHOOK_URL` is unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL").ok().map(Self::new)
    }

    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn text(ev: &RecordEvent) -> String {
        let title = render::title_of(&ev.record);
        let head = match render::url_of(&ev.record) {
            Some(url) => format!("*[{}]* <{}|{}>", ev.source, url, title),
            None => format!("*[{}]* {}", ev.source, title),
        };
        match render::summary_of(&ev.record) {
            Some(summary) => format!("{head}\n{summary}"),
            None => head,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        SINK
    }

    async fn send(&self, ev: &RecordEvent) -> Result<(), SinkDeliveryError> {
        let body = serde_json::json!({ "text": Self::text(ev) });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkDeliveryError::new(SINK, format!("slack post: {e}")))?
            .error_for_status()
            .map_err(|e| SinkDeliveryError::new(SINK, format!("slack non-2xx: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Record;
    use chrono::Utc;

    #[test]
    fn text_links_title_when_url_present() {
        let ev = RecordEvent {
            source: "dayinhistory".into(),
            record: Record::new("1969-07-20")
                .with_field("title", "Apollo 11 lands")
                .with_field("url", "https://example.org/apollo"),
            detected_at: Utc::now(),
        };
        assert_eq!(
            SlackNotifier::text(&ev),
            "*[dayinhistory]* <https://example.org/apollo|Apollo 11 lands>"
        );
    }
}
