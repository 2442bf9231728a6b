use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use super::{render, Notifier, RecordEvent};
use crate::error::SinkDeliveryError;

const SINK: &str = "discord";

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn payload(ev: &RecordEvent) -> DiscordWebhookPayload {
        let mut description = render::summary_of(&ev.record).unwrap_or_default();
        if !description.is_empty() {
            description.push('\n');
        }
        description.push_str(&format!("**Source:** {}", ev.source));

        DiscordWebhookPayload {
            content: None,
            embeds: vec![DiscordEmbed {
                title: render::title_of(&ev.record),
                description,
                url: render::url_of(&ev.record).map(str::to_string),
                timestamp: ev.detected_at.to_rfc3339(),
            }],
        }
    }
}

// 429 and 5xx may clear up; anything else (e.g. a deleted webhook) will not.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

// 500ms doubling per attempt, capped at 32s.
fn backoff(attempt: u8) -> Duration {
    let exp = u32::from(attempt.saturating_sub(1).min(6));
    Duration::from_millis(500u64 << exp)
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        SINK
    }

    async fn send(&self, ev: &RecordEvent) -> Result<(), SinkDeliveryError> {
        let payload = Self::payload(ev);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let retry_err = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) if !is_retryable(rsp.status()) => {
                    return Err(SinkDeliveryError::new(
                        SINK,
                        format!("webhook HTTP {}", rsp.status()),
                    ));
                }
                Ok(rsp) => format!("webhook HTTP {}", rsp.status()),
                Err(e) => format!("webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(SinkDeliveryError::new(SINK, retry_err));
            }
            tokio::time::sleep(backoff(attempt)).await;
        }
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    timestamp: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}
