// src/notify/mod.rs
pub mod discord;
pub mod email;
pub mod render;
pub mod slack;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;

use crate::error::SinkDeliveryError;
use crate::ingest::types::Record;

pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;

/// A record that was not in the seen log, on its way to the sinks.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordEvent {
    pub source: String,
    pub record: Record,
    pub detected_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, ev: &RecordEvent) -> Result<(), SinkDeliveryError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Fans one event out to every registered sink.
#[derive(Clone, Default)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<N: Notifier + 'static>(mut self, sink: N) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn push(&mut self, sink: Arc<dyn Notifier>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Log sink always; Discord, Slack and email when their env vars are set.
    /// A half-configured email sink is skipped with a warning.
    pub fn from_env() -> Self {
        let mut mux = Self::new().with(LogNotifier);

        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            mux = mux.with(DiscordNotifier::new(url));
        }
        if let Some(slack) = SlackNotifier::from_env() {
            mux = mux.with(slack);
        }
        match EmailNotifier::from_env() {
            Ok(Some(email)) => mux = mux.with(email),
            Ok(None) => tracing::debug!("email notifications disabled (no SMTP_HOST)"),
            Err(e) => tracing::warn!(error = %e, "email notifier misconfigured, skipping"),
        }

        tracing::info!(sinks = ?mux.names(), "notifier mux ready");
        mux
    }

    /// Deliver to every sink in order. A failing sink never stops the others.
    pub async fn dispatch(&self, ev: &RecordEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        for sink in &self.sinks {
            match sink.send(ev).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    counter!("sink_failures_total", "sink" => sink.name().to_string()).increment(1);
                    tracing::warn!(
                        target: "feedwatch::notify",
                        sink = sink.name(),
                        source = %ev.source,
                        id = %ev.record.id,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            }
        }
        report
    }
}

/// Writes new records to the tracing log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, ev: &RecordEvent) -> Result<(), SinkDeliveryError> {
        tracing::info!(
            target: "feedwatch::notify",
            source = %ev.source,
            id = %ev.record.id,
            title = %render::title_of(&ev.record),
            "new record"
        );
        Ok(())
    }
}

// --- Test helper ---
/// Keeps every event it is handed; optionally fails every delivery.
pub struct RecordingNotifier {
    name: String,
    fail: bool,
    pub events: Mutex<Vec<RecordEvent>>,
}

impl RecordingNotifier {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn ids(&self) -> Vec<String> {
        match self.events.lock() {
            Ok(evs) => evs.iter().map(|e| e.record.id.clone()).collect(),
            Err(poison) => poison.into_inner().iter().map(|e| e.record.id.clone()).collect(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, ev: &RecordEvent) -> Result<(), SinkDeliveryError> {
        if self.fail {
            return Err(SinkDeliveryError::new(&self.name, "destination gone"));
        }
        if let Ok(mut evs) = self.events.lock() {
            evs.push(ev.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> RecordEvent {
        RecordEvent {
            source: "avherald".into(),
            record: Record::new(id).with_field("title", "Incident"),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_others() {
        let ok = Arc::new(RecordingNotifier::new("ok"));
        let mut mux = NotifierMux::new().with(RecordingNotifier::failing("broken"));
        mux.push(ok.clone());

        let report = mux.dispatch(&event("r1")).await;
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(ok.ids(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn empty_mux_is_a_noop() {
        let report = NotifierMux::new().dispatch(&event("r1")).await;
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn log_sink_always_succeeds() {
        assert!(LogNotifier.send(&event("r1")).await.is_ok());
    }
}
