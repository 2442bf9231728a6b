use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{render, Notifier, RecordEvent};
use crate::error::SinkDeliveryError;

const SINK: &str = "email";

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn required(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| anyhow!("{var} missing"))
}

impl EmailNotifier {
    /// `Ok(None)` without `SMTP_HOST`; an error if it is set but the rest is
    /// missing or invalid.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };
        let user = required("SMTP_USER")?;
        let pass = required("SMTP_PASS")?;
        let from_addr = required("NOTIFY_EMAIL_FROM")?;
        let to_addr = required("NOTIFY_EMAIL_TO")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Some(Self { mailer, from, to }))
    }

    fn build(&self, ev: &RecordEvent) -> Result<Message> {
        let title = render::title_of(&ev.record);
        let subject = format!("[{}] {}", ev.source, title);
        let body = format!(
            "{}\n\n{}\nLink: {}\nId: {}\nDetected: {}\n",
            title,
            render::summary_of(&ev.record).unwrap_or_default(),
            render::url_of(&ev.record).unwrap_or("-"),
            ev.record.id,
            ev.detected_at.to_rfc3339()
        );

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        SINK
    }

    async fn send(&self, ev: &RecordEvent) -> Result<(), SinkDeliveryError> {
        let msg = self.build(ev).map_err(|e| SinkDeliveryError::new(SINK, format!("{e:#}")))?;
        self.mailer
            .send(msg)
            .await
            .map_err(|e| SinkDeliveryError::new(SINK, format!("send email: {e}")))?;
        Ok(())
    }
}
