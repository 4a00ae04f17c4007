use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::DigestNotifier;
use crate::analyze::report::DigestReport;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn required(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{var} missing"))
}

impl EmailSender {
    /// Reads `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`, `NOTIFY_EMAIL_FROM`, `NOTIFY_EMAIL_TO`.
    pub fn from_env() -> Result<Self> {
        let host = required("SMTP_HOST")?;
        let creds = Credentials::new(required("SMTP_USER")?, required("SMTP_PASS")?);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .with_context(|| format!("invalid SMTP_HOST {host}"))?
            .credentials(creds)
            .build();

        let from = required("NOTIFY_EMAIL_FROM")?
            .parse()
            .context("invalid NOTIFY_EMAIL_FROM")?;
        let to = required("NOTIFY_EMAIL_TO")?
            .parse()
            .context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }
}

/// Plain-text message carrying the digest body.
pub fn digest_message(from: &Mailbox, to: &Mailbox, digest: &DigestReport) -> Result<Message> {
    Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(digest_subject(digest))
        .header(header::ContentType::TEXT_PLAIN)
        .body(digest.email_report.clone())
        .context("build email")
}

pub fn digest_subject(digest: &DigestReport) -> String {
    format!(
        "Competitor digest: {} ({})",
        digest.competitor_name,
        digest.created_at.format("%Y-%m-%d")
    )
}

#[async_trait]
impl DigestNotifier for EmailSender {
    async fn send_digest(&self, digest: &DigestReport) -> Result<()> {
        let msg = digest_message(&self.from, &self.to, digest)?;
        self.mailer.send(msg).await.context("send email")?;
        tracing::info!(competitor = %digest.competitor_name, "digest emailed");
        Ok(())
    }
}
