//! Digest delivery. Email is the only channel; the trait keeps the report stage testable.

pub mod email;

use anyhow::Result;
use async_trait::async_trait;

use crate::analyze::report::DigestReport;

pub use email::EmailSender;

#[async_trait]
pub trait DigestNotifier: Send + Sync {
    async fn send_digest(&self, digest: &DigestReport) -> Result<()>;
}
