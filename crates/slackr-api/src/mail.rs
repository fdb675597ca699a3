//! Outgoing mail. Only password reset codes are sent.

use tracing::{debug, info};

pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Writes mail to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to, subject, "Outgoing mail");
        debug!(to, "Mail body: {}", body);
        Ok(())
    }
}
