//! Outbound mail.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{DeliveryError, Result};
use crate::messages::DeliveryTask;

/// Sends one task to its recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, task: &DeliveryTask) -> Result<()>;
}

/// Writes each message to the log instead of sending it.
///
/// Attachments are resolved against `attachments_dir`; a reference that
/// does not exist there is logged and the message still counts as sent.
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    attachments_dir: Option<PathBuf>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attachments_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            attachments_dir: Some(dir.into()),
        }
    }

    fn attachment_path(&self, reference: &str) -> PathBuf {
        match &self.attachments_dir {
            Some(dir) => dir.join(reference),
            None => PathBuf::from(reference),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, task: &DeliveryTask) -> Result<()> {
        if task.to.trim().is_empty() {
            return Err(DeliveryError::Mail("empty recipient".into()));
        }

        tracing::info!(to = %task.to, subject = %task.subject, "sending message");
        if let Some(reference) = &task.attachment {
            let path = self.attachment_path(reference);
            if tokio::fs::try_exists(&path).await? {
                tracing::info!(attachment = %path.display(), "attachment included");
            } else {
                tracing::warn!(attachment = %path.display(), "attachment not found");
            }
        }
        tracing::info!(to = %task.to, "message sent");
        Ok(())
    }
}
