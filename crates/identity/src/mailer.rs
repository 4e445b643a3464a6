//! Outbound email.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{IdentityError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers email. Failures are reported, and callers treat delivery as
/// best-effort.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

#[async_trait]
impl<T: Mailer + ?Sized> Mailer for Arc<T> {
    async fn send(&self, email: Email) -> Result<()> {
        (**self).send(email).await
    }
}

/// Writes each email to the log instead of delivering it. The body carries
/// single-use tokens, so only the recipient and subject are logged.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "email dispatched");
        Ok(())
    }
}

/// Keeps sent mail in memory for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<RwLock<Vec<Email>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Email> {
        self.sent.read().await.clone()
    }

    /// Most recent email addressed to `to`.
    pub async fn last_to(&self, to: &str) -> Option<Email> {
        self.sent
            .read()
            .await
            .iter()
            .rev()
            .find(|email| email.to == to)
            .cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IdentityError::Mail("smtp relay unavailable".to_string()));
        }
        self.sent.write().await.push(email);
        Ok(())
    }
}
