//! Notifier trait and shared error types.

use async_trait::async_trait;

use vigil_core::notification::{Channel, Notification};

/// Errors during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider rejected delivery: {0}")]
    Rejected(String),

    #[error("send timed out")]
    Timeout,
}

impl NotifyError {
    /// Whether a later retry could succeed. Configuration mistakes and
    /// permanent provider rejections don't get retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Http(_) | NotifyError::Smtp(_) | NotifyError::Timeout => true,
            NotifyError::Template(_) | NotifyError::Config(_) | NotifyError::Rejected(_) => false,
        }
    }
}

/// What the provider handed back for a successful send.
#[derive(Debug, Clone)]
pub struct ProviderReceipt {
    /// Provider-side message id; synthesized when the provider returns
    /// none, so idempotency checks always have something to key on.
    pub external_id: String,
    pub tracking_id: Option<String>,
    /// True when the provider confirms delivery synchronously.
    pub delivered: bool,
}

impl ProviderReceipt {
    pub fn sent(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            tracking_id: None,
            delivered: false,
        }
    }

    pub fn delivered(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            tracking_id: None,
            delivered: true,
        }
    }
}

/// One delivery channel implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a rendered notification.
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt, NotifyError>;

    /// Which channel this notifier serves.
    fn channel(&self) -> Channel;
}
