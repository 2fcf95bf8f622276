//! Order status emails, sent through the mail relay sidecar.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub email: String,
    pub customer_name: String,
    pub order_id: String,
    pub total_amount: Money,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Mail relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Mail relay refused the message: {0}")]
    Rejected(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn order_delivered(&self, update: StatusUpdate) -> Result<(), NotifyError>;
}

#[derive(Debug, Deserialize)]
struct RelayReply {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client of the relay's `POST /send-status-update`.
#[derive(Debug, Clone)]
pub struct MailRelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl MailRelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl StatusNotifier for MailRelayClient {
    async fn order_delivered(&self, update: StatusUpdate) -> Result<(), NotifyError> {
        let reply: RelayReply = self.http.post(format!("{}/send-status-update", self.base_url))
            .json(&update).send().await?.json().await?;
        if !reply.success {
            return Err(NotifyError::Rejected(reply.error.unwrap_or_else(|| "unknown error".into())));
        }
        Ok(())
    }
}

/// Logs instead of sending. Used when no relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl StatusNotifier for NoopNotifier {
    async fn order_delivered(&self, update: StatusUpdate) -> Result<(), NotifyError> {
        info!(order_id = %update.order_id, "no mail relay configured; delivery email skipped");
        Ok(())
    }
}
