//! Outbound mail transports for the relay.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use crate::config::MailApiConfig;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Sends through a transactional-mail HTTP API with bearer auth.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    config: MailApiConfig,
}

impl HttpMailer {
    pub fn new(config: MailApiConfig) -> Result<Self, MailError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let body = ApiMessage { from: &self.config.from, to: &email.to, subject: &email.subject, html: &email.html };
        self.http.post(&self.config.url).bearer_auth(&self.config.api_key).json(&body).send().await?.error_for_status()?;
        info!(to = %email.to, subject = %email.subject, "mail sent");
        Ok(())
    }
}

/// Writes mail to the log. For local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, body = %email.html, "mail not sent (log transport)");
        Ok(())
    }
}
