//! Admin inbox: support messages plus the cancel/return notes written by
//! the order service.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use validator::Validate;
use crate::domain::aggregates::message::group_threads;
use crate::domain::aggregates::{AdminMessage, MessageKind, SupportThread};
use crate::session::SessionContext;
use crate::storage::MessageStore;
use crate::StoreError;

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("Message not found")]
    NotFound,
    #[error("Invalid message: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Validate)]
struct MessageText {
    #[validate(length(min = 1, max = 2000))]
    text: String,
}

fn checked(text: &str) -> Result<String, InboxError> {
    let input = MessageText { text: text.trim().to_string() };
    input.validate().map_err(|e| InboxError::Invalid(e.to_string()))?;
    Ok(input.text)
}

pub struct InboxService {
    messages: Arc<dyn MessageStore>,
}

impl InboxService {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self { Self { messages } }

    pub async fn open_support_request(&self, session: &SessionContext, text: &str, now: DateTime<Utc>) -> Result<AdminMessage, InboxError> {
        let message = AdminMessage::new(&session.user_id, None, MessageKind::Support, checked(text)?, now);
        self.messages.append(&message).await?;
        info!(user_id = %session.user_id, message_id = %message.id, "support request opened");
        Ok(message)
    }

    pub async fn customer_messages(&self, session: &SessionContext) -> Result<Vec<AdminMessage>, InboxError> {
        Ok(self.messages.list_for_customer(&session.user_id).await?)
    }

    pub async fn threads(&self) -> Result<Vec<SupportThread>, InboxError> {
        Ok(group_threads(self.messages.list_all().await?))
    }

    pub async fn mark_read(&self, message_id: &str) -> Result<AdminMessage, InboxError> {
        self.update(message_id, AdminMessage::mark_read).await
    }

    pub async fn reply(&self, message_id: &str, text: &str) -> Result<AdminMessage, InboxError> {
        let text = checked(text)?;
        self.update(message_id, |m| m.answer(text)).await
    }

    pub async fn resolve(&self, message_id: &str) -> Result<AdminMessage, InboxError> {
        self.update(message_id, AdminMessage::resolve).await
    }

    async fn update(&self, message_id: &str, f: impl FnOnce(&mut AdminMessage)) -> Result<AdminMessage, InboxError> {
        let mut message = self.messages.get(message_id).await?.ok_or(InboxError::NotFound)?;
        f(&mut message);
        self.messages.save(&message).await?;
        Ok(message)
    }
}
