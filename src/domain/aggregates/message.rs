//! Admin inbox messages
//!
//! Customer cancel and return requests land here alongside plain support
//! messages. Messages are grouped per customer into threads for the admin view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind { Cancel, Return, Support }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus { #[default] Unread, Read, Replied, Resolved }

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cancel => "cancel", Self::Return => "return", Self::Support => "support" }
    }
    pub fn parse(s: &str) -> Option<Self> {
        [Self::Cancel, Self::Return, Self::Support].into_iter().find(|k| k.as_str() == s)
    }
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Unread => "unread", Self::Read => "read", Self::Replied => "replied", Self::Resolved => "resolved" }
    }
    pub fn parse(s: &str) -> Option<Self> {
        [Self::Unread, Self::Read, Self::Replied, Self::Resolved].into_iter().find(|k| k.as_str() == s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminMessage {
    pub id: String,
    pub customer_id: String,
    pub order_id: Option<String>,
    pub kind: MessageKind,
    pub reason: String,
    pub reply: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl AdminMessage {
    pub fn new(customer_id: impl Into<String>, order_id: Option<String>, kind: MessageKind, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(), customer_id: customer_id.into(), order_id, kind,
            reason: reason.into(), reply: None, status: MessageStatus::Unread, created_at: now,
        }
    }

    /// Unread messages become read; anything further along stays as it is.
    pub fn mark_read(&mut self) {
        if self.status == MessageStatus::Unread { self.status = MessageStatus::Read; }
    }

    pub fn answer(&mut self, reply: impl Into<String>) {
        self.reply = Some(reply.into());
        self.status = MessageStatus::Replied;
    }

    pub fn resolve(&mut self) { self.status = MessageStatus::Resolved; }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupportThread {
    pub customer_id: String,
    pub messages: Vec<AdminMessage>,
    pub unread: usize,
    pub last_activity: DateTime<Utc>,
}

/// Groups messages by customer. Messages inside a thread are oldest first;
/// threads are ordered by most recent activity.
pub fn group_threads(messages: impl IntoIterator<Item = AdminMessage>) -> Vec<SupportThread> {
    let mut by_customer: BTreeMap<String, Vec<AdminMessage>> = BTreeMap::new();
    for m in messages {
        by_customer.entry(m.customer_id.clone()).or_default().push(m);
    }

    let mut threads: Vec<SupportThread> = by_customer.into_iter().filter_map(|(customer_id, mut messages)| {
        messages.sort_by_key(|m| m.created_at);
        let last_activity = messages.last()?.created_at;
        let unread = messages.iter().filter(|m| m.status == MessageStatus::Unread).count();
        Some(SupportThread { customer_id, messages, unread, last_activity })
    }).collect();
    threads.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    threads
}
