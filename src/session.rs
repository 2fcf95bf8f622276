//! Session context and single-device session checks.
//!
//! The signed-in identity is passed explicitly to every cart and order
//! operation; `None` means an anonymous shopper.
//!
//! [`SessionMonitor`] compares the locally held session token with the last
//! session recorded for the user. A newer sign-in elsewhere supersedes this
//! one. This is a best-effort check: between polls a superseded session keeps
//! working, so it is not a security boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: String,
    pub email: String,
    pub session_token: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), email: email.into(), session_token: session_token.into() }
    }
}

/// Where the most recent session id per user is recorded.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn last_session_id(&self, user_id: &str) -> Result<Option<String>, StoreError>;
    async fn record_session(&self, user_id: &str, session_id: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCheck {
    Current,
    Superseded,
    /// The directory could not be reached; the session is left alone.
    Unknown,
}

pub struct SessionMonitor {
    directory: Arc<dyn SessionDirectory>,
}

impl SessionMonitor {
    pub fn new(directory: Arc<dyn SessionDirectory>) -> Self { Self { directory } }

    /// Records `session` as the user's latest sign-in.
    pub async fn claim(&self, session: &SessionContext) -> Result<(), StoreError> {
        self.directory.record_session(&session.user_id, &session.session_token).await?;
        info!(user_id = %session.user_id, "session claimed");
        Ok(())
    }

    pub async fn check(&self, session: &SessionContext) -> SessionCheck {
        match self.directory.last_session_id(&session.user_id).await {
            Ok(Some(latest)) if latest != session.session_token => SessionCheck::Superseded,
            Ok(_) => SessionCheck::Current,
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "session check failed");
                SessionCheck::Unknown
            }
        }
    }

    /// Polls every `interval` until the session is superseded, then runs `on_superseded` once.
    pub fn spawn_polling<F, Fut>(self: Arc<Self>, session: SessionContext, interval: Duration, on_superseded: F) -> JoinHandle<()>
    where
        F: FnOnce(SessionContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if self.check(&session).await == SessionCheck::Superseded {
                    info!(user_id = %session.user_id, "session superseded by a newer sign-in");
                    on_superseded(session).await;
                    return;
                }
                debug!(user_id = %session.user_id, "session still current");
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgSessionDirectory { db: PgPool }

impl PgSessionDirectory {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl SessionDirectory for PgSessionDirectory {
    async fn last_session_id(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT last_session_id FROM profiles WHERE id = $1").bind(user_id).fetch_optional(&self.db).await?;
        Ok(row.and_then(|(id,)| id))
    }

    async fn record_session(&self, user_id: &str, session_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE profiles SET last_session_id = $2 WHERE id = $1").bind(user_id).bind(session_id).execute(&self.db).await?;
        if result.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Directory(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl SessionDirectory for Directory {
        async fn last_session_id(&self, user_id: &str) -> Result<Option<String>, StoreError> {
            Ok(self.0.lock().unwrap().get(user_id).cloned())
        }
        async fn record_session(&self, user_id: &str, session_id: &str) -> Result<(), StoreError> {
            self.0.lock().unwrap().insert(user_id.into(), session_id.into());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_newer_sign_in_supersedes() {
        let monitor = SessionMonitor::new(Arc::new(Directory::default()));
        let laptop = SessionContext::new("U1", "u1@example.com", "tok-a");
        let phone = SessionContext::new("U1", "u1@example.com", "tok-b");
        monitor.claim(&laptop).await.unwrap();
        assert_eq!(monitor.check(&laptop).await, SessionCheck::Current);
        monitor.claim(&phone).await.unwrap();
        assert_eq!(monitor.check(&laptop).await, SessionCheck::Superseded);
        assert_eq!(monitor.check(&phone).await, SessionCheck::Current);
    }

    #[tokio::test]
    async fn test_polling_fires_callback_once_superseded() {
        let monitor = Arc::new(SessionMonitor::new(Arc::new(Directory::default())));
        let laptop = SessionContext::new("U1", "u1@example.com", "tok-a");
        monitor.claim(&SessionContext::new("U1", "u1@example.com", "tok-b")).await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = monitor.spawn_polling(laptop, Duration::from_millis(5), move |s| async move {
            let _ = tx.send(s.session_token);
        });
        assert_eq!(rx.await.unwrap(), "tok-a");
        handle.await.unwrap();
    }
}
