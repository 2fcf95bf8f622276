//! Wires the storefront services to their stores.

use std::sync::Arc;
use tracing::{info, warn};
use crate::cart::{CartService, ReconcileOutcome};
use crate::checkout::CheckoutService;
use crate::config::StorefrontConfig;
use crate::domain::aggregates::LifecyclePolicy;
use crate::inbox::InboxService;
use crate::notify::{MailRelayClient, NoopNotifier, StatusNotifier};
use crate::orders::OrderService;
use crate::session::{PgSessionDirectory, SessionContext, SessionMonitor};
use crate::storage::{postgres, LocalCartStore, MessageStore, OrderStore, PgMessageStore, PgOrderStore, PgRemoteCartStore, RemoteCartStore};

pub struct Storefront {
    pub cart: Arc<CartService>,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub inbox: InboxService,
    sessions: Option<Arc<SessionMonitor>>,
}

impl Storefront {
    pub fn new(
        local: Arc<dyn LocalCartStore>,
        remote: Arc<dyn RemoteCartStore>,
        orders: Arc<dyn OrderStore>,
        messages: Arc<dyn MessageStore>,
        notifier: Arc<dyn StatusNotifier>,
        policy: LifecyclePolicy,
    ) -> Self {
        let cart = Arc::new(CartService::new(local, remote));
        Self {
            checkout: CheckoutService::new(cart.clone(), orders.clone()),
            orders: OrderService::new(orders, messages.clone(), notifier, policy),
            inbox: InboxService::new(messages),
            cart,
            sessions: None,
        }
    }

    pub fn with_sessions(mut self, monitor: Arc<SessionMonitor>) -> Self {
        self.sessions = Some(monitor);
        self
    }

    /// Connects to Postgres, runs migrations and builds the hosted stores.
    pub async fn connect(config: &StorefrontConfig, local: Arc<dyn LocalCartStore>) -> anyhow::Result<Self> {
        let db = postgres::connect(&config.database_url).await?;
        let notifier: Arc<dyn StatusNotifier> = match &config.mail_relay_url {
            Some(url) => Arc::new(MailRelayClient::new(url.as_str())?),
            None => Arc::new(NoopNotifier),
        };
        info!(relay = config.mail_relay_url.is_some(), "storefront connected");
        Ok(Self::new(
            local,
            Arc::new(PgRemoteCartStore::new(db.clone())),
            Arc::new(PgOrderStore::new(db.clone())),
            Arc::new(PgMessageStore::new(db.clone())),
            notifier,
            config.lifecycle,
        )
        .with_sessions(Arc::new(SessionMonitor::new(Arc::new(PgSessionDirectory::new(db))))))
    }

    /// Records the sign-in and reconciles the cart with the user's remote lines.
    pub async fn sign_in(&self, session: &SessionContext) -> ReconcileOutcome {
        if let Some(monitor) = &self.sessions {
            if let Err(e) = monitor.claim(session).await {
                warn!(user_id = %session.user_id, error = %e, "could not record session");
            }
        }
        self.cart.on_session_change(Some(session)).await
    }

    pub async fn sign_out(&self) -> ReconcileOutcome {
        self.cart.on_session_change(None).await
    }

    /// Waits for outstanding remote mirroring and notifications.
    pub async fn settle(&self) {
        self.cart.settle().await;
        self.orders.settle().await;
    }
}
