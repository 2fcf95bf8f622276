//! Order lifecycle service.
//!
//! Customer cancel/return requests are checked against the aggregate's
//! rules before anything is written. Admin status changes are unrestricted
//! for live orders. Entering `delivered` sends the customer an email in the
//! background; a failed send is logged and never affects the status change.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use crate::domain::aggregates::{AdminMessage, LifecyclePolicy, MessageKind, Order, OrderError, OrderStatus, ReturnWindow};
use crate::domain::events::OrderEvent;
use crate::notify::{StatusNotifier, StatusUpdate};
use crate::session::SessionContext;
use crate::storage::{MessageStore, OrderStore};
use crate::StoreError;

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error("Order not found")]
    NotFound,
    #[error("Order belongs to another customer")]
    NotOwner,
    #[error(transparent)]
    Rejected(#[from] OrderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the customer may do with an order right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub can_cancel: bool,
    pub return_window: ReturnWindow,
}

pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    messages: Arc<dyn MessageStore>,
    notifier: Arc<dyn StatusNotifier>,
    policy: LifecyclePolicy,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, messages: Arc<dyn MessageStore>, notifier: Arc<dyn StatusNotifier>, policy: LifecyclePolicy) -> Self {
        Self { orders, messages, notifier, policy, pending: Mutex::new(Vec::new()) }
    }

    pub fn policy(&self) -> &LifecyclePolicy { &self.policy }

    pub fn eligibility(&self, order: &Order, now: DateTime<Utc>) -> Eligibility {
        Eligibility { can_cancel: order.can_cancel(&self.policy), return_window: order.return_window(&self.policy, now) }
    }

    pub async fn customer_orders(&self, session: &SessionContext) -> Result<Vec<Order>, OrderServiceError> {
        Ok(self.orders.list_for_customer(&session.user_id).await?)
    }

    pub async fn all_orders(&self) -> Result<Vec<Order>, OrderServiceError> {
        Ok(self.orders.list_all().await?)
    }

    pub async fn cancel(&self, session: &SessionContext, order_id: &str, reason: &str, now: DateTime<Utc>) -> Result<Order, OrderServiceError> {
        let mut order = self.owned(session, order_id).await?;
        order.cancel_by_customer(reason, &self.policy, now)?;
        self.commit(&mut order).await?;
        Ok(order)
    }

    pub async fn request_return(&self, session: &SessionContext, order_id: &str, reason: &str, now: DateTime<Utc>) -> Result<Order, OrderServiceError> {
        let mut order = self.owned(session, order_id).await?;
        order.return_by_customer(reason, &self.policy, now)?;
        self.commit(&mut order).await?;
        Ok(order)
    }

    pub async fn admin_set_status(&self, order_id: &str, status: OrderStatus, now: DateTime<Utc>) -> Result<Order, OrderServiceError> {
        let mut order = self.orders.get(order_id).await?.ok_or(OrderServiceError::NotFound)?;
        if order.set_status_by_admin(status, now)? {
            self.commit(&mut order).await?;
        }
        Ok(order)
    }

    /// Waits for outstanding notification sends.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await { warn!(error = %e, "notification task panicked"); }
        }
    }

    async fn owned(&self, session: &SessionContext, order_id: &str) -> Result<Order, OrderServiceError> {
        let order = self.orders.get(order_id).await?.ok_or(OrderServiceError::NotFound)?;
        if order.customer_id() != session.user_id { return Err(OrderServiceError::NotOwner); }
        Ok(order)
    }

    /// Stores the new status, then runs the side effects of the raised events.
    async fn commit(&self, order: &mut Order) -> Result<(), OrderServiceError> {
        if let Err(e) = self.orders.update_status(order).await {
            error!(order_id = %order.id(), error = %e, "failed to store order status");
            order.take_events();
            return Err(e.into());
        }
        for event in order.take_events() {
            self.dispatch(event).await;
        }
        Ok(())
    }

    async fn dispatch(&self, event: OrderEvent) {
        match event {
            OrderEvent::StatusChanged { order_id, from, to } => info!(order_id = %order_id, %from, %to, "order status changed"),
            OrderEvent::Cancelled { order_id, customer_id, reason } => self.inbox(customer_id, order_id, MessageKind::Cancel, reason).await,
            OrderEvent::Returned { order_id, customer_id, reason } => self.inbox(customer_id, order_id, MessageKind::Return, reason).await,
            OrderEvent::Delivered { order_id, email, customer_name, total, .. } => {
                self.send_delivery_email(StatusUpdate { email, customer_name, order_id, total_amount: total });
            }
            OrderEvent::Placed { .. } => {}
        }
    }

    async fn inbox(&self, customer_id: String, order_id: String, kind: MessageKind, reason: String) {
        let message = AdminMessage::new(customer_id, Some(order_id.clone()), kind, reason, Utc::now());
        if let Err(e) = self.messages.append(&message).await {
            warn!(order_id = %order_id, kind = kind.as_str(), error = %e, "failed to write admin message");
        }
    }

    fn send_delivery_email(&self, update: StatusUpdate) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(order_id = %update.order_id, "no async runtime; delivery email skipped");
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        let handle = runtime.spawn(async move {
            let order_id = update.order_id.clone();
            match notifier.order_delivered(update).await {
                Ok(()) => info!(order_id = %order_id, "delivery email sent"),
                Err(e) => warn!(order_id = %order_id, error = %e, "delivery email failed"),
            }
        });
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}
