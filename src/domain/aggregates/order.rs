//! Order Aggregate
//!
//! Status flow is `pending -> processing -> shipped -> delivered`, with
//! `cancelled` and `returned` as terminal branches. Cancel and return
//! eligibility are derived from `(status, timestamps, now)` on every call and
//! never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::cart::Cart;
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, ProductId, Quantity};

pub const MIN_REASON_CHARS: u64 = 10;
pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 5;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled, Returned }

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled, Self::Returned];

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Returned) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str().eq_ignore_ascii_case(s.trim())).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Statuses from which a customer may cancel on their own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    PendingOnly,
    /// pending, processing or shipped
    #[default]
    BeforeDelivery,
}

impl CancelPolicy {
    pub fn allows(&self, status: OrderStatus) -> bool {
        match self {
            Self::PendingOnly => status == OrderStatus::Pending,
            Self::BeforeDelivery => matches!(status, OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Shipped),
        }
    }
}

/// What the return window looks like for a delivered order with no recorded delivery time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingDeliveryDate {
    /// Treat "now" as the delivery instant.
    #[default]
    FullWindow,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub cancel: CancelPolicy,
    pub missing_delivery_date: MissingDeliveryDate,
    pub return_window_days: i64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self { cancel: CancelPolicy::default(), missing_delivery_date: MissingDeliveryDate::default(), return_window_days: DEFAULT_RETURN_WINDOW_DAYS }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReturnWindow {
    pub days_remaining: i64,
    pub can_return: bool,
}

impl ReturnWindow {
    pub const CLOSED: ReturnWindow = ReturnWindow { days_remaining: 0, can_return: false };

    /// `days_remaining = window - floor((now - delivered_at) / 1 day)`, never below zero.
    pub fn compute(delivered_at: DateTime<Utc>, now: DateTime<Utc>, window_days: i64) -> Self {
        let elapsed_days = (now - delivered_at).num_seconds().div_euclid(SECONDS_PER_DAY);
        let days_remaining = (window_days - elapsed_days).clamp(0, window_days);
        Self { days_remaining, can_return: days_remaining > 0 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod { #[default] Standard, Express, Pickup }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { #[default] Card, BankTransfer, CashOnDelivery }

macro_rules! text_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str { match self { $(Self::$variant => $text),+ } }
        }
        impl FromStr for $ty {
            type Err = OrderError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s { $($text => Ok(Self::$variant),)+ other => Err(OrderError::InvalidDetails(format!("unknown value {other:?}"))) }
            }
        }
    };
}

text_enum!(DeliveryMethod { Standard => "standard", Express => "express", Pickup => "pickup" });
text_enum!(PaymentMethod { Card => "card", BankTransfer => "bank_transfer", CashOnDelivery => "cash_on_delivery" });

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CheckoutDetails {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 32))]
    pub phone: String,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Validate)]
struct TransitionReason {
    #[validate(length(min = 10))]
    text: String,
}

fn checked_reason(reason: &str) -> Result<String, OrderError> {
    let input = TransitionReason { text: reason.trim().to_string() };
    input.validate().map_err(|_| OrderError::ReasonTooShort { min: MIN_REASON_CHARS })?;
    Ok(input.text)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine { pub product_id: ProductId, pub name: String, pub quantity: Quantity, pub unit_price: Money }

/// Persisted shape of an order, used by stores to rebuild the aggregate.
#[derive(Clone, Debug)]
pub struct OrderParts {
    pub id: String,
    pub customer_id: String,
    pub details: CheckoutDetails,
    pub lines: Vec<OrderLine>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    id: String,
    customer_id: String,
    details: CheckoutDetails,
    lines: Vec<OrderLine>,
    total: Money,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

impl Order {
    /// Snapshots the cart's lines and total into a new pending order.
    pub fn place(customer_id: impl Into<String>, details: CheckoutDetails, cart: &Cart, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::NoItems); }
        details.validate().map_err(|e| OrderError::InvalidDetails(e.to_string()))?;
        let lines = cart.lines().iter().map(|l| OrderLine { product_id: l.product_id.clone(), name: l.name.clone(), quantity: l.quantity, unit_price: l.unit_price }).collect();
        let mut order = Self {
            id: Uuid::now_v7().to_string(), customer_id: customer_id.into(), details, lines,
            total: cart.totals().total, status: OrderStatus::Pending, created_at: now,
            updated_at: None, delivered_at: None, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: order.id.clone(), customer_id: order.customer_id.clone(), total: order.total });
        Ok(order)
    }

    pub fn from_parts(parts: OrderParts) -> Self {
        Self {
            id: parts.id, customer_id: parts.customer_id, details: parts.details, lines: parts.lines,
            total: parts.total, status: parts.status, created_at: parts.created_at,
            updated_at: parts.updated_at, delivered_at: parts.delivered_at, events: vec![],
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn details(&self) -> &CheckoutDetails { &self.details }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn total(&self) -> Money { self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> Option<DateTime<Utc>> { self.updated_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }

    pub fn can_cancel(&self, policy: &LifecyclePolicy) -> bool { policy.cancel.allows(self.status) }

    pub fn return_window(&self, policy: &LifecyclePolicy, now: DateTime<Utc>) -> ReturnWindow {
        if self.status != OrderStatus::Delivered { return ReturnWindow::CLOSED; }
        match (self.delivered_at, policy.missing_delivery_date) {
            (Some(at), _) => ReturnWindow::compute(at, now, policy.return_window_days),
            (None, MissingDeliveryDate::FullWindow) => ReturnWindow::compute(now, now, policy.return_window_days),
            (None, MissingDeliveryDate::Closed) => ReturnWindow::CLOSED,
        }
    }

    pub fn cancel_by_customer(&mut self, reason: &str, policy: &LifecyclePolicy, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.can_cancel(policy) { return Err(OrderError::NotCancellable(self.status)); }
        let reason = checked_reason(reason)?;
        self.transition(OrderStatus::Cancelled, now);
        self.raise_event(OrderEvent::Cancelled { order_id: self.id.clone(), customer_id: self.customer_id.clone(), reason });
        Ok(())
    }

    pub fn return_by_customer(&mut self, reason: &str, policy: &LifecyclePolicy, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered { return Err(OrderError::NotReturnable(self.status)); }
        if !self.return_window(policy, now).can_return { return Err(OrderError::ReturnWindowClosed); }
        let reason = checked_reason(reason)?;
        self.transition(OrderStatus::Returned, now);
        self.raise_event(OrderEvent::Returned { order_id: self.id.clone(), customer_id: self.customer_id.clone(), reason });
        Ok(())
    }

    /// Administrators may move a live order to any status, forwards or back.
    /// Returns `false` when the order already had that status.
    pub fn set_status_by_admin(&mut self, status: OrderStatus, now: DateTime<Utc>) -> Result<bool, OrderError> {
        if self.status == status { return Ok(false); }
        if self.status.is_terminal() { return Err(OrderError::Terminal(self.status)); }
        self.transition(status, now);
        if status == OrderStatus::Delivered {
            self.delivered_at = Some(now);
            self.raise_event(OrderEvent::Delivered {
                order_id: self.id.clone(), email: self.details.email.clone(),
                customer_name: self.details.customer_name.clone(), total: self.total, at: now,
            });
        }
        Ok(true)
    }

    fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) {
        let from = std::mem::replace(&mut self.status, to);
        self.updated_at = Some(now);
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id.clone(), from, to });
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("No items")]
    NoItems,
    #[error("Order cannot be cancelled while {0}")]
    NotCancellable(OrderStatus),
    #[error("Order cannot be returned while {0}")]
    NotReturnable(OrderStatus),
    #[error("Return window has closed")]
    ReturnWindowClosed,
    #[error("Reason must be at least {min} characters")]
    ReasonTooShort { min: u64 },
    #[error("Order is {0} and can no longer change status")]
    Terminal(OrderStatus),
    #[error("Unknown order status {0:?}")]
    UnknownStatus(String),
    #[error("Invalid checkout details: {0}")]
    InvalidDetails(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use crate::domain::aggregates::product::Product;

    pub(crate) fn details() -> CheckoutDetails {
        CheckoutDetails {
            customer_name: "Ada Laurent".into(), email: "ada@example.com".into(), phone: "+33 6 12 34 56".into(),
            delivery_method: DeliveryMethod::Express, payment_method: PaymentMethod::Card,
        }
    }

    fn cart() -> Cart {
        let p = Product::new(ProductId::from(1), "Watch", Decimal::new(100, 0)).unwrap();
        Cart::new().add_item(&p).add_item(&p)
    }

    fn delivered(at: Option<DateTime<Utc>>) -> Order {
        let mut order = Order::place("CUST001", details(), &cart(), Utc::now()).unwrap();
        order.status = OrderStatus::Delivered;
        order.delivered_at = at;
        order
    }

    #[test]
    fn test_place_snapshots_total() {
        let mut order = Order::place("CUST001", details(), &cart(), Utc::now()).unwrap();
        assert_eq!(order.total(), Money::from_units(200));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(matches!(order.take_events().as_slice(), [OrderEvent::Placed { .. }]));
    }

    #[test]
    fn test_place_rejects_empty_cart_and_bad_email() {
        assert_eq!(Order::place("C", details(), &Cart::new(), Utc::now()).unwrap_err(), OrderError::NoItems);
        let mut bad = details();
        bad.email = "not-an-email".into();
        assert!(matches!(Order::place("C", bad, &cart(), Utc::now()), Err(OrderError::InvalidDetails(_))));
    }

    #[test]
    fn test_return_window_boundary() {
        let now = Utc::now();
        let policy = LifecyclePolicy::default();
        let four = delivered(Some(now - Duration::days(4))).return_window(&policy, now);
        assert_eq!(four, ReturnWindow { days_remaining: 1, can_return: true });
        let five = delivered(Some(now - Duration::days(5))).return_window(&policy, now);
        assert_eq!(five, ReturnWindow { days_remaining: 0, can_return: false });
        let long_ago = delivered(Some(now - Duration::days(30))).return_window(&policy, now);
        assert_eq!(long_ago, ReturnWindow::CLOSED);
    }

    #[test]
    fn test_missing_delivery_date_policy() {
        let now = Utc::now();
        let order = delivered(None);
        assert_eq!(order.return_window(&LifecyclePolicy::default(), now).days_remaining, 5);
        let strict = LifecyclePolicy { missing_delivery_date: MissingDeliveryDate::Closed, ..LifecyclePolicy::default() };
        assert!(!order.return_window(&strict, now).can_return);
    }

    #[test]
    fn test_cancel_policy() {
        let policy = LifecyclePolicy::default();
        let pending_only = LifecyclePolicy { cancel: CancelPolicy::PendingOnly, ..policy };
        let mut order = Order::place("C", details(), &cart(), Utc::now()).unwrap();
        order.set_status_by_admin(OrderStatus::Shipped, Utc::now()).unwrap();
        assert!(order.can_cancel(&policy));
        assert!(!order.can_cancel(&pending_only));
        order.cancel_by_customer("Changed my mind entirely", &policy, Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_cancel_requires_reason() {
        let mut order = Order::place("C", details(), &cart(), Utc::now()).unwrap();
        let err = order.cancel_by_customer("   too short   ", &LifecyclePolicy::default(), Utc::now()).unwrap_err();
        assert_eq!(err, OrderError::ReasonTooShort { min: MIN_REASON_CHARS });
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let now = Utc::now();
        let policy = LifecyclePolicy::default();
        let mut order = Order::place("C", details(), &cart(), now).unwrap();
        order.cancel_by_customer("Ordered the wrong size", &policy, now).unwrap();
        for status in OrderStatus::ALL.into_iter().filter(|s| *s != OrderStatus::Cancelled) {
            assert_eq!(order.set_status_by_admin(status, now), Err(OrderError::Terminal(OrderStatus::Cancelled)));
        }
        assert!(order.cancel_by_customer("Ordered the wrong size", &policy, now).is_err());
        assert!(order.return_by_customer("Ordered the wrong size", &policy, now).is_err());
    }

    #[test]
    fn test_admin_delivery_records_timestamp_and_event() {
        let now = Utc::now();
        let mut order = Order::place("C", details(), &cart(), now).unwrap();
        order.take_events();
        assert!(order.set_status_by_admin(OrderStatus::Delivered, now).unwrap());
        assert_eq!(order.delivered_at(), Some(now));
        let events = order.take_events();
        assert!(events.iter().any(|e| matches!(e, OrderEvent::Delivered { email, .. } if email == "ada@example.com")));
        assert!(!order.set_status_by_admin(OrderStatus::Delivered, now).unwrap());
    }

    #[test]
    fn test_return_within_window() {
        let now = Utc::now();
        let policy = LifecyclePolicy::default();
        let mut late = delivered(Some(now - Duration::days(6)));
        assert_eq!(late.return_by_customer("Stitching came loose", &policy, now), Err(OrderError::ReturnWindowClosed));
        let mut fresh = delivered(Some(now - Duration::days(1)));
        fresh.return_by_customer("Stitching came loose", &policy, now).unwrap();
        assert_eq!(fresh.status(), OrderStatus::Returned);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
