//! Domain events
use chrono::{DateTime, Utc};
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Placed { order_id: String, customer_id: String, total: Money },
    StatusChanged { order_id: String, from: OrderStatus, to: OrderStatus },
    Delivered { order_id: String, email: String, customer_name: String, total: Money, at: DateTime<Utc> },
    Cancelled { order_id: String, customer_id: String, reason: String },
    Returned { order_id: String, customer_id: String, reason: String },
}

