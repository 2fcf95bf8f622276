//! Maison Storefront
//!
//! Shopping-cart synchronisation and order lifecycle for a luxury storefront,
//! plus the small mail relay sidecar that sends one-time codes and order
//! status emails.
//!
//! ## Features
//! - Cart mutations with local persistence and best-effort remote mirroring
//! - Sign-in reconciliation between the local and per-user remote cart
//! - Checkout with price and total snapshots
//! - Order status state machine with cancel/return eligibility windows
//! - Admin inbox for cancel, return and support messages
//! - Mail relay (`/send-otp`, `/verify-otp`, `/send-status-update`)

pub mod cart;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod inbox;
pub mod notify;
pub mod orders;
pub mod relay;
pub mod session;
pub mod storage;
pub mod storefront;

pub use cart::{CartService, ReconcileOutcome};
pub use checkout::{CheckoutError, CheckoutService};
pub use domain::aggregates::{Cart, CartLine, CartTotals, Order, OrderStatus, Product};
pub use domain::value_objects::{Money, ProductId, Quantity};
pub use inbox::InboxService;
pub use orders::OrderService;
pub use session::SessionContext;
pub use storefront::Storefront;

use thiserror::Error;
use crate::domain::value_objects::ValueError;

// =============================================================================
// Error Types
// =============================================================================

/// Failures of the hosted storage collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found")]
    NotFound,

    #[error("Stored record is invalid: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ValueError> for StoreError {
    fn from(e: ValueError) -> Self { StoreError::Corrupt(e.to_string()) }
}
