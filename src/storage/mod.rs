//! Storage collaborators
//!
//! The local cart slot is synchronous and infallible from the caller's point
//! of view. Everything else lives in the hosted backend and is async.

pub mod local;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use crate::domain::aggregates::{AdminMessage, Cart, CartLine, Order};
use crate::domain::value_objects::ProductId;
use crate::StoreError;

pub use local::{FileCartStore, MemoryCartSlot};
pub use memory::{MemoryMessageStore, MemoryOrderStore, MemoryRemoteCartStore};
pub use postgres::{PgMessageStore, PgOrderStore, PgRemoteCartStore};

/// Durable per-device cart slot.
pub trait LocalCartStore: Send + Sync {
    /// Missing or unreadable data yields an empty cart.
    fn load(&self) -> Cart;
    /// Overwrites the slot. Failures are logged, not returned.
    fn save(&self, cart: &Cart);
    fn clear(&self);
}

/// Per-user cart table keyed by `(user_id, product_id)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    async fn fetch_by_user(&self, user_id: &str) -> Result<Vec<CartLine>, StoreError>;
    /// Writes the line's absolute quantity, replacing any existing row for the pair.
    async fn upsert_line(&self, user_id: &str, line: &CartLine) -> Result<(), StoreError>;
    async fn delete_line(&self, user_id: &str, product_id: &ProductId) -> Result<(), StoreError>;
    async fn delete_all(&self, user_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order together with its lines, all or nothing.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;
    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError>;
    async fn update_status(&self, order: &Order) -> Result<(), StoreError>;
    /// Newest first.
    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, StoreError>;
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: &AdminMessage) -> Result<(), StoreError>;
    async fn get(&self, message_id: &str) -> Result<Option<AdminMessage>, StoreError>;
    async fn save(&self, message: &AdminMessage) -> Result<(), StoreError>;
    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<AdminMessage>, StoreError>;
    async fn list_all(&self) -> Result<Vec<AdminMessage>, StoreError>;
}
