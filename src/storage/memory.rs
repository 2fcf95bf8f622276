//! In-process implementations of the hosted collaborators.
//!
//! Used for anonymous/offline runs and throughout the tests. Each store can be
//! switched offline to exercise the degraded paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use crate::domain::aggregates::{AdminMessage, CartLine, Order};
use crate::domain::value_objects::ProductId;
use crate::StoreError;
use super::{MessageStore, OrderStore, RemoteCartStore};

#[derive(Debug, Default)]
struct Availability(AtomicBool);

impl Availability {
    fn set_offline(&self, offline: bool) { self.0.store(offline, Ordering::SeqCst); }
    fn check(&self) -> Result<(), StoreError> {
        if self.0.load(Ordering::SeqCst) { return Err(StoreError::Unavailable("store is offline".into())); }
        Ok(())
    }
}

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

#[derive(Debug, Default)]
pub struct MemoryRemoteCartStore {
    rows: Mutex<HashMap<String, Vec<CartLine>>>,
    offline: Availability,
    fetches: AtomicUsize,
}

impl MemoryRemoteCartStore {
    pub fn new() -> Self { Self::default() }
    pub fn set_offline(&self, offline: bool) { self.offline.set_offline(offline); }
    pub fn fetch_count(&self) -> usize { self.fetches.load(Ordering::SeqCst) }
    pub fn lines_for(&self, user_id: &str) -> Vec<CartLine> { locked(&self.rows).get(user_id).cloned().unwrap_or_default() }
    pub fn seed(&self, user_id: &str, lines: Vec<CartLine>) { locked(&self.rows).insert(user_id.to_string(), lines); }
}

#[async_trait]
impl RemoteCartStore for MemoryRemoteCartStore {
    async fn fetch_by_user(&self, user_id: &str) -> Result<Vec<CartLine>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.offline.check()?;
        Ok(self.lines_for(user_id))
    }

    async fn upsert_line(&self, user_id: &str, line: &CartLine) -> Result<(), StoreError> {
        self.offline.check()?;
        let mut rows = locked(&self.rows);
        let lines = rows.entry(user_id.to_string()).or_default();
        match lines.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => *existing = line.clone(),
            None => lines.push(line.clone()),
        }
        Ok(())
    }

    async fn delete_line(&self, user_id: &str, product_id: &ProductId) -> Result<(), StoreError> {
        self.offline.check()?;
        if let Some(lines) = locked(&self.rows).get_mut(user_id) {
            lines.retain(|l| &l.product_id != product_id);
        }
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<(), StoreError> {
        self.offline.check()?;
        locked(&self.rows).remove(user_id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: Mutex<Vec<Order>>,
    offline: Availability,
}

impl MemoryOrderStore {
    pub fn new() -> Self { Self::default() }
    pub fn set_offline(&self, offline: bool) { self.offline.set_offline(offline); }
    pub fn len(&self) -> usize { locked(&self.orders).len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn stored(order: &Order) -> Order {
        let mut copy = order.clone();
        copy.take_events();
        copy
    }

    fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        orders
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.offline.check()?;
        locked(&self.orders).push(Self::stored(order));
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        self.offline.check()?;
        Ok(locked(&self.orders).iter().find(|o| o.id() == order_id).cloned())
    }

    async fn update_status(&self, order: &Order) -> Result<(), StoreError> {
        self.offline.check()?;
        let mut orders = locked(&self.orders);
        let slot = orders.iter_mut().find(|o| o.id() == order.id()).ok_or(StoreError::NotFound)?;
        *slot = Self::stored(order);
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, StoreError> {
        self.offline.check()?;
        let orders = locked(&self.orders).iter().filter(|o| o.customer_id() == customer_id).cloned().collect();
        Ok(Self::newest_first(orders))
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        self.offline.check()?;
        Ok(Self::newest_first(locked(&self.orders).clone()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<AdminMessage>>,
    offline: Availability,
}

impl MemoryMessageStore {
    pub fn new() -> Self { Self::default() }
    pub fn set_offline(&self, offline: bool) { self.offline.set_offline(offline); }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: &AdminMessage) -> Result<(), StoreError> {
        self.offline.check()?;
        locked(&self.messages).push(message.clone());
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<AdminMessage>, StoreError> {
        self.offline.check()?;
        Ok(locked(&self.messages).iter().find(|m| m.id == message_id).cloned())
    }

    async fn save(&self, message: &AdminMessage) -> Result<(), StoreError> {
        self.offline.check()?;
        let mut messages = locked(&self.messages);
        let slot = messages.iter_mut().find(|m| m.id == message.id).ok_or(StoreError::NotFound)?;
        *slot = message.clone();
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<AdminMessage>, StoreError> {
        self.offline.check()?;
        Ok(locked(&self.messages).iter().filter(|m| m.customer_id == customer_id).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<AdminMessage>, StoreError> {
        self.offline.check()?;
        Ok(locked(&self.messages).clone())
    }
}
