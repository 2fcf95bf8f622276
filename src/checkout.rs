//! Checkout: turn the current cart into an order.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use crate::cart::CartService;
use crate::domain::aggregates::{CheckoutDetails, Order, OrderError};
use crate::session::SessionContext;
use crate::storage::OrderStore;
use crate::StoreError;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Your order could not be placed, please try again ({0})")]
    Store(#[from] StoreError),
}

pub struct CheckoutService {
    cart: Arc<CartService>,
    orders: Arc<dyn OrderStore>,
}

impl CheckoutService {
    pub fn new(cart: Arc<CartService>, orders: Arc<dyn OrderStore>) -> Self { Self { cart, orders } }

    /// Places an order for the signed-in customer.
    ///
    /// Lines and total are snapshotted from the cart. The snapshotted units
    /// leave both carts only after the order is stored; anything added while
    /// the write was pending stays. A failed write leaves the cart intact so
    /// the customer can retry.
    pub async fn place_order(&self, session: &SessionContext, details: CheckoutDetails, now: DateTime<Utc>) -> Result<Order, CheckoutError> {
        let cart = self.cart.cart();
        let mut order = Order::place(&session.user_id, details, &cart, now)?;

        if let Err(e) = self.orders.insert(&order).await {
            error!(user_id = %session.user_id, error = %e, "failed to store order");
            return Err(e.into());
        }

        self.cart.remove_ordered(Some(session), &cart);
        order.take_events();
        info!(user_id = %session.user_id, order_id = %order.id(), total = %order.total(), "order placed");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use crate::domain::aggregates::order::tests::details;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::{Money, ProductId};
    use crate::storage::{MemoryCartSlot, MemoryOrderStore, MemoryRemoteCartStore};

    struct Fixture { cart: Arc<CartService>, orders: Arc<MemoryOrderStore>, remote: Arc<MemoryRemoteCartStore>, checkout: CheckoutService }

    async fn fixture() -> Fixture {
        let remote = Arc::new(MemoryRemoteCartStore::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let cart = Arc::new(CartService::new(Arc::new(MemoryCartSlot::new()), remote.clone()));
        cart.on_session_change(Some(&session())).await;
        let checkout = CheckoutService::new(cart.clone(), orders.clone());
        Fixture { cart, orders, remote, checkout }
    }

    fn session() -> SessionContext { SessionContext::new("U1", "ada@example.com", "tok") }

    #[tokio::test]
    async fn test_place_order_snapshots_and_clears() {
        let f = fixture().await;
        let p = Product::new(ProductId::from(1), "Bag", Decimal::new(120, 0)).unwrap();
        f.cart.add_item(Some(&session()), &p);
        let order = f.checkout.place_order(&session(), details(), Utc::now()).await.unwrap();
        f.cart.settle().await;
        assert_eq!(order.total(), Money::from_units(120));
        assert!(f.cart.cart().is_empty());
        assert!(f.remote.lines_for("U1").is_empty());
        assert_eq!(f.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cart() {
        let f = fixture().await;
        let p = Product::new(ProductId::from(1), "Bag", Decimal::new(120, 0)).unwrap();
        f.cart.add_item(Some(&session()), &p);
        f.orders.set_offline(true);
        let err = f.checkout.place_order(&session(), details(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Store(_)));
        assert_eq!(f.cart.totals().count, 1);
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let f = fixture().await;
        let err = f.checkout.place_order(&session(), details(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Order(OrderError::NoItems)));
        assert!(f.orders.is_empty());
    }

    /// Holds each insert until a permit is added.
    struct GatedOrders {
        gate: Semaphore,
        inserts: AtomicUsize,
        inner: MemoryOrderStore,
    }

    #[async_trait]
    impl OrderStore for GatedOrders {
        async fn insert(&self, order: &Order) -> Result<(), StoreError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            self.inner.insert(order).await
        }
        async fn get(&self, order_id: &str) -> Result<Option<Order>, StoreError> { self.inner.get(order_id).await }
        async fn update_status(&self, order: &Order) -> Result<(), StoreError> { self.inner.update_status(order).await }
        async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, StoreError> { self.inner.list_for_customer(customer_id).await }
        async fn list_all(&self) -> Result<Vec<Order>, StoreError> { self.inner.list_all().await }
    }

    #[tokio::test]
    async fn test_item_added_while_storing_order_stays_in_cart() {
        let remote = Arc::new(MemoryRemoteCartStore::new());
        let cart = Arc::new(CartService::new(Arc::new(MemoryCartSlot::new()), remote.clone()));
        cart.on_session_change(Some(&session())).await;
        let orders = Arc::new(GatedOrders { gate: Semaphore::new(0), inserts: AtomicUsize::new(0), inner: MemoryOrderStore::new() });
        let checkout = CheckoutService::new(cart.clone(), orders.clone());
        let bag = Product::new(ProductId::from(1), "Bag", Decimal::new(120, 0)).unwrap();
        let belt = Product::new(ProductId::from(2), "Belt", Decimal::new(80, 0)).unwrap();
        cart.add_item(Some(&session()), &bag);

        let sess = session();
        let (placed, ()) = tokio::join!(
            checkout.place_order(&sess, details(), Utc::now()),
            async {
                while orders.inserts.load(Ordering::SeqCst) == 0 { tokio::task::yield_now().await; }
                cart.add_item(Some(&session()), &belt);
                cart.add_item(Some(&session()), &bag);
                orders.gate.add_permits(1);
            },
        );
        cart.settle().await;
        assert_eq!(placed.unwrap().total(), Money::from_units(120));
        let left = cart.cart();
        assert_eq!(left.totals().count, 2);
        assert_eq!(left.quantity_of(bag.id()).unwrap().value(), 1);
        assert_eq!(left.quantity_of(belt.id()).unwrap().value(), 1);
        let mirrored = remote.lines_for("U1");
        assert_eq!(mirrored.len(), 2);
        assert!(mirrored.iter().all(|l| l.quantity.value() == 1));
    }
}
