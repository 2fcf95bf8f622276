//! Cart service: mutations, local persistence, remote mirroring and
//! sign-in reconciliation.
//!
//! The local cart is the source of truth for rendering. Each mutation is
//! saved to the local slot before the call returns. Once the signed-in user's
//! cart has been reconciled, the touched line is mirrored to the remote store
//! on a background task; mirror failures are logged and never undo the local
//! change.
//!
//! Mirror tasks run one after another in the order they were queued, and
//! read the line's quantity when they run, so a late write still carries the
//! newest absolute quantity and remote rows keep the local line order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::domain::aggregates::{Cart, CartTotals, Product};
use crate::domain::value_objects::ProductId;
use crate::session::SessionContext;
use crate::storage::{LocalCartStore, RemoteCartStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Remote lines matched the local cart; nothing was replaced.
    Unchanged,
    /// Local cart replaced with the remote lines.
    Replaced { lines: usize },
    /// Remote was empty; local lines are being pushed up.
    PushedLocal { lines: usize },
    /// Remote fetch failed; local cart kept.
    KeptLocal,
    /// This session was already reconciled.
    AlreadyReconciled,
    /// A reconciliation for the same user is running.
    InFlight,
    /// A sign-out or another sign-in happened while the fetch was pending; its result was dropped.
    Superseded,
    SignedOut,
    Anonymous,
}

#[derive(Debug, Default)]
struct CartState {
    cart: Cart,
    revision: u64,
    /// User whose sign-in is being reconciled or has been reconciled.
    target: Option<String>,
    /// Set once `target`'s reconciliation has finished. Mirroring only runs for this user.
    session_user: Option<String>,
    /// Bumped on every sign-in and sign-out.
    epoch: u64,
}

enum MirrorOp {
    Sync(ProductId),
    DeleteAll,
}

/// Releases an unfinished sign-in when the reconciliation future is dropped.
struct ReconcileGuard<'a> {
    state: &'a Mutex<CartState>,
    epoch: u64,
    finished: bool,
}

impl Drop for ReconcileGuard<'_> {
    fn drop(&mut self) {
        if self.finished { return; }
        let mut state = lock(self.state);
        if state.epoch == self.epoch && state.session_user.is_none() {
            state.target = None;
        }
    }
}

pub struct CartService {
    local: Arc<dyn LocalCartStore>,
    remote: Arc<dyn RemoteCartStore>,
    state: Arc<Mutex<CartState>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
    /// Completion signal of the most recently queued mirror task.
    mirror_tail: Mutex<Option<oneshot::Receiver<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

impl CartService {
    /// Starts from whatever the local slot holds.
    pub fn new(local: Arc<dyn LocalCartStore>, remote: Arc<dyn RemoteCartStore>) -> Self {
        let cart = local.load();
        Self {
            local, remote,
            state: Arc::new(Mutex::new(CartState { cart, ..CartState::default() })),
            pending: Mutex::new(Vec::new()),
            mirror_tail: Mutex::new(None),
        }
    }

    pub fn cart(&self) -> Cart { lock(&self.state).cart.clone() }
    pub fn totals(&self) -> CartTotals { lock(&self.state).cart.totals() }
    /// Bumped on every change to the cart held by the service.
    pub fn revision(&self) -> u64 { lock(&self.state).revision }
    /// The user whose cart has been reconciled, if any.
    pub fn session_user(&self) -> Option<String> { lock(&self.state).session_user.clone() }

    pub fn add_item(&self, session: Option<&SessionContext>, product: &Product) -> Cart {
        let cart = self.apply(|c| c.add_item(product));
        self.mirror(session, MirrorOp::Sync(product.id().clone()));
        cart
    }

    /// Sets an absolute quantity (clamped to at least one).
    pub fn set_quantity(&self, session: Option<&SessionContext>, product_id: &ProductId, quantity: i64) -> Cart {
        let cart = self.apply(|c| c.set_quantity(product_id, quantity));
        self.mirror(session, MirrorOp::Sync(product_id.clone()));
        cart
    }

    /// One more unit, computed from the quantity held right now.
    pub fn increment(&self, session: Option<&SessionContext>, product_id: &ProductId) -> Cart {
        self.step(session, product_id, 1)
    }

    /// One fewer unit, never below one.
    pub fn decrement(&self, session: Option<&SessionContext>, product_id: &ProductId) -> Cart {
        self.step(session, product_id, -1)
    }

    pub fn remove_item(&self, session: Option<&SessionContext>, product_id: &ProductId) -> Cart {
        let cart = self.apply(|c| c.remove_item(product_id));
        self.mirror(session, MirrorOp::Sync(product_id.clone()));
        cart
    }

    pub fn clear(&self, session: Option<&SessionContext>) -> Cart {
        let cart = self.apply(Cart::clear);
        self.local.clear();
        self.mirror(session, MirrorOp::DeleteAll);
        cart
    }

    /// Takes the units of an order out of the cart. Anything added while the
    /// order was being written stays.
    pub fn remove_ordered(&self, session: Option<&SessionContext>, ordered: &Cart) -> Cart {
        let cart = self.apply(|c| c.subtract(ordered));
        if cart.is_empty() {
            self.local.clear();
            self.mirror(session, MirrorOp::DeleteAll);
        } else {
            for line in ordered.lines() {
                self.mirror(session, MirrorOp::Sync(line.product_id.clone()));
            }
        }
        cart
    }

    fn step(&self, session: Option<&SessionContext>, product_id: &ProductId, delta: i64) -> Cart {
        let cart = self.apply(|c| match c.quantity_of(product_id) {
            Some(q) => c.set_quantity(product_id, i64::from(q.value()) + delta),
            None => c.clone(),
        });
        self.mirror(session, MirrorOp::Sync(product_id.clone()));
        cart
    }

    /// Computes the next cart from the current one and saves it locally before returning.
    fn apply(&self, f: impl FnOnce(&Cart) -> Cart) -> Cart {
        let mut state = lock(&self.state);
        let next = f(&state.cart);
        if next != state.cart {
            self.local.save(&next);
            state.cart = next;
            state.revision += 1;
        }
        state.cart.clone()
    }

    fn mirror(&self, session: Option<&SessionContext>, op: MirrorOp) {
        let Some(session) = session else { return };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(user_id = %session.user_id, "no async runtime; cart change stays local");
            return;
        };

        let user_id = session.user_id.clone();
        let remote = Arc::clone(&self.remote);
        let state = Arc::clone(&self.state);
        let (done, finished) = oneshot::channel::<()>();
        let previous = lock(&self.mirror_tail).replace(finished);
        let handle = runtime.spawn(async move {
            if let Some(previous) = previous {
                // resolves on completion, or on drop if that task panicked
                let _ = previous.await;
            }
            let line = {
                let state = lock(&state);
                if state.session_user.as_deref() != Some(user_id.as_str()) {
                    debug!(user_id = %user_id, "cart not reconciled for this user; mirror skipped");
                    return;
                }
                match &op {
                    MirrorOp::Sync(product_id) => state.cart.line(product_id).cloned(),
                    MirrorOp::DeleteAll => None,
                }
            };
            let result = match (op, line) {
                (MirrorOp::Sync(_), Some(line)) => remote.upsert_line(&user_id, &line).await,
                (MirrorOp::Sync(product_id), None) => remote.delete_line(&user_id, &product_id).await,
                (MirrorOp::DeleteAll, _) => remote.delete_all(&user_id).await,
            };
            match result {
                Ok(()) => debug!(user_id = %user_id, "remote cart mirrored"),
                Err(e) => warn!(user_id = %user_id, error = %e, "remote cart mirror failed; local cart kept"),
            }
            let _ = done.send(());
        });

        let mut pending = lock(&self.pending);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Waits for every queued mirror write to finish.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.pending));
            if handles.is_empty() { return; }
            for handle in handles {
                if let Err(e) = handle.await { warn!(error = %e, "mirror task panicked"); }
            }
        }
    }

    /// Reacts to a change of signed-in identity.
    ///
    /// A new user triggers exactly one reconciliation: the remote lines are
    /// fetched and replace the local cart if they differ. Repeated calls for
    /// the same user are no-ops, and a call for the user whose fetch is still
    /// running returns [`ReconcileOutcome::InFlight`] without fetching.
    /// A sign-out or a different user's sign-in supersedes a pending fetch,
    /// whose result is then discarded. Signing out, or switching straight to
    /// another user, clears the local cart and leaves the remote cart alone.
    pub async fn on_session_change(&self, session: Option<&SessionContext>) -> ReconcileOutcome {
        let Some(session) = session else { return self.sign_out() };
        let epoch = {
            let mut state = lock(&self.state);
            if state.target.as_deref() == Some(session.user_id.as_str()) {
                if state.session_user.is_some() { return ReconcileOutcome::AlreadyReconciled; }
                debug!(user_id = %session.user_id, "reconciliation already in flight");
                return ReconcileOutcome::InFlight;
            }
            if let Some(previous) = state.target.take() {
                info!(from = %previous, to = %session.user_id, "signed-in user changed; local cart cleared");
                self.reset_local(&mut state);
            }
            state.target = Some(session.user_id.clone());
            state.session_user = None;
            state.epoch += 1;
            state.epoch
        };
        let mut guard = ReconcileGuard { state: &self.state, epoch, finished: false };
        let outcome = self.reconcile(session, epoch).await;
        guard.finished = true;
        outcome
    }

    async fn reconcile(&self, session: &SessionContext, epoch: u64) -> ReconcileOutcome {
        let fetched = self.remote.fetch_by_user(&session.user_id).await;
        let mut state = lock(&self.state);
        if state.epoch != epoch {
            debug!(user_id = %session.user_id, "session changed during fetch; remote cart discarded");
            return ReconcileOutcome::Superseded;
        }
        state.session_user = Some(session.user_id.clone());

        let lines = match fetched {
            Ok(lines) => lines,
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "remote cart fetch failed; keeping local cart");
                return ReconcileOutcome::KeptLocal;
            }
        };

        if lines.is_empty() {
            let local: Vec<ProductId> = state.cart.lines().iter().map(|l| l.product_id.clone()).collect();
            drop(state);
            if local.is_empty() { return ReconcileOutcome::Unchanged; }
            info!(user_id = %session.user_id, lines = local.len(), "remote cart empty; pushing local cart");
            let count = local.len();
            for product_id in local { self.mirror(Some(session), MirrorOp::Sync(product_id)); }
            return ReconcileOutcome::PushedLocal { lines: count };
        }

        let remote = Cart::from_lines(lines);
        if remote == state.cart {
            debug!(user_id = %session.user_id, "remote cart matches local cart");
            return ReconcileOutcome::Unchanged;
        }
        let count = remote.lines().len();
        self.local.save(&remote);
        state.cart = remote;
        state.revision += 1;
        info!(user_id = %session.user_id, lines = count, "local cart replaced from remote");
        ReconcileOutcome::Replaced { lines: count }
    }

    fn sign_out(&self) -> ReconcileOutcome {
        let mut state = lock(&self.state);
        let Some(user_id) = state.target.take() else { return ReconcileOutcome::Anonymous };
        state.session_user = None;
        state.epoch += 1;
        self.reset_local(&mut state);
        info!(user_id = %user_id, "signed out; local cart cleared");
        ReconcileOutcome::SignedOut
    }

    fn reset_local(&self, state: &mut CartState) {
        if !state.cart.is_empty() {
            state.cart = Cart::new();
            state.revision += 1;
        }
        self.local.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use crate::domain::aggregates::CartLine;
    use crate::storage::{MemoryCartSlot, MemoryRemoteCartStore, MockRemoteCartStore};
    use crate::StoreError;

    fn product(id: u64, price: i64) -> Product {
        Product::new(ProductId::from(id), format!("Item {id}"), Decimal::new(price, 0)).unwrap()
    }

    fn session() -> SessionContext { SessionContext::new("U1", "u1@example.com", "tok") }

    fn service(remote: Arc<dyn RemoteCartStore>) -> (CartService, Arc<MemoryCartSlot>) {
        let slot = Arc::new(MemoryCartSlot::new());
        (CartService::new(slot.clone(), remote), slot)
    }

    #[test]
    fn test_mutations_persist_locally_without_runtime() {
        let (svc, slot) = service(Arc::new(MemoryRemoteCartStore::new()));
        let p = product(1, 100);
        svc.add_item(Some(&session()), &p);
        svc.add_item(None, &p);
        assert_eq!(slot.load(), svc.cart());
        assert_eq!(svc.totals().count, 2);
    }

    #[test]
    fn test_set_quantity_clamps_and_remove() {
        let (svc, slot) = service(Arc::new(MemoryRemoteCartStore::new()));
        let p = product(1, 10);
        svc.add_item(None, &p);
        assert_eq!(svc.set_quantity(None, p.id(), -5).quantity_of(p.id()).unwrap().value(), 1);
        assert_eq!(svc.decrement(None, p.id()).quantity_of(p.id()).unwrap().value(), 1);
        svc.remove_item(None, p.id());
        assert!(slot.load().is_empty());
    }

    #[test]
    fn test_increments_read_current_quantity() {
        let (svc, _) = service(Arc::new(MemoryRemoteCartStore::new()));
        let p = product(1, 10);
        svc.add_item(None, &p);
        svc.set_quantity(None, p.id(), 5);
        let seen: Vec<u32> = (0..3).map(|_| svc.increment(None, p.id()).quantity_of(p.id()).unwrap().value()).collect();
        assert_eq!(seen, vec![6, 7, 8]);
    }

    #[test]
    fn test_unknown_product_is_not_a_change() {
        let (svc, _) = service(Arc::new(MemoryRemoteCartStore::new()));
        svc.set_quantity(None, &ProductId::from(99), 3);
        svc.increment(None, &ProductId::from(99));
        assert_eq!(svc.revision(), 0);
        assert!(svc.cart().is_empty());
    }

    #[tokio::test]
    async fn test_equal_remote_cart_leaves_revision_untouched() {
        let remote = Arc::new(MemoryRemoteCartStore::new());
        let (svc, _) = service(remote.clone());
        let p = product(1, 100);
        svc.add_item(None, &p);
        remote.seed("U1", svc.cart().into_lines());
        let before = svc.revision();
        assert_eq!(svc.on_session_change(Some(&session())).await, ReconcileOutcome::Unchanged);
        assert_eq!(svc.revision() - before, 0);
    }

    #[tokio::test]
    async fn test_different_remote_cart_replaces_local() {
        let remote = Arc::new(MemoryRemoteCartStore::new());
        let (svc, slot) = service(remote.clone());
        svc.add_item(None, &product(1, 100));
        let saved = Cart::new().add_item(&product(2, 50));
        remote.seed("U1", saved.clone().into_lines());
        assert_eq!(svc.on_session_change(Some(&session())).await, ReconcileOutcome::Replaced { lines: 1 });
        assert_eq!(svc.cart(), saved);
        assert_eq!(slot.load(), saved);
    }

    #[tokio::test]
    async fn test_reconciles_once_per_sign_in() {
        let remote = Arc::new(MemoryRemoteCartStore::new());
        let (svc, _) = service(remote.clone());
        svc.on_session_change(Some(&session())).await;
        assert_eq!(svc.on_session_change(Some(&session())).await, ReconcileOutcome::AlreadyReconciled);
        svc.add_item(Some(&session()), &product(1, 10));
        svc.settle().await;
        assert_eq!(remote.fetch_count(), 1);
        assert_eq!(remote.lines_for("U1").len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_local_cart() {
        let mut remote = MockRemoteCartStore::new();
        remote.expect_fetch_by_user().times(1).returning(|_| Err(StoreError::Unavailable("timeout".into())));
        let (svc, _) = service(Arc::new(remote));
        let p = product(1, 100);
        svc.add_item(None, &p);
        let before = svc.cart();
        assert_eq!(svc.on_session_change(Some(&session())).await, ReconcileOutcome::KeptLocal);
        assert_eq!(svc.cart(), before);
    }

    #[tokio::test]
    async fn test_mirror_failure_keeps_local_change() {
        let mut remote = MockRemoteCartStore::new();
        remote.expect_fetch_by_user().returning(|_| Ok(vec![]));
        remote.expect_upsert_line().times(1).returning(|_, _| Err(StoreError::Unavailable("offline".into())));
        let (svc, slot) = service(Arc::new(remote));
        svc.on_session_change(Some(&session())).await;
        let p = product(1, 100);
        svc.add_item(Some(&session()), &p);
        svc.settle().await;
        assert_eq!(svc.cart().quantity_of(p.id()).unwrap().value(), 1);
        assert_eq!(slot.load(), svc.cart());
    }

    #[tokio::test]
    async fn test_late_mirror_sends_latest_quantity() {
        let remote = Arc::new(MemoryRemoteCartStore::new());
        let (svc, _) = service(remote.clone());
        let s = session();
        svc.on_session_change(Some(&s)).await;
        let p = product(1, 10);
        svc.add_item(Some(&s), &p);
        svc.set_quantity(Some(&s), p.id(), 4);
        svc.set_quantity(Some(&s), p.id(), 2);
        svc.settle().await;
        assert_eq!(remote.lines_for("U1")[0].quantity.value(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_clears_local_only() {
        let remote = Arc::new(MemoryRemoteCartStore::new());
        let (svc, slot) = service(remote.clone());
        let s = session();
        svc.on_session_change(Some(&s)).await;
        svc.add_item(Some(&s), &product(1, 10));
        svc.settle().await;
        assert_eq!(svc.on_session_change(None).await, ReconcileOutcome::SignedOut);
        assert!(svc.cart().is_empty());
        assert_eq!(slot.raw(), None);
        assert_eq!(remote.lines_for("U1").len(), 1);
        assert_eq!(svc.on_session_change(None).await, ReconcileOutcome::Anonymous);
    }

    /// Holds every fetch until the test hands out a permit.
    struct GatedRemote {
        gate: Semaphore,
        fetches: AtomicUsize,
        inner: MemoryRemoteCartStore,
    }

    impl GatedRemote {
        fn new() -> Self { Self { gate: Semaphore::new(0), fetches: AtomicUsize::new(0), inner: MemoryRemoteCartStore::new() } }

        async fn wait_for_fetches(&self, n: usize) {
            while self.fetches.load(Ordering::SeqCst) < n { tokio::task::yield_now().await; }
        }
    }

    #[async_trait]
    impl RemoteCartStore for GatedRemote {
        async fn fetch_by_user(&self, user_id: &str) -> Result<Vec<CartLine>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            self.inner.fetch_by_user(user_id).await
        }
        async fn upsert_line(&self, user_id: &str, line: &CartLine) -> Result<(), StoreError> { self.inner.upsert_line(user_id, line).await }
        async fn delete_line(&self, user_id: &str, product_id: &ProductId) -> Result<(), StoreError> { self.inner.delete_line(user_id, product_id).await }
        async fn delete_all(&self, user_id: &str) -> Result<(), StoreError> { self.inner.delete_all(user_id).await }
    }

    #[tokio::test]
    async fn test_overlapping_reconciliations_fetch_once() {
        let remote = Arc::new(GatedRemote::new());
        let (svc, _) = service(remote.clone());
        let s = session();
        let (first, second) = tokio::join!(
            svc.on_session_change(Some(&s)),
            async {
                remote.wait_for_fetches(1).await;
                let outcome = svc.on_session_change(Some(&s)).await;
                remote.gate.add_permits(1);
                outcome
            },
        );
        assert_eq!(first, ReconcileOutcome::Unchanged);
        assert_eq!(second, ReconcileOutcome::InFlight);
        assert_eq!(remote.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sign_out_during_fetch_discards_remote_cart() {
        let remote = Arc::new(GatedRemote::new());
        remote.inner.seed("U1", Cart::new().add_item(&product(2, 50)).into_lines());
        let (svc, slot) = service(remote.clone());
        svc.add_item(None, &product(1, 10));
        let s = session();
        let (first, signed_out) = tokio::join!(
            svc.on_session_change(Some(&s)),
            async {
                remote.wait_for_fetches(1).await;
                let outcome = svc.on_session_change(None).await;
                remote.gate.add_permits(1);
                outcome
            },
        );
        assert_eq!(first, ReconcileOutcome::Superseded);
        assert_eq!(signed_out, ReconcileOutcome::SignedOut);
        assert!(svc.cart().is_empty());
        assert_eq!(slot.raw(), None);
        assert_eq!(svc.session_user(), None);

        remote.gate.add_permits(1);
        assert_eq!(svc.on_session_change(Some(&s)).await, ReconcileOutcome::Replaced { lines: 1 });
        assert_eq!(remote.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_user_switch_during_fetch_reconciles_new_user() {
        let remote = Arc::new(GatedRemote::new());
        remote.inner.seed("U1", Cart::new().add_item(&product(1, 10)).into_lines());
        let theirs = Cart::new().add_item(&product(2, 50));
        remote.inner.seed("U2", theirs.clone().into_lines());
        let (svc, _) = service(remote.clone());
        let a = session();
        let b = SessionContext::new("U2", "u2@example.com", "tok-2");
        let (first, second, ()) = tokio::join!(
            svc.on_session_change(Some(&a)),
            async {
                remote.wait_for_fetches(1).await;
                svc.on_session_change(Some(&b)).await
            },
            async {
                remote.wait_for_fetches(2).await;
                remote.gate.add_permits(2);
            },
        );
        assert_eq!(first, ReconcileOutcome::Superseded);
        assert_eq!(second, ReconcileOutcome::Replaced { lines: 1 });
        assert_eq!(svc.cart(), theirs);
        assert_eq!(svc.session_user().as_deref(), Some("U2"));

        svc.add_item(Some(&b), &product(3, 70));
        svc.settle().await;
        assert_eq!(remote.inner.lines_for("U2").len(), 2);
        assert_eq!(remote.inner.lines_for("U1").len(), 1);
    }

    #[tokio::test]
    async fn test_change_during_fetch_is_pushed_after_reconcile() {
        let remote = Arc::new(GatedRemote::new());
        let (svc, _) = service(remote.clone());
        let s = session();
        let p = product(1, 10);
        let (outcome, ()) = tokio::join!(
            svc.on_session_change(Some(&s)),
            async {
                remote.wait_for_fetches(1).await;
                svc.add_item(Some(&s), &p);
                remote.gate.add_permits(1);
            },
        );
        assert_eq!(outcome, ReconcileOutcome::PushedLocal { lines: 1 });
        svc.settle().await;
        let lines = remote.inner.lines_for("U1");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, *p.id());
    }

    /// Upserts of product 1 take longer than any other write.
    #[derive(Default)]
    struct SlowFirstRemote {
        inner: MemoryRemoteCartStore,
    }

    #[async_trait]
    impl RemoteCartStore for SlowFirstRemote {
        async fn fetch_by_user(&self, user_id: &str) -> Result<Vec<CartLine>, StoreError> { self.inner.fetch_by_user(user_id).await }
        async fn upsert_line(&self, user_id: &str, line: &CartLine) -> Result<(), StoreError> {
            if line.product_id == ProductId::from(1) {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            self.inner.upsert_line(user_id, line).await
        }
        async fn delete_line(&self, user_id: &str, product_id: &ProductId) -> Result<(), StoreError> { self.inner.delete_line(user_id, product_id).await }
        async fn delete_all(&self, user_id: &str) -> Result<(), StoreError> { self.inner.delete_all(user_id).await }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pushed_lines_keep_local_order() {
        let remote = Arc::new(SlowFirstRemote::default());
        let (svc, slot) = service(remote.clone());
        svc.add_item(None, &product(1, 10));
        svc.add_item(None, &product(2, 20));
        svc.add_item(None, &product(3, 30));
        let s = session();
        assert_eq!(svc.on_session_change(Some(&s)).await, ReconcileOutcome::PushedLocal { lines: 3 });
        svc.settle().await;
        let order: Vec<ProductId> = remote.inner.lines_for("U1").into_iter().map(|l| l.product_id).collect();
        assert_eq!(order, vec![ProductId::from(1), ProductId::from(2), ProductId::from(3)]);

        let next_visit = CartService::new(slot, remote);
        assert_eq!(next_visit.on_session_change(Some(&s)).await, ReconcileOutcome::Unchanged);
    }
}
