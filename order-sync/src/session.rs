//! Per-owner session context
//!
//! One [`OrderSession`] per signed-in user. It wires the four components
//! to the same collaborators and scopes every call to its owner, so screens
//! never pass an owner id around.

use crate::cart::CartStore;
use crate::checkout::{CheckoutOrchestrator, CheckoutPhase, PendingPayment};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::ledger::{LedgerSubscription, OrderLedger};
use crate::remote::Remotes;
use crate::reorder::ReorderResolver;
use parking_lot::Mutex;
use shared::models::{Cart, DishMeta, LedgerView, PaymentSignal, ReorderOutcome};

/// Order lifecycle context for one owner
#[derive(Debug)]
pub struct OrderSession {
    owner_id: String,
    carts: CartStore,
    ledger: OrderLedger,
    checkout: CheckoutOrchestrator,
    reorder: ReorderResolver,
    subscription: Mutex<Option<LedgerSubscription>>,
}

impl OrderSession {
    pub fn new(owner_id: impl Into<String>, remotes: Remotes, config: &SyncConfig) -> Self {
        let owner_id = owner_id.into();
        let carts = CartStore::new(remotes.carts.clone());
        let ledger = OrderLedger::new(remotes.orders.clone(), remotes.channel.clone(), config.classifier());
        let checkout = CheckoutOrchestrator::new(
            remotes.orders.clone(),
            remotes.payments.clone(),
            ledger.clone(),
            config,
        );
        let reorder = ReorderResolver::new(ledger.clone(), remotes.catalog.clone(), carts.clone());

        tracing::debug!(owner_id = %owner_id, "Order session created");
        Self {
            owner_id,
            carts,
            ledger,
            checkout,
            reorder,
            subscription: Mutex::new(None),
        }
    }

    /// Display name sent with cart deltas
    pub fn with_owner_name(self, name: impl Into<String>) -> Self {
        self.carts.set_owner_name(&self.owner_id, name);
        self
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn carts(&self) -> &CartStore {
        &self.carts
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.checkout
    }

    pub fn reorder_resolver(&self) -> &ReorderResolver {
        &self.reorder
    }

    // ========== Cart ==========

    pub async fn add_to_cart(
        &self,
        restaurant_id: &str,
        dish_id: &str,
        meta: &DishMeta,
        delta: i32,
    ) -> SyncResult<Cart> {
        self.carts
            .apply_delta(&self.owner_id, restaurant_id, dish_id, meta, delta)
            .await
    }

    pub async fn cart(&self) -> SyncResult<Cart> {
        self.carts.snapshot(&self.owner_id).await
    }

    pub async fn clear_cart(&self) -> SyncResult<()> {
        self.carts.clear(&self.owner_id).await
    }

    // ========== Checkout ==========

    pub async fn checkout_cart(&self) -> SyncResult<PendingPayment> {
        self.checkout.checkout(&self.owner_id).await
    }

    pub async fn complete_payment(&self, signal: PaymentSignal) -> SyncResult<CheckoutPhase> {
        self.checkout.complete_payment(&self.owner_id, signal).await
    }

    pub async fn retry_payment(&self, internal_order_id: &str) -> SyncResult<PendingPayment> {
        self.checkout
            .retry_payment(&self.owner_id, internal_order_id)
            .await
    }

    pub fn checkout_phase(&self) -> CheckoutPhase {
        self.checkout.phase(&self.owner_id)
    }

    // ========== Ledger ==========

    pub async fn refresh_orders(&self) -> SyncResult<LedgerView> {
        self.ledger.refresh(&self.owner_id).await
    }

    pub fn orders(&self) -> LedgerView {
        self.ledger.view(&self.owner_id)
    }

    /// Start live order updates, replacing any previous watch
    pub async fn watch_orders<F>(&self, on_update: F) -> SyncResult<()>
    where
        F: FnMut(&LedgerView) + Send + 'static,
    {
        let subscription = self.ledger.subscribe(&self.owner_id, on_update).await?;
        if let Some(previous) = self.subscription.lock().replace(subscription) {
            previous.cancel();
        }
        Ok(())
    }

    /// Stop live order updates; no callback fires after this returns
    pub fn stop_watching(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.cancel();
            tracing::debug!(owner_id = %self.owner_id, "Order watch stopped");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(LedgerSubscription::is_active)
    }

    // ========== Reorder ==========

    pub async fn reorder(&self, internal_order_id: &str, force_add: bool) -> SyncResult<ReorderOutcome> {
        self.reorder
            .reorder(&self.owner_id, internal_order_id, force_add)
            .await
    }

    /// Stop watching and drop the session
    pub fn close(self) {
        self.stop_watching();
        tracing::debug!(owner_id = %self.owner_id, "Order session closed");
    }
}
