//! In-memory backend
//!
//! Implements every collaborator trait against one locked state so tests and
//! demos can drive the engine without a server. Behaves like the real
//! backend where it matters: checkout is atomic, payment sessions are
//! idempotent per order, and every order change is pushed to subscribers
//! with a per-owner sequence number.
//!
//! Failures can be injected per call site with [`InMemoryBackend::fail_next`]
//! and [`InMemoryBackend::fail_after`].

use crate::config::SyncConfig;
use crate::remote::{CartBackend, CatalogService, LedgerChannel, OrderBackend, PaymentGateway};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::message::{LedgerMessage, LedgerUpdate};
use shared::models::{
    Cart, CartDelta, CheckoutReceipt, DeltaEffect, DishMeta, LedgerView, Menu, MenuItem, Order,
    OrderStatus, PaymentConfirmation, PaymentSession, StatusClassifier,
};
use shared::util::now_millis;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Call sites that accept injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    FetchCart,
    ApplyDelta,
    ClearCart,
    Checkout,
    ConfirmPayment,
    FetchOrders,
    GetMenu,
    CreateSession,
    Subscribe,
}

struct Injected {
    /// Successful calls to let through first
    skip: usize,
    error: AppError,
}

#[derive(Default)]
struct BackendState {
    carts: HashMap<String, Cart>,
    /// Insertion order is creation order
    orders: Vec<Order>,
    menus: HashMap<String, Menu>,
    /// Keyed by internal order id
    sessions: HashMap<String, PaymentSession>,
    subscribers: HashMap<String, Vec<mpsc::Sender<LedgerMessage>>>,
    sequences: HashMap<String, u64>,
    failures: HashMap<FailPoint, VecDeque<Injected>>,
    calls: HashMap<FailPoint, usize>,
    next_order: u64,
    clock: i64,
    /// Leave `revision` out of returned carts
    hide_revisions: bool,
}

impl BackendState {
    fn enter(&mut self, point: FailPoint) -> AppResult<()> {
        *self.calls.entry(point).or_default() += 1;

        let Some(queue) = self.failures.get_mut(&point) else {
            return Ok(());
        };
        let Some(front) = queue.front_mut() else {
            return Ok(());
        };
        if front.skip > 0 {
            front.skip -= 1;
            return Ok(());
        }
        match queue.pop_front() {
            Some(injected) => Err(injected.error),
            None => Ok(()),
        }
    }

    fn reported(&self, mut cart: Cart) -> Cart {
        if self.hide_revisions {
            cart.revision = None;
        }
        cart
    }

    /// Monotonic millisecond clock
    fn tick(&mut self) -> i64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }

    fn view_for(&self, owner_id: &str, classifier: &StatusClassifier) -> LedgerView {
        let mut owned: Vec<&Order> = self.orders.iter().filter(|o| o.owner_id == owner_id).collect();
        owned.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.created_at.cmp(&a.created_at))
        });

        let (past, tracking): (Vec<Order>, Vec<Order>) = owned
            .into_iter()
            .cloned()
            .partition(|o| classifier.is_terminal(&o.status));
        LedgerView::new(tracking, past)
    }

    fn publish(&mut self, owner_id: &str, update: LedgerUpdate) -> u64 {
        let sequence = self.sequences.entry(owner_id.to_string()).or_default();
        *sequence += 1;
        let sequence = *sequence;

        if let Some(senders) = self.subscribers.get_mut(owner_id) {
            senders.retain(|tx| !tx.is_closed());
            for tx in senders.iter() {
                let message = LedgerMessage::new(owner_id, sequence, update.clone());
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(message) {
                    // Slow subscriber loses this message and sees a sequence gap
                    tracing::debug!(owner_id, sequence, "Subscriber buffer full, message dropped");
                }
            }
        }
        sequence
    }

    fn order_mut(&mut self, internal_order_id: &str) -> AppResult<&mut Order> {
        self.orders
            .iter_mut()
            .find(|o| o.internal_order_id == internal_order_id)
            .ok_or_else(|| AppError::order_not_found(internal_order_id))
    }
}

/// In-process stand-in for the remote backend
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    classifier: StatusClassifier,
    push_buffer: usize,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryBackend")
            .field("carts", &state.carts.len())
            .field("orders", &state.orders.len())
            .field("menus", &state.menus.len())
            .finish()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            classifier: StatusClassifier::default(),
            push_buffer: 64,
        }
    }

    /// Two restaurants: `r1` (pizza, pasta, salad, cola) and `r2` (sushi, ramen)
    pub fn with_demo_menu() -> Self {
        let backend = Self::new();
        backend.put_menu(Menu {
            restaurant_id: "r1".to_string(),
            is_open: true,
            items: vec![
                menu_item("pizza", "Paneer Pizza", Decimal::new(10000, 2)),
                menu_item("pasta", "Alfredo Pasta", Decimal::new(12000, 2)),
                menu_item("salad", "Greek Salad", Decimal::new(8000, 2)),
                menu_item("cola", "Cola", Decimal::new(4000, 2)),
            ],
        });
        backend.put_menu(Menu {
            restaurant_id: "r2".to_string(),
            is_open: true,
            items: vec![
                menu_item("sushi", "Salmon Sushi", Decimal::new(25000, 2)),
                menu_item("ramen", "Miso Ramen", Decimal::new(18000, 2)),
            ],
        });
        backend
    }

    pub fn with_classifier(mut self, classifier: StatusClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_push_buffer(mut self, capacity: usize) -> Self {
        self.push_buffer = capacity.max(1);
        self
    }

    /// Use the engine's terminal vocabulary and push buffer size
    pub fn configured(self, config: &SyncConfig) -> Self {
        self.with_classifier(config.classifier())
            .with_push_buffer(config.push_buffer)
    }

    // ========== Catalog control ==========

    pub fn put_menu(&self, menu: Menu) {
        self.state.lock().menus.insert(menu.restaurant_id.clone(), menu);
    }

    pub fn set_dish_available(&self, restaurant_id: &str, dish_id: &str, available: bool) {
        let mut state = self.state.lock();
        if let Some(item) = state
            .menus
            .get_mut(restaurant_id)
            .and_then(|menu| menu.items.iter_mut().find(|i| i.dish_id == dish_id))
        {
            item.is_available = available;
        }
    }

    /// Take a dish off the menu entirely
    pub fn remove_dish(&self, restaurant_id: &str, dish_id: &str) {
        if let Some(menu) = self.state.lock().menus.get_mut(restaurant_id) {
            menu.items.retain(|i| i.dish_id != dish_id);
        }
    }

    pub fn set_open(&self, restaurant_id: &str, is_open: bool) {
        if let Some(menu) = self.state.lock().menus.get_mut(restaurant_id) {
            menu.is_open = is_open;
        }
    }

    /// Report cart revisions or behave like a backend that has none
    pub fn set_cart_revisions(&self, enabled: bool) {
        self.state.lock().hide_revisions = !enabled;
    }

    // ========== Failure injection ==========

    /// Fail the next call at `point`
    pub fn fail_next(&self, point: FailPoint, error: AppError) {
        self.fail_after(point, 0, error);
    }

    /// Let `skip` calls at `point` succeed, then fail the following one
    pub fn fail_after(&self, point: FailPoint, skip: usize, error: AppError) {
        self.state
            .lock()
            .failures
            .entry(point)
            .or_default()
            .push_back(Injected { skip, error });
    }

    /// Number of calls made at `point`, including failed ones
    pub fn call_count(&self, point: FailPoint) -> usize {
        self.state.lock().calls.get(&point).copied().unwrap_or(0)
    }

    // ========== Order control ==========

    /// Seed an order as if it had been placed earlier
    pub fn insert_order(&self, order: Order) {
        let mut state = self.state.lock();
        state.clock = state.clock.max(order.updated_at.max(order.created_at));
        state.orders.push(order);
    }

    pub fn order(&self, internal_order_id: &str) -> Option<Order> {
        self.state
            .lock()
            .orders
            .iter()
            .find(|o| o.internal_order_id == internal_order_id)
            .cloned()
    }

    /// Move an order to `status` and push the change
    pub fn advance_order(&self, internal_order_id: &str, status: &str) -> AppResult<Order> {
        let mut state = self.state.lock();
        let now = state.tick();
        let order = state.order_mut(internal_order_id)?;
        order.status = OrderStatus::new(status);
        order.updated_at = now;
        let order = order.clone();

        state.publish(&order.owner_id, LedgerUpdate::Order(order.clone()));
        tracing::debug!(order_id = internal_order_id, status, "Order advanced");
        Ok(order)
    }

    /// Push a full ledger snapshot to `owner_id`'s subscribers
    pub fn push_snapshot(&self, owner_id: &str) -> u64 {
        let mut state = self.state.lock();
        let view = state.view_for(owner_id, &self.classifier);
        state.publish(owner_id, LedgerUpdate::Snapshot(view))
    }

    /// Push an arbitrary update, bypassing the order store
    pub fn push_update(&self, owner_id: &str, update: LedgerUpdate) -> u64 {
        self.state.lock().publish(owner_id, update)
    }

    /// Consume a sequence number without delivering anything
    pub fn drop_next_push(&self, owner_id: &str) {
        let mut state = self.state.lock();
        *state.sequences.entry(owner_id.to_string()).or_default() += 1;
    }

    /// Open push receivers for `owner_id`
    pub fn subscriber_count(&self, owner_id: &str) -> usize {
        let mut state = self.state.lock();
        match state.subscribers.get_mut(owner_id) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    pub fn cart(&self, owner_id: &str) -> Cart {
        self.state
            .lock()
            .carts
            .get(owner_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(owner_id))
    }
}

fn menu_item(dish_id: &str, name: &str, price: Decimal) -> MenuItem {
    MenuItem {
        dish_id: dish_id.to_string(),
        name: name.to_string(),
        price,
        is_available: true,
        image_ref: Some(format!("https://img.example.com/{dish_id}.png")),
        category: None,
        description: None,
    }
}

#[async_trait]
impl CartBackend for InMemoryBackend {
    async fn fetch_cart(&self, owner_id: &str) -> AppResult<Cart> {
        let mut state = self.state.lock();
        state.enter(FailPoint::FetchCart)?;
        let cart = state
            .carts
            .get(owner_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(owner_id));
        Ok(state.reported(cart))
    }

    async fn apply_delta(&self, delta: &CartDelta) -> AppResult<Cart> {
        let mut state = self.state.lock();
        state.enter(FailPoint::ApplyDelta)?;

        // Adding is checked against the live menu; the menu price wins
        let mut meta = delta.meta.clone();
        if delta.delta > 0 {
            let menu = state.menus.get(&delta.restaurant_id);
            let item = menu
                .and_then(|m| m.item(&delta.dish_id))
                .ok_or_else(|| AppError::item_not_found(&delta.dish_id))?;
            let is_open = menu.is_some_and(|m| m.is_open);
            if !item.is_available || !is_open {
                return Err(AppError::item_unavailable(&delta.dish_id));
            }
            meta = DishMeta {
                dish_name: item.name.clone(),
                unit_price: item.price,
                image_ref: item.image_ref.clone().or(meta.image_ref),
            };
        }

        let cart = state
            .carts
            .entry(delta.owner_id.clone())
            .or_insert_with(|| Cart::empty(&delta.owner_id));
        if delta.owner_name.is_some() {
            cart.owner_name = delta.owner_name.clone();
        }

        let effect = cart.apply_delta(&delta.restaurant_id, &delta.dish_id, &meta, delta.delta);
        if effect != DeltaEffect::Unchanged {
            cart.bump_revision();
        }
        let cart = cart.clone();
        Ok(state.reported(cart))
    }

    async fn clear_cart(&self, owner_id: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        state.enter(FailPoint::ClearCart)?;

        match state.carts.get_mut(owner_id) {
            Some(cart) if !cart.is_empty() => {
                cart.clear();
                cart.bump_revision();
                Ok(())
            }
            _ => Err(AppError::empty_cart()),
        }
    }
}

#[async_trait]
impl OrderBackend for InMemoryBackend {
    async fn checkout_cart(&self, owner_id: &str) -> AppResult<CheckoutReceipt> {
        let mut state = self.state.lock();
        state.enter(FailPoint::Checkout)?;

        let cart = match state.carts.get(owner_id) {
            Some(cart) if !cart.is_empty() => cart.clone(),
            _ => return Err(AppError::empty_cart()),
        };
        let Some(restaurant_id) = cart.restaurant_id.clone() else {
            return Err(AppError::invalid_response("non-empty cart without restaurant"));
        };

        state.next_order += 1;
        let now = state.tick();
        let order = Order {
            internal_order_id: format!("ORD-{:06}", state.next_order),
            external_order_id: None,
            owner_id: owner_id.to_string(),
            restaurant_id: restaurant_id.clone(),
            items: cart.lines().cloned().collect(),
            total: cart.total(),
            created_at: now,
            updated_at: now,
            status: OrderStatus::created(),
        };
        let receipt = CheckoutReceipt {
            internal_order_id: order.internal_order_id.clone(),
            restaurant_id,
            total: order.total,
        };

        // Order creation and cart emptying happen together
        state.orders.push(order.clone());
        if let Some(cart) = state.carts.get_mut(owner_id) {
            cart.clear();
            cart.bump_revision();
        }
        state.publish(owner_id, LedgerUpdate::Order(order));

        tracing::debug!(order_id = %receipt.internal_order_id, total = %receipt.total, "Order created");
        Ok(receipt)
    }

    async fn confirm_payment(
        &self,
        internal_order_id: &str,
        confirmation: &PaymentConfirmation,
    ) -> AppResult<Order> {
        let mut state = self.state.lock();
        state.enter(FailPoint::ConfirmPayment)?;

        if confirmation.gateway_payment_id.trim().is_empty() {
            return Err(AppError::validation("gateway_payment_id is required"));
        }
        let gateway_order = state
            .sessions
            .get(internal_order_id)
            .map(|s| format!("cf_{}", s.internal_order_id));

        let now = state.tick();
        let order = state.order_mut(internal_order_id)?;
        order.status = OrderStatus::paid();
        order.updated_at = now;
        if let Some(reference) = confirmation.gateway_order_id.clone().or(gateway_order) {
            order.external_order_id = Some(reference);
        }
        let order = order.clone();

        state.publish(&order.owner_id, LedgerUpdate::Order(order.clone()));
        Ok(order)
    }

    async fn fetch_orders(&self, owner_id: &str) -> AppResult<LedgerView> {
        let mut state = self.state.lock();
        state.enter(FailPoint::FetchOrders)?;
        Ok(state.view_for(owner_id, &self.classifier))
    }
}

#[async_trait]
impl CatalogService for InMemoryBackend {
    async fn get_menu(&self, restaurant_id: &str) -> AppResult<Menu> {
        let mut state = self.state.lock();
        state.enter(FailPoint::GetMenu)?;
        // Unknown restaurants serve an empty, closed menu
        Ok(state.menus.get(restaurant_id).cloned().unwrap_or_else(|| Menu {
            restaurant_id: restaurant_id.to_string(),
            items: Vec::new(),
            is_open: false,
        }))
    }
}

#[async_trait]
impl PaymentGateway for InMemoryBackend {
    async fn create_payment_session(
        &self,
        _restaurant_id: &str,
        internal_order_id: &str,
        total: Decimal,
    ) -> AppResult<PaymentSession> {
        let mut state = self.state.lock();
        state.enter(FailPoint::CreateSession)?;

        if let Some(existing) = state.sessions.get(internal_order_id) {
            return Ok(existing.clone());
        }

        let order = state.order_mut(internal_order_id)?;
        if order.total != total {
            return Err(AppError::with_message(
                ErrorCode::PaymentSessionFailed,
                format!("amount {} does not match order total {}", total, order.total),
            ));
        }
        order.external_order_id = Some(format!("cf_{internal_order_id}"));

        let session = PaymentSession {
            session_id: format!("session_{}", Uuid::new_v4().simple()),
            internal_order_id: internal_order_id.to_string(),
            checkout_url: None,
        };
        state
            .sessions
            .insert(internal_order_id.to_string(), session.clone());
        Ok(session)
    }
}

#[async_trait]
impl LedgerChannel for InMemoryBackend {
    async fn subscribe(&self, owner_id: &str) -> AppResult<mpsc::Receiver<LedgerMessage>> {
        let mut state = self.state.lock();
        state.enter(FailPoint::Subscribe)?;

        let (tx, rx) = mpsc::channel(self.push_buffer);
        state
            .subscribers
            .entry(owner_id.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(dish_id: &str, delta: i32) -> CartDelta {
        CartDelta {
            owner_id: "u1".to_string(),
            owner_name: None,
            restaurant_id: "r1".to_string(),
            dish_id: dish_id.to_string(),
            meta: DishMeta::new(dish_id, Decimal::ONE),
            delta,
        }
    }

    #[tokio::test]
    async fn test_menu_price_wins() {
        let backend = InMemoryBackend::with_demo_menu();
        let cart = backend.apply_delta(&delta("pizza", 2)).await.unwrap();
        assert_eq!(cart.get("pizza").unwrap().unit_price, Decimal::new(10000, 2));
        assert_eq!(cart.total(), Decimal::new(20000, 2));
    }

    #[tokio::test]
    async fn test_checkout_is_atomic() {
        let backend = InMemoryBackend::with_demo_menu();
        backend.apply_delta(&delta("pizza", 1)).await.unwrap();

        backend.fail_next(FailPoint::Checkout, AppError::network("timeout"));
        assert!(backend.checkout_cart("u1").await.is_err());
        assert_eq!(backend.cart("u1").item_count(), 1);

        let receipt = backend.checkout_cart("u1").await.unwrap();
        assert!(backend.cart("u1").is_empty());
        let order = backend.order(&receipt.internal_order_id).unwrap();
        assert_eq!(order.status.as_str(), OrderStatus::CREATED);
        assert_eq!(order.total, receipt.total);
    }

    #[tokio::test]
    async fn test_fail_after_skips() {
        let backend = InMemoryBackend::with_demo_menu();
        backend.fail_after(FailPoint::ApplyDelta, 1, AppError::network("boom"));

        assert!(backend.apply_delta(&delta("pizza", 1)).await.is_ok());
        assert!(backend.apply_delta(&delta("pasta", 1)).await.is_err());
        assert!(backend.apply_delta(&delta("pasta", 1)).await.is_ok());
        assert_eq!(backend.call_count(FailPoint::ApplyDelta), 3);
    }

    #[tokio::test]
    async fn test_session_idempotent() {
        let backend = InMemoryBackend::with_demo_menu();
        backend.apply_delta(&delta("pizza", 1)).await.unwrap();
        let receipt = backend.checkout_cart("u1").await.unwrap();

        let a = backend
            .create_payment_session("r1", &receipt.internal_order_id, receipt.total)
            .await
            .unwrap();
        let b = backend
            .create_payment_session("r1", &receipt.internal_order_id, receipt.total)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_push_sequence_and_gap() {
        let backend = InMemoryBackend::with_demo_menu();
        let mut rx = backend.subscribe("u1").await.unwrap();

        backend.push_snapshot("u1");
        backend.drop_next_push("u1");
        backend.push_snapshot("u1");

        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(rx.recv().await.unwrap().sequence, 3);

        drop(rx);
        assert_eq!(backend.subscriber_count("u1"), 0);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_push() {
        let config = SyncConfig::default().with_push_buffer(1);
        let backend = InMemoryBackend::with_demo_menu().configured(&config);
        let mut rx = backend.subscribe("u1").await.unwrap();

        backend.push_snapshot("u1");
        backend.push_snapshot("u1");

        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert!(rx.try_recv().is_err());
    }
}
