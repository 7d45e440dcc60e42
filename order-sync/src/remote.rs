//! Remote collaborator seams
//!
//! The engine never talks to a transport directly. Each collaborator is a
//! trait returning [`AppResult`], so failures arrive as closed error codes.
//! Implementations: [`crate::http::GraphQlClient`] for the real backend and
//! [`crate::memory::InMemoryBackend`] for tests and demos.

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::error::AppResult;
use shared::message::LedgerMessage;
use shared::models::{
    Cart, CartDelta, CheckoutReceipt, LedgerView, Menu, Order, PaymentConfirmation, PaymentSession,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Authoritative cart storage (server side)
#[async_trait]
pub trait CartBackend: Send + Sync {
    /// Fetch the owner's current cart
    async fn fetch_cart(&self, owner_id: &str) -> AppResult<Cart>;

    /// Apply a signed delta and return the committed cart
    async fn apply_delta(&self, delta: &CartDelta) -> AppResult<Cart>;

    /// Empty the owner's cart
    async fn clear_cart(&self, owner_id: &str) -> AppResult<()>;
}

/// Order creation, payment confirmation and ledger queries
#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Atomically convert the cart into a `created` order and empty the cart
    async fn checkout_cart(&self, owner_id: &str) -> AppResult<CheckoutReceipt>;

    /// Ask the server to verify a gateway success and mark the order paid
    async fn confirm_payment(
        &self,
        internal_order_id: &str,
        confirmation: &PaymentConfirmation,
    ) -> AppResult<Order>;

    /// Both ledger buckets, wholesale
    async fn fetch_orders(&self, owner_id: &str) -> AppResult<LedgerView>;
}

/// Live restaurant catalog
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_menu(&self, restaurant_id: &str) -> AppResult<Menu>;
}

/// External payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create (or return the existing) session for `internal_order_id`
    async fn create_payment_session(
        &self,
        restaurant_id: &str,
        internal_order_id: &str,
        total: Decimal,
    ) -> AppResult<PaymentSession>;
}

/// Real-time push channel keyed by owner
#[async_trait]
pub trait LedgerChannel: Send + Sync {
    /// Open a push stream for `owner_id`; dropping the receiver ends it
    async fn subscribe(&self, owner_id: &str) -> AppResult<mpsc::Receiver<LedgerMessage>>;
}

/// Collaborator handles for one session
#[derive(Clone)]
pub struct Remotes {
    pub carts: Arc<dyn CartBackend>,
    pub orders: Arc<dyn OrderBackend>,
    pub catalog: Arc<dyn CatalogService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub channel: Arc<dyn LedgerChannel>,
}

impl Remotes {
    /// All collaborators served by one backend
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: CartBackend + OrderBackend + CatalogService + PaymentGateway + LedgerChannel + 'static,
    {
        Self {
            carts: backend.clone(),
            orders: backend.clone(),
            catalog: backend.clone(),
            payments: backend.clone(),
            channel: backend,
        }
    }
}

impl std::fmt::Debug for Remotes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remotes").finish_non_exhaustive()
    }
}
