//! Order Sync - order lifecycle synchronization engine
//!
//! Keeps a food-ordering client consistent with its backend across the
//! cart → order → payment → tracking → history → reorder lifecycle.
//!
//! - [`CartStore`]: signed-delta cart mutations, no local cache
//! - [`CheckoutOrchestrator`]: cart-to-order conversion and payment handoff
//! - [`OrderLedger`]: two-bucket (tracking / past) view fed by snapshots and push
//! - [`ReorderResolver`]: live-availability partition of a past order
//!
//! [`OrderSession`] bundles all four for one owner.

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod http;
pub mod ledger;
pub mod logger;
pub mod memory;
pub mod remote;
pub mod reorder;
pub mod session;

pub use cart::CartStore;
pub use checkout::{CheckoutOrchestrator, CheckoutPhase, PendingPayment};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use http::GraphQlClient;
pub use ledger::{LedgerSubscription, OrderLedger};
pub use memory::{FailPoint, InMemoryBackend};
pub use remote::{CartBackend, CatalogService, LedgerChannel, OrderBackend, PaymentGateway, Remotes};
pub use reorder::ReorderResolver;
pub use session::OrderSession;

// Re-export shared types for convenience
pub use shared::models::{
    Cart, DishMeta, LedgerView, LineItem, Order, PaymentConfirmation, PaymentSignal, ReorderClass,
    ReorderOutcome,
};
