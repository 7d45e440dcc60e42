//! Checkout Orchestrator
//!
//! Drives one owner's checkout through:
//!
//! ```text
//! Idle ─checkout─▶ CheckingOut ─receipt+session─▶ AwaitingPayment
//!      │               │                              │
//!      │               ├─cart fail─▶ Idle             ├─SUCCESS─▶ Succeeded
//!      │               └─session fail─▶ Cancelled     └─CANCELLED/FAILURE─▶ Cancelled
//!      └─retry_payment (unpaid order)─▶ CheckingOut
//! ```
//!
//! At most one checkout is in flight per owner. The order is server-created
//! and the cart server-emptied atomically, so a failed or abandoned payment
//! leaves an unpaid `created` order that can be retried with
//! [`CheckoutOrchestrator::retry_payment`].

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::ledger::OrderLedger;
use crate::remote::{OrderBackend, PaymentGateway};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::models::{CheckoutReceipt, Order, OrderStatus, PaymentSession, PaymentSignal};
use std::collections::HashMap;
use std::sync::Arc;

/// Order awaiting a terminal payment signal
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    pub receipt: CheckoutReceipt,
    pub session: PaymentSession,
}

impl PendingPayment {
    pub fn internal_order_id(&self) -> &str {
        &self.receipt.internal_order_id
    }

    /// Hosted checkout page to open for this payment
    pub fn checkout_url(&self) -> Option<&str> {
        self.session.checkout_url.as_deref()
    }
}

/// Per-owner checkout state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CheckoutPhase {
    #[default]
    Idle,
    CheckingOut,
    AwaitingPayment(PendingPayment),
    /// Server confirmed the payment
    Succeeded(Order),
    /// Payment cancelled or failed; the order stays unpaid
    Cancelled {
        receipt: CheckoutReceipt,
        reason: Option<String>,
    },
}

impl CheckoutPhase {
    /// A checkout is in flight and blocks another one
    pub fn is_in_flight(&self) -> bool {
        matches!(self, CheckoutPhase::CheckingOut | CheckoutPhase::AwaitingPayment(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CheckoutPhase::Idle => "idle",
            CheckoutPhase::CheckingOut => "checking_out",
            CheckoutPhase::AwaitingPayment(_) => "awaiting_payment",
            CheckoutPhase::Succeeded(_) => "succeeded",
            CheckoutPhase::Cancelled { .. } => "cancelled",
        }
    }
}

/// Converts carts into orders and hands off to the payment gateway
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    orders: Arc<dyn OrderBackend>,
    payments: Arc<dyn PaymentGateway>,
    ledger: OrderLedger,
    config: SyncConfig,
    phases: Arc<Mutex<HashMap<String, CheckoutPhase>>>,
    /// Payment sessions by internal order id, dropped once the order is
    /// paid or terminal
    sessions: Arc<Mutex<HashMap<String, PaymentSession>>>,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("owners", &self.phases.lock().len())
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

impl CheckoutOrchestrator {
    pub fn new(
        orders: Arc<dyn OrderBackend>,
        payments: Arc<dyn PaymentGateway>,
        ledger: OrderLedger,
        config: &SyncConfig,
    ) -> Self {
        Self {
            orders,
            payments,
            ledger,
            config: config.clone(),
            phases: Arc::new(Mutex::new(HashMap::new())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current phase for `owner_id`
    pub fn phase(&self, owner_id: &str) -> CheckoutPhase {
        self.phases.lock().get(owner_id).cloned().unwrap_or_default()
    }

    fn set_phase(&self, owner_id: &str, phase: CheckoutPhase) {
        tracing::debug!(owner_id, phase = phase.name(), "Checkout phase changed");
        self.phases.lock().insert(owner_id.to_string(), phase);
    }

    /// Claim the owner's checkout slot, or fail if one is in flight
    fn begin(&self, owner_id: &str) -> SyncResult<CheckoutPhase> {
        let mut phases = self.phases.lock();
        let current = phases.get(owner_id).cloned().unwrap_or_default();
        if current.is_in_flight() {
            tracing::warn!(owner_id, phase = current.name(), "Checkout rejected, already in progress");
            return Err(SyncError::CheckoutInProgress {
                owner_id: owner_id.to_string(),
            });
        }
        phases.insert(owner_id.to_string(), CheckoutPhase::CheckingOut);
        Ok(current)
    }

    /// Convert the owner's cart into an order and open a payment session.
    ///
    /// On success the owner is `AwaitingPayment`. A failed cart conversion
    /// restores the previous phase and leaves the cart untouched. A failed
    /// session request leaves an unpaid order behind and the owner
    /// `Cancelled` with its receipt, ready for `retry_payment`.
    pub async fn checkout(&self, owner_id: &str) -> SyncResult<PendingPayment> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::validation("owner_id is required"));
        }
        let previous = self.begin(owner_id)?;
        self.prune_sessions(owner_id);

        let receipt = match self.orders.checkout_cart(owner_id).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    owner_id,
                    code = %e.code,
                    category = e.code.category().name(),
                    error = %e,
                    "Checkout failed"
                );
                self.set_phase(owner_id, previous);
                return Err(e.into());
            }
        };
        tracing::info!(
            owner_id,
            order_id = %receipt.internal_order_id,
            total = %receipt.total,
            "Cart converted to order"
        );

        self.await_payment(owner_id, receipt).await
    }

    /// Open (or reuse) a payment session for an unpaid order
    pub async fn retry_payment(
        &self,
        owner_id: &str,
        internal_order_id: &str,
    ) -> SyncResult<PendingPayment> {
        let previous = self.begin(owner_id)?;
        self.prune_sessions(owner_id);

        let receipt = match self.unpaid_receipt(owner_id, internal_order_id, &previous) {
            Ok(receipt) => receipt,
            Err(e) => {
                self.set_phase(owner_id, previous);
                return Err(e);
            }
        };
        tracing::info!(owner_id, order_id = internal_order_id, "Retrying payment");
        self.await_payment(owner_id, receipt).await
    }

    fn unpaid_receipt(
        &self,
        owner_id: &str,
        internal_order_id: &str,
        previous: &CheckoutPhase,
    ) -> SyncResult<CheckoutReceipt> {
        if let CheckoutPhase::Cancelled { receipt, .. } = previous
            && receipt.internal_order_id == internal_order_id
        {
            return Ok(receipt.clone());
        }

        let view = self.ledger.view(owner_id);
        match view.tracking.iter().find(|o| o.internal_order_id == internal_order_id) {
            Some(order) if order.status.is(OrderStatus::CREATED) => Ok(CheckoutReceipt {
                internal_order_id: order.internal_order_id.clone(),
                restaurant_id: order.restaurant_id.clone(),
                total: order.total,
            }),
            Some(order) => Err(SyncError::validation(format!(
                "order {} is {}, not awaiting payment",
                internal_order_id, order.status
            ))),
            None => Err(SyncError::OrderNotFound(internal_order_id.to_string())),
        }
    }

    async fn await_payment(
        &self,
        owner_id: &str,
        receipt: CheckoutReceipt,
    ) -> SyncResult<PendingPayment> {
        let session = match self
            .request_payment_session(&receipt.restaurant_id, &receipt.internal_order_id, receipt.total)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                // The order exists unpaid; retry_payment can pick it up
                self.set_phase(
                    owner_id,
                    CheckoutPhase::Cancelled {
                        receipt,
                        reason: Some(e.to_string()),
                    },
                );
                return Err(e);
            }
        };

        let pending = PendingPayment { receipt, session };
        crate::payment_log!(owner_id, pending.internal_order_id(), "awaiting_payment");
        self.set_phase(owner_id, CheckoutPhase::AwaitingPayment(pending.clone()));
        Ok(pending)
    }

    /// Drop cached sessions for the owner's orders that reached a terminal
    /// status. A cancelled payment keeps its session until then so a retry
    /// reuses it.
    pub fn prune_sessions(&self, owner_id: &str) -> usize {
        let view = self.ledger.view(owner_id);
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        for order in &view.past {
            sessions.remove(&order.internal_order_id);
        }
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!(owner_id, pruned, "Dropped payment sessions for finished orders");
        }
        pruned
    }

    /// Get the payment session for an order.
    ///
    /// Idempotent per `internal_order_id`: a repeat call returns the same
    /// session without contacting the gateway again.
    pub async fn request_payment_session(
        &self,
        restaurant_id: &str,
        internal_order_id: &str,
        total: Decimal,
    ) -> SyncResult<PaymentSession> {
        if let Some(session) = self.sessions.lock().get(internal_order_id) {
            tracing::debug!(order_id = internal_order_id, "Reusing payment session");
            return Ok(session.clone());
        }

        let mut session = self
            .payments
            .create_payment_session(restaurant_id, internal_order_id, total)
            .await
            .map_err(|e| {
                tracing::error!(
                    order_id = internal_order_id,
                    code = %e.code,
                    category = e.code.category().name(),
                    error = %e,
                    "Payment session request failed"
                );
                SyncError::PaymentSessionFailed(e.message)
            })?;

        if session.session_id.trim().is_empty() {
            return Err(SyncError::PaymentSessionFailed(
                "gateway returned an empty session id".to_string(),
            ));
        }
        if session.internal_order_id.is_empty() {
            session.internal_order_id = internal_order_id.to_string();
        }
        if session.checkout_url.is_none() {
            session.checkout_url = Some(self.config.checkout_url(&session.session_id));
        }

        // A concurrent request may have won; keep the first session
        let session = self
            .sessions
            .lock()
            .entry(internal_order_id.to_string())
            .or_insert(session)
            .clone();
        tracing::info!(order_id = internal_order_id, session_id = %session.session_id, "Payment session opened");
        Ok(session)
    }

    /// Deliver the payment surface's terminal signal.
    ///
    /// Exactly one signal is accepted per awaited payment; anything else
    /// fails with `PaymentNotAwaited`. Success is confirmed by the server
    /// before the phase becomes `Succeeded`.
    pub async fn complete_payment(
        &self,
        owner_id: &str,
        signal: PaymentSignal,
    ) -> SyncResult<CheckoutPhase> {
        let pending = match self.phase(owner_id) {
            CheckoutPhase::AwaitingPayment(pending) => pending,
            other => {
                tracing::warn!(owner_id, phase = other.name(), "Payment signal with nothing awaiting");
                return Err(SyncError::PaymentNotAwaited {
                    owner_id: owner_id.to_string(),
                });
            }
        };
        let order_id = pending.internal_order_id().to_string();

        let phase = match signal {
            PaymentSignal::Success(confirmation) => {
                let order = self
                    .orders
                    .confirm_payment(&order_id, &confirmation)
                    .await
                    .map_err(|e| {
                        // Still awaiting: the signal may be re-delivered
                        tracing::error!(
                            owner_id,
                            %order_id,
                            code = %e.code,
                            category = e.code.category().name(),
                            error = %e,
                            "Payment confirmation failed"
                        );
                        SyncError::from(e)
                    })?;
                tracing::info!(owner_id, %order_id, status = %order.status, "Payment confirmed");
                crate::payment_log!(owner_id, order_id.as_str(), "confirmed");
                self.ledger.apply(owner_id, order.clone());
                self.sessions.lock().remove(&order_id);
                CheckoutPhase::Succeeded(order)
            }
            PaymentSignal::Cancelled => {
                tracing::info!(owner_id, %order_id, "Payment cancelled by user");
                crate::payment_log!(owner_id, order_id.as_str(), "cancelled");
                CheckoutPhase::Cancelled {
                    receipt: pending.receipt,
                    reason: None,
                }
            }
            PaymentSignal::Failure(reason) => {
                tracing::warn!(owner_id, %order_id, %reason, "Payment failed");
                crate::payment_log!(owner_id, order_id.as_str(), "failed", reason.as_str());
                CheckoutPhase::Cancelled {
                    receipt: pending.receipt,
                    reason: Some(reason),
                }
            }
        };

        // Compare-and-set: a concurrent signal may have completed it first
        {
            let mut phases = self.phases.lock();
            match phases.get(owner_id) {
                Some(CheckoutPhase::AwaitingPayment(current))
                    if current.internal_order_id() == order_id =>
                {
                    phases.insert(owner_id.to_string(), phase.clone());
                }
                _ => {
                    return Err(SyncError::PaymentNotAwaited {
                        owner_id: owner_id.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.ledger.refresh(owner_id).await {
            tracing::warn!(owner_id, error = %e, "Ledger refresh after payment failed");
        }
        self.prune_sessions(owner_id);
        Ok(phase)
    }
}
