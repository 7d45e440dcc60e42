//! Order Ledger
//!
//! Client-side two-bucket view of an owner's orders:
//!
//! - **tracking**: orders whose status is ACTIVE
//! - **past**: orders whose status is TERMINAL
//!
//! # Sources of truth
//!
//! | Source | Effect |
//! |--------|--------|
//! | `refresh` / snapshot push | replaces both buckets (last writer wins) |
//! | incremental push | remove from both buckets, prepend to one |
//!
//! Push messages carry a per-owner sequence. A gap marks the ledger as
//! needing a full sync, and the subscription issues one refresh.

mod reconcile;
mod subscription;

pub use reconcile::{Reconciled, apply_order, apply_snapshot, bucket_for};
pub use subscription::LedgerSubscription;

use crate::error::{SyncError, SyncResult};
use crate::remote::{LedgerChannel, OrderBackend};
use parking_lot::RwLock;
use shared::message::{LedgerMessage, LedgerUpdate};
use shared::models::{LedgerView, Order, StatusClassifier};
use std::collections::HashMap;
use std::sync::Arc;

/// Client-side push sequence tracker
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    /// Last processed sequence (None until the first push)
    pub last_sequence: Option<u64>,
    /// A gap was seen and no snapshot has replaced the view since
    pub needs_full_sync: bool,
}

impl SyncCursor {
    /// Record a push sequence. Returns false for one already processed.
    pub fn on_message(&mut self, sequence: u64) -> bool {
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                return false;
            }
            if sequence > last + 1 {
                self.needs_full_sync = true;
            }
        }
        self.last_sequence = Some(sequence);
        true
    }

    /// A full snapshot has been applied
    pub fn on_snapshot(&mut self) {
        self.needs_full_sync = false;
    }
}

#[derive(Debug, Default)]
struct OwnerLedger {
    view: LedgerView,
    cursor: SyncCursor,
}

/// Result of applying one push message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// The view differs from before
    pub changed: bool,
    /// A refresh is required to close a sequence gap
    pub needs_full_sync: bool,
}

struct LedgerInner {
    orders: Arc<dyn OrderBackend>,
    channel: Arc<dyn LedgerChannel>,
    classifier: StatusClassifier,
    owners: RwLock<HashMap<String, OwnerLedger>>,
}

/// Two-bucket order ledger, cheap to clone
#[derive(Clone)]
pub struct OrderLedger {
    inner: Arc<LedgerInner>,
}

impl std::fmt::Debug for OrderLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLedger")
            .field("classifier", &self.inner.classifier)
            .field("owners", &self.inner.owners.read().len())
            .finish()
    }
}

impl OrderLedger {
    pub fn new(
        orders: Arc<dyn OrderBackend>,
        channel: Arc<dyn LedgerChannel>,
        classifier: StatusClassifier,
    ) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                orders,
                channel,
                classifier,
                owners: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.inner.classifier
    }

    /// Current buckets for `owner_id` (empty before the first refresh)
    pub fn view(&self, owner_id: &str) -> LedgerView {
        self.inner
            .owners
            .read()
            .get(owner_id)
            .map(|o| o.view.clone())
            .unwrap_or_default()
    }

    pub fn cursor(&self, owner_id: &str) -> SyncCursor {
        self.inner
            .owners
            .read()
            .get(owner_id)
            .map(|o| o.cursor)
            .unwrap_or_default()
    }

    /// Fetch both buckets wholesale and replace the held view
    pub async fn refresh(&self, owner_id: &str) -> SyncResult<LedgerView> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::validation("owner_id is required"));
        }

        let snapshot = self.inner.orders.fetch_orders(owner_id).await.map_err(|e| {
            tracing::warn!(owner_id, code = %e.code, error = %e, "Ledger refresh failed");
            SyncError::from(e)
        })?;

        let mut owners = self.inner.owners.write();
        let entry = owners.entry(owner_id.to_string()).or_default();
        let dropped = apply_snapshot(&mut entry.view, snapshot);
        entry.cursor.on_snapshot();

        if dropped > 0 {
            tracing::warn!(owner_id, dropped, "Snapshot contained duplicate order ids");
        }
        tracing::info!(
            owner_id,
            tracking = entry.view.tracking.len(),
            past = entry.view.past.len(),
            "Ledger refreshed"
        );
        Ok(entry.view.clone())
    }

    /// Apply one order's latest state outside the push channel
    pub fn apply(&self, owner_id: &str, order: Order) -> Reconciled {
        if order.owner_id != owner_id {
            tracing::warn!(
                owner_id,
                order_owner = %order.owner_id,
                order_id = %order.internal_order_id,
                "Ignoring order for another owner"
            );
            return Reconciled::Unchanged;
        }

        let mut owners = self.inner.owners.write();
        let entry = owners.entry(owner_id.to_string()).or_default();
        let order_id = order.internal_order_id.clone();
        let status = order.status.clone();
        let result = apply_order(&mut entry.view, order, &self.inner.classifier);

        match result {
            Reconciled::Stale => {
                tracing::debug!(owner_id, %order_id, %status, "Stale order update ignored")
            }
            Reconciled::Unchanged => {}
            _ => tracing::debug!(owner_id, %order_id, %status, ?result, "Order reconciled"),
        }
        result
    }

    /// Apply one push message, tracking its sequence
    pub fn apply_message(&self, owner_id: &str, message: LedgerMessage) -> Applied {
        if message.owner_id != owner_id {
            tracing::warn!(
                owner_id,
                target = %message.owner_id,
                "Push message for another owner dropped"
            );
            return Applied {
                changed: false,
                needs_full_sync: self.cursor(owner_id).needs_full_sync,
            };
        }

        let fresh = {
            let mut owners = self.inner.owners.write();
            let entry = owners.entry(owner_id.to_string()).or_default();
            let had_gap = entry.cursor.needs_full_sync;
            let fresh = entry.cursor.on_message(message.sequence);
            if entry.cursor.needs_full_sync && !had_gap {
                tracing::warn!(
                    owner_id,
                    sequence = message.sequence,
                    "Push sequence gap detected, full sync required"
                );
            }
            fresh
        };

        let changed = match message.update {
            // Snapshots always win, even when re-delivered
            LedgerUpdate::Snapshot(snapshot) => {
                let mut owners = self.inner.owners.write();
                let entry = owners.entry(owner_id.to_string()).or_default();
                let before = std::mem::take(&mut entry.view);
                apply_snapshot(&mut entry.view, snapshot);
                entry.cursor.on_snapshot();
                entry.view != before
            }
            LedgerUpdate::Order(order) if fresh => self.apply(owner_id, order).changed(),
            LedgerUpdate::Order(order) => {
                tracing::debug!(
                    owner_id,
                    sequence = message.sequence,
                    order_id = %order.internal_order_id,
                    "Duplicate push ignored"
                );
                false
            }
        };

        Applied {
            changed,
            needs_full_sync: self.cursor(owner_id).needs_full_sync,
        }
    }

    /// Open the owner's push channel and deliver every view change to
    /// `on_update` until the returned handle is cancelled or dropped.
    pub async fn subscribe<F>(&self, owner_id: &str, on_update: F) -> SyncResult<LedgerSubscription>
    where
        F: FnMut(&LedgerView) + Send + 'static,
    {
        if owner_id.trim().is_empty() {
            return Err(SyncError::validation("owner_id is required"));
        }

        let rx = self.inner.channel.subscribe(owner_id).await?;

        // A new stream restarts sequence tracking
        {
            let mut owners = self.inner.owners.write();
            owners.entry(owner_id.to_string()).or_default().cursor.last_sequence = None;
        }

        tracing::info!(owner_id, "Ledger subscription opened");
        Ok(LedgerSubscription::spawn(
            self.clone(),
            owner_id.to_string(),
            rx,
            on_update,
        ))
    }
}
