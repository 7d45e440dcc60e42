//! Two-bucket reconciliation
//!
//! Pure functions over [`LedgerView`]. Each function keeps the partition
//! invariant: every order id appears in exactly one bucket.

use shared::models::{Bucket, LedgerView, Order, StatusClass, StatusClassifier};
use std::collections::HashSet;

/// What an incremental update did to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// New order placed at the head of `bucket`
    Inserted(Bucket),
    /// Known order re-placed at the head of `to`
    Moved { from: Bucket, to: Bucket },
    /// Identical to the held copy, nothing changed
    Unchanged,
    /// Older than the held copy, dropped
    Stale,
}

impl Reconciled {
    pub fn changed(&self) -> bool {
        matches!(self, Reconciled::Inserted(_) | Reconciled::Moved { .. })
    }
}

pub fn bucket_for(classifier: &StatusClassifier, order: &Order) -> Bucket {
    match classifier.classify(&order.status) {
        StatusClass::Active => Bucket::Tracking,
        StatusClass::Terminal => Bucket::Past,
    }
}

/// Apply one order's latest state.
///
/// The order is removed from both buckets, then prepended to exactly one
/// bucket chosen by its status. An update older than the held copy is
/// ignored, and re-delivery of the held copy is a no-op.
pub fn apply_order(view: &mut LedgerView, order: Order, classifier: &StatusClassifier) -> Reconciled {
    let previous = view.bucket_of(&order.internal_order_id);

    if let Some(held) = view.find(&order.internal_order_id) {
        if held.updated_at > order.updated_at {
            return Reconciled::Stale;
        }
        if *held == order {
            return Reconciled::Unchanged;
        }
    }

    let id = order.internal_order_id.clone();
    view.tracking.retain(|o| o.internal_order_id != id);
    view.past.retain(|o| o.internal_order_id != id);

    let to = bucket_for(classifier, &order);
    match to {
        Bucket::Tracking => view.tracking.insert(0, order),
        Bucket::Past => view.past.insert(0, order),
    }

    match previous {
        Some(from) => Reconciled::Moved { from, to },
        None => Reconciled::Inserted(to),
    }
}

/// Replace both buckets with an authoritative snapshot.
///
/// Bucket placement is taken as given. An id repeated across or within
/// buckets keeps only its first occurrence (tracking is read first), so a
/// malformed snapshot cannot break the partition. Returns the number of
/// dropped duplicates.
pub fn apply_snapshot(view: &mut LedgerView, snapshot: LedgerView) -> usize {
    let mut seen = HashSet::new();
    let mut dropped = 0;

    let mut keep = |order: &Order| {
        let first = seen.insert(order.internal_order_id.clone());
        if !first {
            dropped += 1;
        }
        first
    };

    let LedgerView { mut tracking, mut past } = snapshot;
    tracking.retain(|o| keep(o));
    past.retain(|o| keep(o));

    *view = LedgerView::new(tracking, past);
    dropped
}
