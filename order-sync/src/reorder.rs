//! Reorder Resolver
//!
//! Partitions a past order's lines against the restaurant's live menu and,
//! when allowed, adds the available subset to the cart as positive deltas.
//!
//! | Classification | Committed when |
//! |----------------|----------------|
//! | ALL_AVAILABLE | always |
//! | PARTIAL_AVAILABLE | `force_add` |
//! | NO_ITEMS_AVAILABLE | never |
//!
//! The batch is all-or-nothing: if a delta fails part way, the lines already
//! added are reverted with inverse deltas before the error is returned. A
//! cart that belonged to another restaurant is replaced by the first delta,
//! so its lines are re-added after the revert.

use crate::cart::CartStore;
use crate::error::{SyncError, SyncResult};
use crate::ledger::OrderLedger;
use crate::remote::CatalogService;
use shared::models::{
    Availability, Cart, LineItem, Menu, Order, ReorderClass, ReorderOutcome, UnavailableItem,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReorderResolver {
    ledger: OrderLedger,
    catalog: Arc<dyn CatalogService>,
    carts: CartStore,
}

impl std::fmt::Debug for ReorderResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReorderResolver").finish_non_exhaustive()
    }
}

/// Split an order's lines by live availability.
///
/// Available lines take the menu's current name and price with the original
/// quantity. Unavailable lines keep the order snapshot's metadata. A closed
/// restaurant makes every line unavailable.
pub fn partition(order: &Order, menu: &Menu) -> (Vec<LineItem>, Vec<UnavailableItem>) {
    let mut available = Vec::new();
    let mut unavailable = Vec::new();

    for line in order.items.iter().filter(|l| l.quantity > 0) {
        match menu.availability(&line.dish_id) {
            Availability::Available(item) => available.push(LineItem {
                dish_id: line.dish_id.clone(),
                dish_name: item.name.clone(),
                unit_price: item.price,
                quantity: line.quantity,
                image_ref: item.image_ref.clone().or_else(|| line.image_ref.clone()),
            }),
            Availability::Unavailable(_) | Availability::Missing => {
                unavailable.push(UnavailableItem::from(line))
            }
        }
    }
    (available, unavailable)
}

impl ReorderResolver {
    pub fn new(ledger: OrderLedger, catalog: Arc<dyn CatalogService>, carts: CartStore) -> Self {
        Self {
            ledger,
            catalog,
            carts,
        }
    }

    /// Resolve a past order against live availability.
    ///
    /// Fails with `OrderNotFound` unless the order is in the owner's past
    /// bucket. With PARTIAL_AVAILABLE and `force_add == false` nothing is
    /// committed and the caller should confirm with the user first.
    pub async fn reorder(
        &self,
        owner_id: &str,
        internal_order_id: &str,
        force_add: bool,
    ) -> SyncResult<ReorderOutcome> {
        let order = self
            .ledger
            .view(owner_id)
            .find_past(internal_order_id)
            .cloned()
            .ok_or_else(|| SyncError::OrderNotFound(internal_order_id.to_string()))?;

        let menu = self.catalog.get_menu(&order.restaurant_id).await?;
        let (available, unavailable) = partition(&order, &menu);
        let classification = ReorderOutcome::classify(&available, &unavailable);

        tracing::info!(
            owner_id,
            order_id = internal_order_id,
            restaurant_id = %order.restaurant_id,
            ?classification,
            available = available.len(),
            unavailable = unavailable.len(),
            "Reorder resolved"
        );

        let commit = match classification {
            ReorderClass::AllAvailable => true,
            ReorderClass::PartialAvailable => force_add,
            ReorderClass::NoItemsAvailable => false,
        };
        if commit {
            self.commit(owner_id, &order.restaurant_id, &available).await?;
        }

        Ok(ReorderOutcome {
            classification,
            available_items: available,
            unavailable_items: unavailable,
            committed: commit,
        })
    }

    async fn commit(&self, owner_id: &str, restaurant_id: &str, lines: &[LineItem]) -> SyncResult<()> {
        let current = self.carts.snapshot(owner_id).await?;
        let displaced = (!current.is_empty()
            && current.restaurant_id.as_deref() != Some(restaurant_id))
        .then_some(current);

        let mut applied: Vec<(&LineItem, i32)> = Vec::with_capacity(lines.len());

        for line in lines {
            let delta = i32::try_from(line.quantity).map_err(|_| {
                SyncError::validation(format!("quantity {} out of range", line.quantity))
            });
            let result = match delta {
                Ok(delta) => self
                    .carts
                    .apply_delta(owner_id, restaurant_id, &line.dish_id, &line.meta(), delta)
                    .await
                    .map(|_| delta),
                Err(e) => Err(e),
            };

            match result {
                Ok(delta) => applied.push((line, delta)),
                Err(source) => {
                    tracing::warn!(
                        owner_id,
                        dish_id = %line.dish_id,
                        code = %source.code(),
                        category = source.category().name(),
                        error = %source,
                        rolling_back = applied.len(),
                        "Reorder commit failed"
                    );
                    let mut rollback_failed = self.rollback(owner_id, restaurant_id, &applied).await;
                    if let Some(previous) = &displaced {
                        rollback_failed.extend(self.restore(owner_id, previous).await);
                    }
                    return Err(SyncError::ReorderCommitFailed {
                        dish_id: line.dish_id.clone(),
                        source: Box::new(source),
                        rollback_failed,
                    });
                }
            }
        }
        Ok(())
    }

    /// Revert applied lines newest first; returns dishes that could not be reverted
    async fn rollback(
        &self,
        owner_id: &str,
        restaurant_id: &str,
        applied: &[(&LineItem, i32)],
    ) -> Vec<String> {
        let mut failed = Vec::new();
        for (line, delta) in applied.iter().rev() {
            if let Err(e) = self
                .carts
                .apply_delta(owner_id, restaurant_id, &line.dish_id, &line.meta(), -delta)
                .await
            {
                tracing::error!(owner_id, dish_id = %line.dish_id, error = %e, "Reorder rollback failed");
                failed.push(line.dish_id.clone());
            }
        }
        failed
    }

    /// Re-add a cart from another restaurant that the failed batch replaced.
    ///
    /// Skipped when the cart still holds that restaurant's scope, i.e. the
    /// batch failed before anything was committed. Returns dishes that could
    /// not be re-added.
    async fn restore(&self, owner_id: &str, previous: &Cart) -> Vec<String> {
        let Some(restaurant_id) = previous.restaurant_id.as_deref() else {
            return Vec::new();
        };
        match self.carts.snapshot(owner_id).await {
            Ok(cart) if cart.restaurant_id.as_deref() == Some(restaurant_id) => return Vec::new(),
            Ok(_) => {}
            Err(e) => {
                tracing::error!(owner_id, restaurant_id, error = %e, "Cannot read cart to restore it");
                return previous.lines().map(|line| line.dish_id.clone()).collect();
            }
        }

        let mut failed = Vec::new();
        for line in previous.lines() {
            let Ok(delta) = i32::try_from(line.quantity) else {
                failed.push(line.dish_id.clone());
                continue;
            };
            if let Err(e) = self
                .carts
                .apply_delta(owner_id, restaurant_id, &line.dish_id, &line.meta(), delta)
                .await
            {
                tracing::error!(owner_id, restaurant_id, dish_id = %line.dish_id, error = %e, "Cart restore failed");
                failed.push(line.dish_id.clone());
            }
        }
        tracing::info!(owner_id, restaurant_id, lost = failed.len(), "Displaced cart restored");
        failed
    }
}
