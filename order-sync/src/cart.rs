//! Cart Store
//!
//! Thin, cache-free front for the remote cart. Every mutation is a signed
//! delta committed remotely; every read goes to the remote source of truth.
//!
//! # Ordering
//!
//! Deltas for one owner are dispatched one at a time through a FIFO async
//! lock, so deltas issued by this client commit in issue order. Reads take
//! the same lock and therefore observe every commit issued before them.

use crate::error::{SyncError, SyncResult};
use crate::remote::CartBackend;
use dashmap::DashMap;
use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::models::{Cart, CartDelta, DishMeta};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-owner cart handle over a remote [`CartBackend`]
#[derive(Clone)]
pub struct CartStore {
    backend: Arc<dyn CartBackend>,
    /// FIFO commit lock per owner
    commit_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// Last committed revision per owner, for backends that report one
    /// (drift detection only)
    revisions: Arc<DashMap<String, u64>>,
    /// Display name sent along with deltas
    owner_names: Arc<DashMap<String, String>>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("owners", &self.commit_locks.len())
            .finish()
    }
}

impl CartStore {
    pub fn new(backend: Arc<dyn CartBackend>) -> Self {
        Self {
            backend,
            commit_locks: Arc::new(DashMap::new()),
            revisions: Arc::new(DashMap::new()),
            owner_names: Arc::new(DashMap::new()),
        }
    }

    /// Remember the owner's display name for subsequent deltas
    pub fn set_owner_name(&self, owner_id: &str, name: impl Into<String>) {
        self.owner_names.insert(owner_id.to_string(), name.into());
    }

    fn commit_lock(&self, owner_id: &str) -> Arc<Mutex<()>> {
        self.commit_locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply a signed quantity delta and return the committed cart.
    ///
    /// `delta` is a change, not an absolute quantity. The backend clamps the
    /// result at zero and drops zero-quantity lines. A positive delta for a
    /// restaurant other than the cart's current one starts a new cart scope.
    pub async fn apply_delta(
        &self,
        owner_id: &str,
        restaurant_id: &str,
        dish_id: &str,
        meta: &DishMeta,
        delta: i32,
    ) -> SyncResult<Cart> {
        validate_delta(owner_id, restaurant_id, dish_id, meta, delta)?;

        let request = CartDelta {
            owner_id: owner_id.to_string(),
            owner_name: self.owner_names.get(owner_id).map(|n| n.value().clone()),
            restaurant_id: restaurant_id.to_string(),
            dish_id: dish_id.to_string(),
            meta: meta.clone(),
            delta,
        };

        let lock = self.commit_lock(owner_id);
        let _guard = lock.lock().await;

        let cart = self.backend.apply_delta(&request).await.map_err(|e| {
            tracing::warn!(
                owner_id,
                dish_id,
                delta,
                code = %e.code,
                category = e.code.category().name(),
                error = %e,
                "Cart delta rejected"
            );
            SyncError::from(e)
        })?;

        if delta > 0 && cart.restaurant_id.as_deref() != Some(restaurant_id) {
            tracing::error!(
                owner_id,
                expected = restaurant_id,
                actual = ?cart.restaurant_id,
                "Committed cart is scoped to a different restaurant"
            );
            return Err(SyncError::InvalidResponse(format!(
                "cart scoped to {:?} after adding to {}",
                cart.restaurant_id, restaurant_id
            )));
        }

        if let Some(revision) = cart.revision {
            self.revisions.insert(owner_id.to_string(), revision);
        }
        tracing::debug!(
            owner_id,
            dish_id,
            delta,
            quantity = cart.quantity_of(dish_id),
            revision = ?cart.revision,
            "Cart delta committed"
        );
        Ok(cart)
    }

    /// Empty the owner's cart. Clearing an already empty cart is a no-op.
    pub async fn clear(&self, owner_id: &str) -> SyncResult<()> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::validation("owner_id is required"));
        }

        let lock = self.commit_lock(owner_id);
        let _guard = lock.lock().await;

        match self.backend.clear_cart(owner_id).await {
            Ok(()) => {}
            Err(e) if e.code == ErrorCode::EmptyCart => {
                tracing::debug!(owner_id, "Clear on empty cart ignored");
            }
            Err(e) => return Err(e.into()),
        }

        // The new revision is unknown until the next read
        self.revisions.remove(owner_id);
        tracing::info!(owner_id, "Cart cleared");
        Ok(())
    }

    /// Point-in-time cart fetched from the remote after the last commit
    pub async fn snapshot(&self, owner_id: &str) -> SyncResult<Cart> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::validation("owner_id is required"));
        }

        let lock = self.commit_lock(owner_id);
        let _guard = lock.lock().await;

        let cart = self.backend.fetch_cart(owner_id).await?;

        if let Some(last) = self.revisions.get(owner_id).map(|r| *r.value())
            && let Some(fetched) = cart.revision
            && fetched < last
        {
            tracing::warn!(
                owner_id,
                last_committed = last,
                fetched,
                "Cart read is older than the last commit"
            );
        }
        Ok(cart)
    }

    /// Last revision this store saw committed for `owner_id`
    pub fn last_revision(&self, owner_id: &str) -> Option<u64> {
        self.revisions.get(owner_id).map(|r| *r.value())
    }
}

fn validate_delta(
    owner_id: &str,
    restaurant_id: &str,
    dish_id: &str,
    meta: &DishMeta,
    delta: i32,
) -> SyncResult<()> {
    if owner_id.trim().is_empty() || restaurant_id.trim().is_empty() || dish_id.trim().is_empty() {
        return Err(SyncError::validation(
            "owner_id, restaurant_id and dish_id are required",
        ));
    }
    if delta == 0 {
        return Err(SyncError::validation("delta must be non-zero"));
    }
    if meta.unit_price < Decimal::ZERO {
        return Err(SyncError::validation(format!(
            "unit price must be non-negative, got {}",
            meta.unit_price
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, InMemoryBackend};
    use shared::error::AppError;

    fn setup() -> (Arc<InMemoryBackend>, CartStore) {
        let backend = Arc::new(InMemoryBackend::with_demo_menu());
        let store = CartStore::new(backend.clone());
        (backend, store)
    }

    fn pizza() -> DishMeta {
        DishMeta::new("Paneer Pizza", Decimal::new(10000, 2))
    }

    #[tokio::test]
    async fn test_increment_then_decrement_to_removal() {
        let (_backend, store) = setup();

        let cart = store.apply_delta("u1", "r1", "pizza", &pizza(), 2).await.unwrap();
        assert_eq!(cart.quantity_of("pizza"), 2);

        let cart = store.apply_delta("u1", "r1", "pizza", &pizza(), -1).await.unwrap();
        assert_eq!(cart.quantity_of("pizza"), 1);

        let cart = store.apply_delta("u1", "r1", "pizza", &pizza(), -1).await.unwrap();
        assert!(cart.is_empty());
        assert!(store.snapshot("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_zero_delta_and_negative_price() {
        let (_backend, store) = setup();

        let err = store.apply_delta("u1", "r1", "pizza", &pizza(), 0).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let bad = DishMeta::new("Pizza", Decimal::new(-1, 0));
        let err = store.apply_delta("u1", "r1", "pizza", &bad, 1).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = store.apply_delta(" ", "r1", "pizza", &pizza(), 1).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unavailable_and_missing_are_distinct() {
        let (backend, store) = setup();
        backend.set_dish_available("r1", "pasta", false);

        let err = store
            .apply_delta("u1", "r1", "pasta", &DishMeta::new("Pasta", Decimal::ONE), 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::ItemUnavailable {
                dish_id: "pasta".to_string()
            }
        );

        let err = store
            .apply_delta("u1", "r1", "ghost", &DishMeta::new("Ghost", Decimal::ONE), 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::ItemNotFound {
                dish_id: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_network_failure_surfaces_verbatim() {
        let (backend, store) = setup();
        backend.fail_next(FailPoint::ApplyDelta, AppError::network("connection reset"));

        let err = store.apply_delta("u1", "r1", "pizza", &pizza(), 1).await.unwrap_err();
        assert_eq!(err, SyncError::Network("connection reset".to_string()));
        assert!(err.is_retryable());

        // No local retry happened, the cart is still empty
        assert!(store.snapshot("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_is_noop_when_empty() {
        let (_backend, store) = setup();
        store.clear("u1").await.unwrap();

        store.apply_delta("u1", "r1", "pizza", &pizza(), 3).await.unwrap();
        store.clear("u1").await.unwrap();
        assert!(store.snapshot("u1").await.unwrap().is_empty());
        store.clear("u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_revision_tracks_commits() {
        let (_backend, store) = setup();
        assert_eq!(store.last_revision("u1"), None);

        let first = store.apply_delta("u1", "r1", "pizza", &pizza(), 1).await.unwrap();
        let second = store.apply_delta("u1", "r1", "pizza", &pizza(), 1).await.unwrap();
        assert!(second.revision > first.revision);
        assert_eq!(store.last_revision("u1"), second.revision);
    }

    #[tokio::test]
    async fn test_backend_without_revisions_is_not_tracked() {
        let (backend, store) = setup();
        backend.set_cart_revisions(false);

        let cart = store.apply_delta("u1", "r1", "pizza", &pizza(), 2).await.unwrap();
        assert_eq!(cart.revision, None);
        assert_eq!(store.last_revision("u1"), None);
        assert_eq!(store.snapshot("u1").await.unwrap().quantity_of("pizza"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_deltas_commit_in_issue_order() {
        let (_backend, store) = setup();

        // Hold the owner's lock so every delta queues behind it
        let lock = store.commit_lock("u1");
        let guard = lock.lock().await;

        // Applying the -1 first would clamp against an empty cart and end at 2
        let mut handles = Vec::new();
        for delta in [1, -1, 1] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.apply_delta("u1", "r1", "pizza", &pizza(), delta).await
            }));
            // Let the task reach the lock before issuing the next one
            tokio::task::yield_now().await;
        }
        drop(guard);

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.snapshot("u1").await.unwrap().quantity_of("pizza"), 1);
    }
}
