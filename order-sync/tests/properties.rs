//! 随机化不变量测试
//!
//! Random operation sequences against the in-memory backend, checking the
//! invariants that must hold after every step. Failures print the seed so a
//! run can be replayed.

use order_sync::ledger::{Reconciled, apply_order, apply_snapshot};
use order_sync::{
    CartStore, DishMeta, FailPoint, InMemoryBackend, LedgerView, LineItem, Order, OrderSession,
    Remotes, SyncConfig, SyncError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use shared::error::AppError;
use shared::models::{Bucket, Cart, OrderStatus, StatusClassifier};
use std::collections::BTreeMap;
use std::sync::Arc;

const STATUSES: &[&str] = &[
    "created",
    "paid",
    "preparing",
    "ready",
    "out_for_delivery",
    "delivered",
    "completed",
    "cancelled",
];

const DISHES: &[(&str, &str)] = &[
    ("r1", "pizza"),
    ("r1", "pasta"),
    ("r1", "salad"),
    ("r1", "cola"),
    ("r2", "sushi"),
    ("r2", "ramen"),
];

const R2_DISHES: &[&str] = &["sushi", "ramen"];

fn seeded() -> (u64, StdRng) {
    let seed: u64 = rand::thread_rng().r#gen();
    (seed, StdRng::seed_from_u64(seed))
}

fn quantities(cart: &Cart) -> BTreeMap<String, u32> {
    cart.lines()
        .map(|line| (line.dish_id.clone(), line.quantity))
        .collect()
}

fn assert_cart_invariants(cart: &Cart, seed: u64) {
    for line in cart.lines() {
        assert!(line.quantity >= 1, "seed {seed}: zero quantity line {}", line.dish_id);
    }
    assert_eq!(
        cart.restaurant_id.is_some(),
        !cart.is_empty(),
        "seed {seed}: restaurant scope out of step with items"
    );
    if let Some(restaurant) = &cart.restaurant_id {
        for line in cart.lines() {
            assert!(
                DISHES.contains(&(restaurant.as_str(), line.dish_id.as_str())),
                "seed {seed}: {} does not belong to {restaurant}",
                line.dish_id
            );
        }
    }
}

fn random_order(rng: &mut StdRng, id: usize, updated_at: i64) -> Order {
    Order {
        internal_order_id: format!("ORD-{id}"),
        external_order_id: None,
        owner_id: "u1".to_string(),
        restaurant_id: "r1".to_string(),
        items: vec![LineItem::new(
            "pizza",
            &DishMeta::new("Pizza", Decimal::new(10000, 2)),
            rng.gen_range(1..4),
        )],
        total: Decimal::new(10000, 2),
        created_at: 1,
        updated_at,
        status: OrderStatus::new(STATUSES[rng.gen_range(0..STATUSES.len())]),
    }
}

fn assert_partitioned(view: &LedgerView, classifier: &StatusClassifier, seed: u64) {
    assert!(view.is_partitioned(), "seed {seed}: order held in both buckets");
    for order in &view.tracking {
        assert!(!classifier.is_terminal(&order.status), "seed {seed}: terminal order tracking");
    }
    for order in &view.past {
        assert!(classifier.is_terminal(&order.status), "seed {seed}: active order in past");
    }
}

#[tokio::test]
async fn cart_never_negative_and_single_restaurant() {
    let (seed, mut rng) = seeded();
    let backend = Arc::new(InMemoryBackend::with_demo_menu());
    let carts = CartStore::new(backend.clone());

    for _ in 0..300 {
        let (restaurant, dish) = DISHES[rng.gen_range(0..DISHES.len())];
        let delta = loop {
            let d = rng.gen_range(-3..=3);
            if d != 0 {
                break d;
            }
        };

        let meta = DishMeta::new(dish, Decimal::ZERO);
        match carts.apply_delta("u1", restaurant, dish, &meta, delta).await {
            Ok(cart) => assert_cart_invariants(&cart, seed),
            Err(e) => panic!("seed {seed}: unexpected error {e}"),
        }
        assert_cart_invariants(&backend.cart("u1"), seed);
    }
}

#[test]
fn ledger_stays_partitioned() {
    let (seed, mut rng) = seeded();
    let classifier = StatusClassifier::default();
    let mut view = LedgerView::default();

    for step in 0..500 {
        if rng.gen_bool(0.05) {
            let tracking = (0..rng.gen_range(0..4))
                .map(|i| random_order(&mut rng, i, step))
                .filter(|o| !classifier.is_terminal(&o.status))
                .collect();
            let past = (0..rng.gen_range(0..4))
                .map(|i| random_order(&mut rng, i + 2, step))
                .filter(|o| classifier.is_terminal(&o.status))
                .collect();
            apply_snapshot(&mut view, LedgerView::new(tracking, past));
        } else {
            // Timestamps sometimes go backwards to exercise the stale guard
            let updated_at = step - rng.gen_range(0..20);
            let id = rng.gen_range(0..8);
            let order = random_order(&mut rng, id, updated_at);
            let id = order.internal_order_id.clone();
            let terminal = classifier.is_terminal(&order.status);

            let outcome = apply_order(&mut view, order, &classifier);
            if outcome.changed() {
                let expected = if terminal { Bucket::Past } else { Bucket::Tracking };
                assert_eq!(view.bucket_of(&id), Some(expected), "seed {seed}");
            }
        }
        assert_partitioned(&view, &classifier, seed);
    }
}

#[test]
fn reapplying_an_update_is_a_no_op() {
    let (seed, mut rng) = seeded();
    let classifier = StatusClassifier::default();
    let mut view = LedgerView::default();

    for step in 0..200 {
        let id = rng.gen_range(0..6);
        let order = random_order(&mut rng, id, step);
        apply_order(&mut view, order.clone(), &classifier);
        let once = view.clone();

        let outcome = apply_order(&mut view, order, &classifier);
        assert_eq!(outcome, Reconciled::Unchanged, "seed {seed}");
        assert_eq!(view, once, "seed {seed}");
    }
}

#[test]
fn reapplying_a_snapshot_is_a_no_op() {
    let (seed, mut rng) = seeded();
    let classifier = StatusClassifier::default();

    for _ in 0..50 {
        let mut orders: Vec<Order> = (0..rng.gen_range(0..10))
            .map(|i| random_order(&mut rng, i, 1))
            .collect();
        // Duplicate an id now and then
        if let Some(first) = orders.first().cloned()
            && rng.gen_bool(0.3)
        {
            orders.push(first);
        }
        let (past, tracking): (Vec<_>, Vec<_>) = orders
            .into_iter()
            .partition(|o| classifier.is_terminal(&o.status));
        let snapshot = LedgerView::new(tracking, past);

        let mut view = LedgerView::default();
        apply_snapshot(&mut view, snapshot.clone());
        let once = view.clone();
        apply_snapshot(&mut view, snapshot);
        assert_eq!(view, once, "seed {seed}");
        assert!(view.is_partitioned(), "seed {seed}");
    }
}

#[tokio::test]
async fn reorder_commits_all_or_surfaces_error() {
    let (seed, mut rng) = seeded();
    let r1_dishes = ["pizza", "pasta", "salad", "cola"];

    for round in 0..20 {
        let backend = Arc::new(InMemoryBackend::with_demo_menu());
        let session = OrderSession::new(
            "u1",
            Remotes::from_backend(backend.clone()),
            &SyncConfig::default(),
        );

        let mut lines = Vec::new();
        for dish in r1_dishes {
            if rng.gen_bool(0.7) {
                let meta = DishMeta::new(dish, Decimal::ONE);
                lines.push(LineItem::new(dish, &meta, rng.gen_range(1..4)));
            }
        }
        if lines.is_empty() {
            continue;
        }
        backend.insert_order(Order {
            internal_order_id: format!("ORD-{round}"),
            external_order_id: None,
            owner_id: "u1".to_string(),
            restaurant_id: "r1".to_string(),
            items: lines.clone(),
            total: Decimal::ONE,
            created_at: 1,
            updated_at: 1,
            status: OrderStatus::new("delivered"),
        });
        session.refresh_orders().await.unwrap();

        // Something already in the cart, from the same restaurant or another one
        let (prefill, dishes) = if rng.gen_bool(0.5) {
            ("r1", &r1_dishes[..])
        } else {
            ("r2", R2_DISHES)
        };
        for dish in dishes {
            if rng.gen_bool(0.3) {
                session
                    .add_to_cart(prefill, dish, &DishMeta::new(*dish, Decimal::ZERO), rng.gen_range(1..3))
                    .await
                    .unwrap();
            }
        }
        let before = quantities(&session.cart().await.unwrap());
        let before_scope = session.cart().await.unwrap().restaurant_id;

        let fail_at = rng.gen_range(0..=lines.len());
        if fail_at < lines.len() {
            backend.fail_after(FailPoint::ApplyDelta, fail_at, AppError::network("reset"));
        }

        let result = session.reorder(&format!("ORD-{round}"), true).await;
        let after = quantities(&session.cart().await.unwrap());

        if fail_at < lines.len() {
            let err = result.expect_err("injected failure must surface");
            let SyncError::ReorderCommitFailed { dish_id, rollback_failed, .. } = err else {
                panic!("seed {seed}: expected ReorderCommitFailed, got {err:?}");
            };
            assert_eq!(dish_id, lines[fail_at].dish_id, "seed {seed}");
            assert!(rollback_failed.is_empty(), "seed {seed}");
            assert_eq!(after, before, "seed {seed}: partial reorder left in cart");
            assert_eq!(session.cart().await.unwrap().restaurant_id, before_scope, "seed {seed}");
        } else {
            let outcome = result.unwrap_or_else(|e| panic!("seed {seed}: {e}"));
            assert!(outcome.committed);
            // A cart from another restaurant is replaced, not merged
            let mut expected = if prefill == "r1" { before.clone() } else { BTreeMap::new() };
            for line in &lines {
                *expected.entry(line.dish_id.clone()).or_default() += line.quantity;
            }
            assert_eq!(after, expected, "seed {seed}");
        }
    }
}
