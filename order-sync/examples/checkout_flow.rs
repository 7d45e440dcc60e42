//! Walk one owner through the whole order lifecycle on the in-memory backend
//!
//! ```bash
//! RUST_LOG=order_sync=debug cargo run -p order-sync --example checkout_flow
//! ```

use order_sync::{
    DishMeta, InMemoryBackend, OrderSession, PaymentConfirmation, PaymentSignal, Remotes,
    SyncConfig,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    order_sync::logger::init_logger("info", false)?;

    let config = SyncConfig::from_env();
    let backend = Arc::new(InMemoryBackend::with_demo_menu().configured(&config));
    let session = OrderSession::new("demo-user", Remotes::from_backend(backend.clone()), &config)
        .with_owner_name("Demo User");

    session
        .watch_orders(|view| {
            tracing::info!(tracking = view.tracking.len(), past = view.past.len(), "Orders updated");
        })
        .await?;

    // Build a cart
    let meta = |name: &str| DishMeta::new(name, Decimal::ZERO);
    session.add_to_cart("r1", "pizza", &meta("Pizza"), 2).await?;
    session.add_to_cart("r1", "cola", &meta("Cola"), 1).await?;
    let cart = session.cart().await?;
    tracing::info!(items = cart.item_count(), total = %cart.total(), "Cart ready");

    // Checkout and pay
    let pending = session.checkout_cart().await?;
    let order_id = pending.internal_order_id().to_string();
    tracing::info!(order_id = %order_id, url = ?pending.checkout_url(), "Awaiting payment");

    let phase = session
        .complete_payment(PaymentSignal::Success(PaymentConfirmation {
            gateway_payment_id: "pay_demo".to_string(),
            gateway_order_id: None,
            signature: None,
        }))
        .await?;
    tracing::info!(phase = phase.name(), "Payment finished");

    // Kitchen progress arrives by push
    for status in ["preparing", "ready", "delivered"] {
        backend.advance_order(&order_id, status)?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Reorder with one dish gone
    backend.set_dish_available("r1", "cola", false);
    let outcome = session.reorder(&order_id, false).await?;
    tracing::info!(
        classification = ?outcome.classification,
        unavailable = outcome.unavailable_items.len(),
        "Reorder needs confirmation"
    );
    if outcome.needs_confirmation() {
        session.reorder(&order_id, true).await?;
    }
    let cart = session.cart().await?;
    tracing::info!(items = cart.item_count(), "Cart after reorder");

    session.close();
    Ok(())
}
