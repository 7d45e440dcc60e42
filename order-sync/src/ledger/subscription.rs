//! 账本推送订阅
//!
//! 订阅在后台任务中消费推送通道，每次视图变化时回调 `on_update`。
//! 取消或 drop 句柄后不会再有任何回调，推送通道随任务退出而关闭。

use super::OrderLedger;
use shared::message::LedgerMessage;
use shared::models::LedgerView;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle for a live ledger subscription
///
/// Dropping the handle cancels the subscription.
#[derive(Debug)]
pub struct LedgerSubscription {
    owner_id: String,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LedgerSubscription {
    pub(super) fn spawn<F>(
        ledger: OrderLedger,
        owner_id: String,
        mut rx: mpsc::Receiver<LedgerMessage>,
        mut on_update: F,
    ) -> Self
    where
        F: FnMut(&LedgerView) + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task_owner = owner_id.clone();

        let task = tokio::spawn(async move {
            let owner_id = task_owner;
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => {
                        tracing::debug!(owner_id = %owner_id, "Ledger subscription cancelled");
                        break;
                    }
                    message = rx.recv() => {
                        let Some(message) = message else {
                            tracing::info!(owner_id = %owner_id, "Ledger push channel closed");
                            break;
                        };

                        let applied = ledger.apply_message(&owner_id, message);
                        if task_token.is_cancelled() {
                            break;
                        }
                        if applied.changed {
                            on_update(&ledger.view(&owner_id));
                        }

                        // 序号缺口：全量刷新一次
                        if applied.needs_full_sync {
                            match ledger.refresh(&owner_id).await {
                                Ok(view) if !task_token.is_cancelled() => on_update(&view),
                                Ok(_) => break,
                                Err(e) => {
                                    tracing::warn!(
                                        owner_id = %owner_id,
                                        error = %e,
                                        "Gap recovery refresh failed, retrying on next push"
                                    );
                                }
                            }
                        }
                    }
                }
            }
            // rx 在此 drop，远端发送方随即看到通道关闭
        });

        Self {
            owner_id,
            token,
            task: Some(task),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Stop delivering updates. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel and wait for the background task to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!(owner_id = %self.owner_id, "Ledger subscription task panicked");
        }
    }
}

impl Drop for LedgerSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use rust_decimal::Decimal;
    use shared::models::{Bucket, Order, OrderStatus, StatusClassifier};
    use std::sync::Arc;
    use std::time::Duration;

    fn order(id: &str, status: &str) -> Order {
        Order {
            internal_order_id: id.to_string(),
            external_order_id: None,
            owner_id: "u1".to_string(),
            restaurant_id: "r1".to_string(),
            items: vec![],
            total: Decimal::new(2500, 2),
            created_at: 1,
            updated_at: 1,
            status: OrderStatus::new(status),
        }
    }

    async fn next_view(rx: &mut mpsc::UnboundedReceiver<LedgerView>) -> LedgerView {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for ledger update")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn test_push_moves_order_between_buckets() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_order(order("a", "paid"));
        let ledger = OrderLedger::new(backend.clone(), backend.clone(), StatusClassifier::default());
        ledger.refresh("u1").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = ledger
            .subscribe("u1", move |view| {
                let _ = tx.send(view.clone());
            })
            .await
            .unwrap();
        assert!(sub.is_active());

        backend.advance_order("a", "delivered").unwrap();
        let view = next_view(&mut rx).await;
        assert_eq!(view.bucket_of("a"), Some(Bucket::Past));
        assert!(view.tracking.is_empty());

        sub.shutdown().await;
        assert_eq!(backend.subscriber_count("u1"), 0);
    }

    #[tokio::test]
    async fn test_gap_triggers_refresh() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_order(order("a", "paid"));
        let ledger = OrderLedger::new(backend.clone(), backend.clone(), StatusClassifier::default());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = ledger
            .subscribe("u1", move |view| {
                let _ = tx.send(view.clone());
            })
            .await
            .unwrap();

        backend.push_snapshot("u1");
        next_view(&mut rx).await;

        // Lost push: the order moved to ready but nobody heard about it
        backend.drop_next_push("u1");
        backend.insert_order(order("b", "preparing"));
        backend.advance_order("a", "ready").unwrap();

        let mut view = next_view(&mut rx).await;
        while view.find("b").is_none() {
            view = next_view(&mut rx).await;
        }
        assert_eq!(view.find("a").map(|o| o.status.as_str()), Some("ready"));
        assert!(!ledger.cursor("u1").needs_full_sync);
    }

    #[tokio::test]
    async fn test_no_callbacks_after_cancel() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_order(order("a", "paid"));
        let ledger = OrderLedger::new(backend.clone(), backend.clone(), StatusClassifier::default());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = ledger
            .subscribe("u1", move |view| {
                let _ = tx.send(view.clone());
            })
            .await
            .unwrap();

        sub.cancel();
        assert!(!sub.is_active());
        backend.advance_order("a", "delivered").unwrap();

        drop(sub);
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .map(|v| v.is_none())
                .unwrap_or(true)
        );
    }
}
