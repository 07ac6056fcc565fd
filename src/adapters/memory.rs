//! In-memory order store for tests and embedding.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::OrderStore;
use crate::domain::{Order, OrderStatus};
use crate::error::{Result, SwapError};

#[derive(Default)]
struct MemoryInner {
    rows: HashMap<Uuid, Order>,
    /// Every distinct status each row has held, in write order
    history: HashMap<Uuid, Vec<OrderStatus>>,
    failing_writes: u32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` upserts fail with a persistence error.
    pub async fn fail_next_writes(&self, n: u32) {
        self.inner.lock().await.failing_writes = n;
    }

    pub async fn history(&self, id: Uuid) -> Vec<OrderStatus> {
        self.inner
            .lock()
            .await
            .history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn upsert(&self, order: &Order) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            warn!(order_id = %order.id, "Injected write failure");
            return Err(SwapError::Persistence("injected write failure".to_string()));
        }

        let mut row = order.clone();
        if let Some(existing) = inner.rows.get(&order.id) {
            if existing.status.is_terminal() {
                return Err(SwapError::InvalidStateTransition {
                    from: existing.status.to_string(),
                    to: order.status.to_string(),
                });
            }
            row.created_at = existing.created_at;
            row.updated_at = row.updated_at.max(existing.updated_at);
        }

        let statuses = inner.history.entry(order.id).or_default();
        if statuses.last() != Some(&order.status) {
            statuses.push(order.status);
        }
        inner.rows.insert(order.id, row);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.lock().await.rows.get(&id).cloned())
    }

    async fn list_unfinished(&self) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .rows
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Venue, DEFAULT_SLIPPAGE};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn upsert_tracks_status_history() {
        let store = MemoryStore::new();
        let mut order = Order::new("SOL", "USDC", dec!(1), DEFAULT_SLIPPAGE);

        store.upsert(&order).await.unwrap();
        store.upsert(&order).await.unwrap();
        order.transition(OrderStatus::Routing).unwrap();
        store.upsert(&order).await.unwrap();

        assert_eq!(
            store.history(order.id).await,
            vec![OrderStatus::Pending, OrderStatus::Routing]
        );
        assert_eq!(store.get(order.id).await.unwrap().unwrap().status, OrderStatus::Routing);
    }

    #[tokio::test]
    async fn terminal_rows_are_frozen() {
        let store = MemoryStore::new();
        let mut order = Order::new("SOL", "USDC", dec!(1), DEFAULT_SLIPPAGE);
        order.fail("QuoteTimeout: slow").unwrap();
        store.upsert(&order).await.unwrap();

        let mut stale = order.clone();
        stale.status = OrderStatus::Routing;
        stale.error = None;
        assert!(matches!(
            store.upsert(&stale).await,
            Err(SwapError::InvalidStateTransition { .. })
        ));
        assert_eq!(store.get(order.id).await.unwrap().unwrap().status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        let order = Order::new("SOL", "USDC", dec!(1), DEFAULT_SLIPPAGE);
        store.fail_next_writes(1).await;

        assert!(matches!(
            store.upsert(&order).await,
            Err(SwapError::Persistence(_))
        ));
        assert!(store.is_empty().await);
        store.upsert(&order).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn list_unfinished_skips_terminal() {
        let store = MemoryStore::new();
        let open = Order::new("SOL", "USDC", dec!(1), DEFAULT_SLIPPAGE);
        let mut done = Order::new("SOL", "USDC", dec!(2), DEFAULT_SLIPPAGE);
        done.transition(OrderStatus::Routing).unwrap();
        done.select_venue(Venue::Raydium).unwrap();
        done.fail("BuildError: bad").unwrap();

        store.upsert(&open).await.unwrap();
        store.upsert(&done).await.unwrap();

        let unfinished = store.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, open.id);
    }
}
