use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::Order;
use crate::error::Result;

/// Durable home of order rows.
///
/// `upsert` writes the full row image keyed by id. A row that has reached a
/// terminal status is frozen: writing over it fails with
/// `SwapError::InvalidStateTransition`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn upsert(&self, order: &Order) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>>;

    /// Orders not yet confirmed or failed, oldest first
    async fn list_unfinished(&self) -> Result<Vec<Order>>;
}
