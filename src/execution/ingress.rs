use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::OrderStore;
use crate::domain::{Order, StatusFrame};
use crate::error::Result;
use crate::services::{PushHandle, PushRegistry};

use super::job::EnqueueOutcome;
use super::queue::JobQueue;

/// Take a validated order into the pipeline.
///
/// The push handle is bound before anything else so no frame can be missed,
/// the row is written before the job exists, and the `pending` frame goes out
/// before the job is enqueued. If the row cannot be written the handle is
/// released and nothing is queued.
pub async fn accept_order(
    store: &dyn OrderStore,
    push: &PushRegistry,
    queue: &JobQueue,
    order: Order,
    handle: PushHandle,
) -> Result<Uuid> {
    let order_id = order.id;
    push.register(order_id, handle).await;

    if let Err(e) = store.upsert(&order).await {
        warn!(%order_id, error = %e, "Could not persist new order");
        push.unregister(order_id).await;
        return Err(e);
    }

    push.send(order_id, &StatusFrame::new(order_id, order.status))
        .await;

    info!(
        %order_id,
        token_in = %order.token_in,
        token_out = %order.token_out,
        amount_in = %order.amount_in,
        "Order accepted"
    );
    if queue.enqueue(order).await == EnqueueOutcome::Duplicate {
        warn!(%order_id, "Order was already queued");
    }
    Ok(order_id)
}

/// Re-enqueue every order a previous process left unfinished.
pub async fn recover_unfinished(store: &dyn OrderStore, queue: &JobQueue) -> Result<usize> {
    let orders = store.list_unfinished().await?;
    let mut recovered = 0;
    for order in orders {
        let order_id = order.id;
        let status = order.status;
        if queue.enqueue(order).await == EnqueueOutcome::Enqueued {
            info!(%order_id, %status, "Recovered unfinished order");
            recovered += 1;
        }
    }
    if recovered > 0 {
        info!(recovered, "Unfinished orders re-enqueued");
    }
    Ok(recovered)
}
