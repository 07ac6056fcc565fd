//! Per-order push channels.
//!
//! Each live WebSocket registers a [`PushHandle`] under its order id. The
//! execution engine publishes status frames through the registry without
//! knowing anything about the socket behind the handle.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SwapError;

/// Message for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Sending half of one client connection
#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PushHandle {
    /// Create a handle and the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    fn send_text(&self, text: String) -> bool {
        self.tx.send(Outbound::Text(text)).is_ok()
    }

    fn same_channel(&self, other: &PushHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// What happened to a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Nobody is listening for this order
    NoHandle,
    /// The connection went away; the handle was dropped
    Closed,
}

#[derive(Clone, Default)]
pub struct PushRegistry {
    handles: Arc<Mutex<HashMap<Uuid, PushHandle>>>,
}

impl PushRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `order_id`. A handle already bound to the id is closed.
    pub async fn register(&self, order_id: Uuid, handle: PushHandle) {
        let replaced = self.handles.lock().await.insert(order_id, handle);
        if let Some(old) = replaced {
            warn!(%order_id, "Replacing existing push handle");
            old.close();
        }
    }

    pub async fn unregister(&self, order_id: Uuid) -> bool {
        self.handles.lock().await.remove(&order_id).is_some()
    }

    pub async fn contains(&self, order_id: Uuid) -> bool {
        self.handles.lock().await.contains_key(&order_id)
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serialize `frame` and hand it to the order's connection.
    ///
    /// Delivery failures are logged and reported, never raised: a client that
    /// disconnected must not affect the order itself.
    pub async fn send<T: Serialize>(&self, order_id: Uuid, frame: &T) -> Delivery {
        self.deliver(order_id, frame).await.0
    }

    /// Send the terminal frame, then close and forget the connection.
    pub async fn finish<T: Serialize>(&self, order_id: Uuid, frame: &T) -> Delivery {
        let (delivery, handle) = self.deliver(order_id, frame).await;
        if let Some(handle) = handle {
            if self.remove_if_same(order_id, &handle).await {
                handle.close();
            }
        }
        delivery
    }

    /// Delivery outcome plus the handle the frame went to, if any.
    async fn deliver<T: Serialize>(
        &self,
        order_id: Uuid,
        frame: &T,
    ) -> (Delivery, Option<PushHandle>) {
        let handle = match self.handles.lock().await.get(&order_id) {
            Some(handle) => handle.clone(),
            None => {
                debug!(%order_id, "No push handle, frame dropped");
                return (Delivery::NoHandle, None);
            }
        };

        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                let err = SwapError::Push(format!("frame serialization failed: {}", e));
                warn!(%order_id, error = %err, "Dropping frame");
                return (Delivery::Closed, Some(handle));
            }
        };

        if handle.send_text(text) {
            (Delivery::Sent, Some(handle))
        } else {
            let err = SwapError::Push("connection closed".to_string());
            debug!(%order_id, error = %err, "Removing dead push handle");
            self.remove_if_same(order_id, &handle).await;
            (Delivery::Closed, None)
        }
    }

    /// Remove the entry for `order_id` only while it still holds `handle`.
    /// A connection registered in the meantime stays bound.
    async fn remove_if_same(&self, order_id: Uuid, handle: &PushHandle) -> bool {
        let mut handles = self.handles.lock().await;
        match handles.get(&order_id) {
            Some(current) if current.same_channel(handle) => {
                handles.remove(&order_id);
                true
            }
            _ => false,
        }
    }

    /// Close every connection still registered. Used at shutdown once
    /// in-flight orders have had their chance to finish.
    pub async fn close_all(&self) -> usize {
        let handles: Vec<PushHandle> = self.handles.lock().await.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.close();
        }
        handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderStatus, StatusFrame};

    #[tokio::test]
    async fn frames_reach_registered_handle() {
        let registry = PushRegistry::new();
        let (handle, mut rx) = PushHandle::channel();
        let id = Uuid::new_v4();
        registry.register(id, handle).await;

        let delivery = registry
            .send(id, &StatusFrame::new(id, OrderStatus::Routing))
            .await;
        assert_eq!(delivery, Delivery::Sent);

        match rx.recv().await {
            Some(Outbound::Text(text)) => assert!(text.contains("\"routing\"")),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_order_is_not_an_error() {
        let registry = PushRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(
            registry.send(id, &StatusFrame::new(id, OrderStatus::Pending)).await,
            Delivery::NoHandle
        );
    }

    #[tokio::test]
    async fn dropped_receiver_removes_handle() {
        let registry = PushRegistry::new();
        let (handle, rx) = PushHandle::channel();
        let id = Uuid::new_v4();
        registry.register(id, handle).await;
        drop(rx);

        assert_eq!(
            registry.send(id, &StatusFrame::new(id, OrderStatus::Routing)).await,
            Delivery::Closed
        );
        assert!(!registry.contains(id).await);
    }

    #[tokio::test]
    async fn finish_sends_then_closes() {
        let registry = PushRegistry::new();
        let (handle, mut rx) = PushHandle::channel();
        let id = Uuid::new_v4();
        registry.register(id, handle).await;

        registry
            .finish(id, &StatusFrame::new(id, OrderStatus::Failed).with_error("boom"))
            .await;

        assert!(matches!(rx.recv().await, Some(Outbound::Text(_))));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn register_closes_replaced_handle() {
        let registry = PushRegistry::new();
        let id = Uuid::new_v4();
        let (first, mut first_rx) = PushHandle::channel();
        let (second, _second_rx) = PushHandle::channel();

        registry.register(id, first).await;
        registry.register(id, second).await;

        assert_eq!(first_rx.recv().await, Some(Outbound::Close));
        assert_eq!(registry.len().await, 1);
        assert!(registry.unregister(id).await);
        assert!(!registry.unregister(id).await);
    }

    #[tokio::test]
    async fn stale_handle_does_not_evict_its_replacement() {
        let registry = PushRegistry::new();
        let id = Uuid::new_v4();
        let (first, first_rx) = PushHandle::channel();
        let (second, mut second_rx) = PushHandle::channel();

        registry.register(id, first.clone()).await;
        registry.register(id, second.clone()).await;
        drop(first_rx);

        assert!(!registry.remove_if_same(id, &first).await);
        assert!(registry.contains(id).await);

        registry
            .finish(id, &StatusFrame::new(id, OrderStatus::Confirmed))
            .await;
        assert!(matches!(second_rx.recv().await, Some(Outbound::Text(_))));
        assert_eq!(second_rx.recv().await, Some(Outbound::Close));
        assert!(!registry.contains(id).await);
        assert!(!registry.remove_if_same(id, &second).await);
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = PushRegistry::new();
        let (a, mut a_rx) = PushHandle::channel();
        let (b, mut b_rx) = PushHandle::channel();
        registry.register(Uuid::new_v4(), a).await;
        registry.register(Uuid::new_v4(), b).await;

        assert_eq!(registry.close_all().await, 2);
        assert_eq!(a_rx.recv().await, Some(Outbound::Close));
        assert_eq!(b_rx.recv().await, Some(Outbound::Close));
        assert!(registry.is_empty().await);
    }
}
