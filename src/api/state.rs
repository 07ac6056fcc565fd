use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::adapters::OrderStore;
use crate::execution::JobQueue;
use crate::services::PushRegistry;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Order rows
    pub store: Arc<dyn OrderStore>,

    /// Job queue the engine consumes
    pub queue: JobQueue,

    /// Per-order push channels
    pub push: PushRegistry,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn OrderStore>, queue: JobQueue, push: PushRegistry) -> Self {
        Self {
            store,
            queue,
            push,
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
