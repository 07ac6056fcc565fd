use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Order;
use crate::error::Result;

/// A queued order. The job id is the order id.
#[derive(Debug, Clone)]
pub struct Job {
    pub order: Order,
    /// Attempts that have already run to completion
    pub attempts_made: u32,
    /// The most recent venue execute call ended with a definite
    /// `SwapError::Execution`
    pub execute_rejected: bool,
}

impl Job {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            attempts_made: 0,
            execute_rejected: false,
        }
    }
}

/// Set by a handler right before it hands the swap to a venue.
///
/// The queue reads it after the attempt to tell an execute rejection apart
/// from failures that happened before any venue call.
#[derive(Debug, Clone, Default)]
pub struct ExecuteMarker(Arc<AtomicBool>);

impl ExecuteMarker {
    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_marked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a handler learns about the attempt it is running
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Snapshot taken at enqueue time; the store may be further along
    pub order: Order,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    pub execute_rejected: bool,
    pub execute_marker: ExecuteMarker,
}

impl JobContext {
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Work performed for each job attempt
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn run(&self, ctx: JobContext) -> Result<()>;
}

/// Entry in the completed or failed history bucket
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub order_id: Uuid,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Ready or waiting out a backoff/rate delay
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A job for this order id is already waiting or running
    Duplicate,
}
