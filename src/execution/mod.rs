//! Order execution pipeline: the engine that drives each order, the queue
//! that schedules attempts, and the ingress glue between them.

pub mod engine;
pub mod ingress;
pub mod job;
pub mod queue;

pub use engine::{ExecutionEngine, SwapPlan};
pub use ingress::{accept_order, recover_unfinished};
pub use job::{
    EnqueueOutcome, ExecuteMarker, Job, JobContext, JobHandler, JobRecord, QueueStats,
};
pub use queue::JobQueue;
