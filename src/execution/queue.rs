//! In-process job queue.
//!
//! Jobs are keyed by order id and scheduled by ready-at instant. A single
//! dispatcher task starts jobs subject to the concurrency and rate caps; each
//! attempt runs on its own task and reports back through [`JobQueue::finish`],
//! which either retires the job to a history bucket or schedules a retry with
//! exponential backoff.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::coordination::ShutdownToken;
use crate::domain::Order;
use crate::error::{Result, SwapError};

use super::job::{
    EnqueueOutcome, ExecuteMarker, Job, JobContext, JobHandler, JobRecord, QueueStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    ready_at: Instant,
    seq: u64,
    id: Uuid,
}

#[derive(Default)]
struct QueueState {
    /// Waiting, delayed and active jobs
    jobs: HashMap<Uuid, Job>,
    schedule: BinaryHeap<Reverse<Scheduled>>,
    active: HashSet<Uuid>,
    completed: VecDeque<JobRecord>,
    failed: VecDeque<JobRecord>,
    recent_starts: VecDeque<Instant>,
    next_seq: u64,
}

impl QueueState {
    fn schedule_at(&mut self, id: Uuid, ready_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.schedule.push(Reverse(Scheduled { ready_at, seq, id }));
    }
}

struct Inner {
    config: QueueConfig,
    state: Mutex<QueueState>,
    wake: Notify,
    active_tx: watch::Sender<usize>,
}

#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (active_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(QueueState::default()),
                wake: Notify::new(),
                active_tx,
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Add a job for `order`. A second enqueue while the first is still
    /// waiting or running is a no-op.
    pub async fn enqueue(&self, order: Order) -> EnqueueOutcome {
        let id = order.id;
        let mut state = self.inner.state.lock().await;
        if state.jobs.contains_key(&id) {
            debug!(order_id = %id, "Duplicate enqueue ignored");
            return EnqueueOutcome::Duplicate;
        }

        state.jobs.insert(id, Job::new(order));
        state.schedule_at(id, Instant::now());
        drop(state);

        debug!(order_id = %id, "Job enqueued");
        self.inner.wake.notify_one();
        EnqueueOutcome::Enqueued
    }

    pub async fn contains(&self, order_id: Uuid) -> bool {
        self.inner.state.lock().await.jobs.contains_key(&order_id)
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().await;
        QueueStats {
            waiting: state.jobs.len() - state.active.len(),
            active: state.active.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
        }
    }

    pub async fn completed_jobs(&self) -> Vec<JobRecord> {
        self.inner.state.lock().await.completed.iter().cloned().collect()
    }

    pub async fn failed_jobs(&self) -> Vec<JobRecord> {
        self.inner.state.lock().await.failed.iter().cloned().collect()
    }

    /// Spawn the dispatcher. It stops starting jobs once `shutdown` fires;
    /// attempts already running are left to [`JobQueue::drain`].
    pub fn start(&self, handler: Arc<dyn JobHandler>, mut shutdown: ShutdownToken) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            info!(
                concurrency = queue.inner.config.concurrency,
                max_attempts = queue.inner.config.max_attempts,
                "Job dispatcher started"
            );
            loop {
                let next_wake = queue.dispatch_ready(&handler).await;
                tokio::select! {
                    signal = shutdown.wait_for_shutdown() => {
                        info!("Job dispatcher stopping ({})", signal);
                        break;
                    }
                    _ = queue.inner.wake.notified() => {}
                    _ = sleep_until_opt(next_wake) => {}
                }
            }
        })
    }

    /// Start every job that is ready and allowed. Returns when the dispatcher
    /// should look again if nothing else wakes it first.
    async fn dispatch_ready(&self, handler: &Arc<dyn JobHandler>) -> Option<Instant> {
        let config = &self.inner.config;
        let window = config.rate_limit_window();
        let mut state = self.inner.state.lock().await;

        loop {
            if state.active.len() >= config.concurrency {
                return None;
            }

            let now = Instant::now();
            let next = match state.schedule.peek() {
                Some(Reverse(next)) => *next,
                None => return None,
            };
            if next.ready_at > now {
                return Some(next.ready_at);
            }

            while let Some(&started) = state.recent_starts.front() {
                if now.duration_since(started) >= window {
                    state.recent_starts.pop_front();
                } else {
                    break;
                }
            }
            if state.recent_starts.len() >= config.rate_limit_max {
                return state.recent_starts.front().map(|&started| started + window);
            }

            state.schedule.pop();
            if state.active.contains(&next.id) {
                continue;
            }
            let ctx = match state.jobs.get(&next.id) {
                Some(job) => JobContext {
                    order: job.order.clone(),
                    attempt: job.attempts_made + 1,
                    max_attempts: config.max_attempts,
                    execute_rejected: job.execute_rejected,
                    execute_marker: ExecuteMarker::default(),
                },
                None => continue,
            };

            state.active.insert(next.id);
            state.recent_starts.push_back(now);
            self.inner.active_tx.send_replace(state.active.len());

            debug!(order_id = %next.id, attempt = ctx.attempt, "Job attempt starting");
            self.spawn_attempt(next.id, ctx, handler.clone());
        }
    }

    fn spawn_attempt(&self, id: Uuid, ctx: JobContext, handler: Arc<dyn JobHandler>) {
        let queue = self.clone();
        let marker = ctx.execute_marker.clone();
        tokio::spawn(async move {
            let result = match tokio::spawn(async move { handler.run(ctx).await }).await {
                Ok(result) => result,
                Err(e) => Err(SwapError::Internal(format!("job worker aborted: {}", e))),
            };
            queue.finish(id, result, marker.is_marked()).await;
        });
    }

    /// Record the outcome of one attempt. `reached_execute` tells whether the
    /// attempt called a venue's execute; only such an attempt can change what
    /// is known about the last execute call.
    async fn finish(&self, id: Uuid, result: Result<()>, reached_execute: bool) {
        let config = &self.inner.config;
        let mut state = self.inner.state.lock().await;
        state.active.remove(&id);
        self.inner.active_tx.send_replace(state.active.len());

        let mut job = match state.jobs.remove(&id) {
            Some(job) => job,
            None => {
                warn!(order_id = %id, "Finished job is not tracked");
                return;
            }
        };
        job.attempts_made += 1;

        match result {
            Ok(()) => {
                info!(order_id = %id, attempts = job.attempts_made, "Job completed");
                push_capped(
                    &mut state.completed,
                    config.completed_history,
                    JobRecord {
                        order_id: id,
                        attempts: job.attempts_made,
                        finished_at: Utc::now(),
                        error: None,
                    },
                );
            }
            Err(e) if e.is_retryable() && job.attempts_made < config.max_attempts => {
                let delay = config.backoff_delay(job.attempts_made);
                warn!(
                    order_id = %id,
                    attempt = job.attempts_made,
                    error = %e,
                    "Job attempt failed, retrying in {:?}",
                    delay
                );
                if reached_execute {
                    job.execute_rejected = matches!(e, SwapError::Execution(_));
                }
                state.jobs.insert(id, job);
                state.schedule_at(id, Instant::now() + delay);
            }
            Err(e) => {
                error!(
                    order_id = %id,
                    attempts = job.attempts_made,
                    error = %e,
                    "Job failed permanently"
                );
                push_capped(
                    &mut state.failed,
                    config.failed_history,
                    JobRecord {
                        order_id: id,
                        attempts: job.attempts_made,
                        finished_at: Utc::now(),
                        error: Some(e.client_message()),
                    },
                );
            }
        }

        drop(state);
        self.inner.wake.notify_one();
    }

    /// Wait for in-flight attempts to finish. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let mut active_rx = self.inner.active_tx.subscribe();
        let idle = async {
            loop {
                if *active_rx.borrow_and_update() == 0 {
                    return;
                }
                if active_rx.changed().await.is_err() {
                    return;
                }
            }
        };

        match tokio::time::timeout(timeout, idle).await {
            Ok(()) => {
                info!("Job queue drained");
                true
            }
            Err(_) => {
                let active = *self.inner.active_tx.borrow();
                warn!(active, "Job queue drain timed out after {:?}", timeout);
                false
            }
        }
    }
}

fn push_capped(bucket: &mut VecDeque<JobRecord>, cap: usize, record: JobRecord) {
    bucket.push_back(record);
    while bucket.len() > cap {
        bucket.pop_front();
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
