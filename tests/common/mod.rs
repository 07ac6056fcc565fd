#![allow(dead_code)]

use async_trait::async_trait;
use dexflow::adapters::{MemoryStore, OrderStore};
use dexflow::config::{EngineConfig, QueueConfig};
use dexflow::coordination::GracefulShutdown;
use dexflow::domain::{Order, Quote, SwapResult, Venue, DEFAULT_SLIPPAGE};
use dexflow::error::{Result, SwapError};
use dexflow::exchange::simulator::generate_tx_hash;
use dexflow::exchange::VenueAdapter;
use dexflow::execution::{accept_order, ExecutionEngine, JobQueue};
use dexflow::services::{Outbound, PushHandle, PushRegistry, QuoteRouter};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use uuid::Uuid;

/// Venue with a fixed price and scripted failures
pub struct ScriptedVenue {
    venue: Venue,
    price: Decimal,
    fee: Decimal,
    fail_quotes: bool,
    /// 1-based quote calls that fail
    failing_quote_calls: Vec<u32>,
    quote_calls: AtomicU32,
    quote_delay: Duration,
    execute_failures: AtomicU32,
    execute_delay: Duration,
    execute_calls: Mutex<Vec<Instant>>,
}

impl ScriptedVenue {
    pub fn new(venue: Venue, price: Decimal) -> Self {
        Self {
            venue,
            price,
            fee: dec!(0.003),
            fail_quotes: false,
            failing_quote_calls: Vec::new(),
            quote_calls: AtomicU32::new(0),
            quote_delay: Duration::ZERO,
            execute_failures: AtomicU32::new(0),
            execute_delay: Duration::ZERO,
            execute_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_quotes(mut self) -> Self {
        self.fail_quotes = true;
        self
    }

    /// Fail only the listed quote calls, counted from 1
    pub fn failing_quote_calls(mut self, calls: &[u32]) -> Self {
        self.failing_quote_calls = calls.to_vec();
        self
    }

    pub fn with_quote_delay(mut self, delay: Duration) -> Self {
        self.quote_delay = delay;
        self
    }

    /// Reject the first `n` execute calls with a definite error
    pub fn rejecting_first(self, n: u32) -> Self {
        self.execute_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = delay;
        self
    }

    pub fn execute_calls(&self) -> Vec<Instant> {
        self.execute_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VenueAdapter for ScriptedVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn quote(&self, _token_in: &str, _token_out: &str, amount: Decimal) -> Result<Quote> {
        let call = self.quote_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.quote_delay).await;
        if self.fail_quotes || self.failing_quote_calls.contains(&call) {
            return Err(SwapError::QuoteVenue {
                venue: self.venue.to_string(),
                reason: "pool unavailable".to_string(),
            });
        }
        Ok(Quote::new(self.venue, amount, self.price, self.fee))
    }

    async fn execute(&self, order: &Order, quote: &Quote) -> Result<SwapResult> {
        self.execute_calls.lock().unwrap().push(Instant::now());
        tokio::time::sleep(self.execute_delay).await;

        let remaining = self.execute_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.execute_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SwapError::Execution("transaction rejected".to_string()));
        }

        Ok(SwapResult {
            tx_hash: generate_tx_hash(),
            executed_price: quote.price,
            actual_output: order.amount_in * quote.price * (Decimal::ONE - quote.fee),
        })
    }
}

pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        backoff_base_ms: 20,
        ..Default::default()
    }
}

pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        build_delay_ms: 10,
        enforce_slippage: true,
    }
}

/// Engine, queue and registry wired over an in-memory store
pub struct Pipeline {
    pub store: MemoryStore,
    pub push: PushRegistry,
    pub queue: JobQueue,
    pub shutdown: GracefulShutdown,
}

impl Pipeline {
    pub fn start(venues: Vec<Arc<dyn VenueAdapter>>, queue_config: QueueConfig) -> Self {
        let store = MemoryStore::new();
        let push = PushRegistry::new();
        let queue = JobQueue::new(queue_config);
        let shutdown = GracefulShutdown::new();

        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(store.clone()),
            Arc::new(QuoteRouter::new(venues)),
            push.clone(),
            fast_engine_config(),
        ));
        queue.start(engine, shutdown.token());

        Self {
            store,
            push,
            queue,
            shutdown,
        }
    }

    /// Accept `order` the way the WebSocket endpoint does
    pub async fn submit(&self, order: Order) -> (Uuid, UnboundedReceiver<Outbound>) {
        let (handle, rx) = PushHandle::channel();
        let id = accept_order(&self.store, &self.push, &self.queue, order, handle)
            .await
            .expect("order accepted");
        (id, rx)
    }

    /// Poll the store until the order is confirmed or failed
    pub async fn wait_terminal(&self, id: Uuid, limit: Duration) -> Order {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(order) = self.store.get(id).await.unwrap() {
                if order.status.is_terminal() {
                    return order;
                }
            }
            assert!(Instant::now() < deadline, "order {} never settled", id);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn sol_usdc(amount: Decimal) -> Order {
    Order::new("SOL", "USDC", amount, DEFAULT_SLIPPAGE)
}

/// Read frames until the connection is closed or `limit` passes
pub async fn collect_frames(
    rx: &mut UnboundedReceiver<Outbound>,
    limit: Duration,
) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    let deadline = Instant::now() + limit;
    while let Ok(Some(outbound)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        match outbound {
            Outbound::Text(text) => frames.push(serde_json::from_str(&text).unwrap()),
            Outbound::Close => break,
        }
    }
    frames
}

pub fn statuses(frames: &[serde_json::Value]) -> Vec<&str> {
    frames
        .iter()
        .map(|f| f["status"].as_str().unwrap())
        .collect()
}

/// Like [`collect_frames`], also reporting whether a Close arrived
pub async fn collect_until_close(
    rx: &mut UnboundedReceiver<Outbound>,
    limit: Duration,
) -> (Vec<serde_json::Value>, bool) {
    let mut frames = Vec::new();
    let deadline = Instant::now() + limit;
    while let Ok(Some(outbound)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        match outbound {
            Outbound::Text(text) => frames.push(serde_json::from_str(&text).unwrap()),
            Outbound::Close => return (frames, true),
        }
    }
    (frames, false)
}
