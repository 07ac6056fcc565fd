//! Order execution engine.
//!
//! Drives one order through `pending → routing → building → submitted →
//! confirmed` per job attempt. Every step commits in the same order: mutate a
//! copy of the order, upsert it, adopt it, then push the frame. A frame is
//! therefore never sent for a status the store does not hold.
//!
//! An attempt resumes from whatever status the store already has, so a retry
//! after a routing failure re-routes without repeating `routing`, and a retry
//! that finds the order `submitted` only calls the venue again when the
//! previous attempt saw a definite rejection.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapters::OrderStore;
use crate::config::EngineConfig;
use crate::domain::{ErrorFrame, Order, OrderStatus, Quote, StatusFrame, SwapResult};
use crate::error::{Result, SwapError};
use crate::services::{PushRegistry, QuoteRouter};

use super::job::{ExecuteMarker, JobContext, JobHandler};

/// Validated instructions for the venue
#[derive(Debug, Clone, PartialEq)]
pub struct SwapPlan {
    pub quote: Quote,
    /// Least output the order will accept
    pub min_output: Decimal,
}

impl SwapPlan {
    pub fn build(order: &Order, quote: Quote) -> Result<Self> {
        if order.selected_venue != Some(quote.venue) {
            return Err(SwapError::Build(format!(
                "quote from {} does not match selected venue {:?}",
                quote.venue, order.selected_venue
            )));
        }
        if quote.estimated_output <= Decimal::ZERO {
            return Err(SwapError::Build(format!(
                "estimated output must be positive, got {}",
                quote.estimated_output
            )));
        }

        let min_output = quote.estimated_output * (Decimal::ONE - order.slippage);
        if min_output <= Decimal::ZERO {
            return Err(SwapError::Build(format!(
                "slippage {} leaves no minimum output",
                order.slippage
            )));
        }

        Ok(Self { quote, min_output })
    }
}

/// Frame describing the order as it now stands
fn frame_for(order: &Order) -> StatusFrame {
    let mut frame = StatusFrame::new(order.id, order.status);
    if let Some(venue) = order.selected_venue {
        frame = frame.with_venue(venue);
    }
    if let Some(price) = order.executed_price {
        frame = frame.with_price(price);
    }
    if let Some(tx_hash) = &order.tx_hash {
        frame = frame.with_tx_hash(tx_hash.clone());
    }
    if let Some(error) = &order.error {
        frame = frame.with_error(error.clone());
    }
    frame
}

pub struct ExecutionEngine {
    store: Arc<dyn OrderStore>,
    router: Arc<QuoteRouter>,
    push: PushRegistry,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        router: Arc<QuoteRouter>,
        push: PushRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            router,
            push,
            config,
        }
    }

    /// Run one attempt for the order in `ctx`.
    pub async fn process(&self, ctx: JobContext) -> Result<()> {
        let order_id = ctx.order.id;
        let mut order = match self.store.get(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(%order_id, "Order missing from store, using queued snapshot");
                ctx.order.clone()
            }
            Err(e) => {
                self.release_if_retiring(order_id, &ctx, &e).await;
                return Err(e);
            }
        };

        if order.status.is_terminal() {
            info!(%order_id, status = %order.status, "Order already settled");
            self.push.finish(order_id, &frame_for(&order)).await;
            return Ok(());
        }

        info!(
            %order_id,
            attempt = ctx.attempt,
            status = %order.status,
            "Processing order"
        );

        match self.drive(&mut order, &ctx).await {
            Ok(()) => Ok(()),
            Err(e) => self.settle_failure(&order, &ctx, e).await,
        }
    }

    async fn drive(&self, order: &mut Order, ctx: &JobContext) -> Result<()> {
        let mut quote: Option<Quote> = None;
        let mut plan: Option<SwapPlan> = None;
        let mut submitted_here = false;

        loop {
            match order.status {
                OrderStatus::Pending => {
                    self.commit(order, |o| o.transition(OrderStatus::Routing))
                        .await?;
                    self.push.send(order.id, &frame_for(order)).await;
                }
                OrderStatus::Routing => {
                    let best = self
                        .router
                        .select_best(&order.token_in, &order.token_out, order.amount_in)
                        .await?;
                    self.commit(order, |o| {
                        o.select_venue(best.venue)?;
                        o.transition(OrderStatus::Building)
                    })
                    .await?;
                    self.push
                        .send(order.id, &frame_for(order).with_price(best.price))
                        .await;
                    quote = Some(best);
                }
                OrderStatus::Building => {
                    let quote = match quote.take() {
                        Some(quote) => quote,
                        None => self.requote(order).await?,
                    };
                    let built = SwapPlan::build(order, quote)?;
                    debug!(
                        order_id = %order.id,
                        min_output = %built.min_output,
                        "Swap plan built"
                    );
                    sleep(self.config.build_delay()).await;

                    self.commit(order, |o| o.transition(OrderStatus::Submitted))
                        .await?;
                    self.push.send(order.id, &frame_for(order)).await;
                    submitted_here = true;
                    plan = Some(built);
                }
                OrderStatus::Submitted => {
                    if !submitted_here && !ctx.execute_rejected {
                        return Err(SwapError::ExecutionIndeterminate(
                            "order was submitted by an earlier attempt with no recorded rejection"
                                .to_string(),
                        ));
                    }
                    let plan = match plan.take() {
                        Some(plan) => plan,
                        None => SwapPlan::build(order, self.requote(order).await?)?,
                    };

                    let swap = self
                        .execute(order, &plan.quote, &ctx.execute_marker)
                        .await?;
                    if self.config.enforce_slippage && swap.actual_output < plan.min_output {
                        return Err(SwapError::SlippageExceeded {
                            min_output: plan.min_output,
                            actual_output: swap.actual_output,
                        });
                    }

                    self.commit(order, |o| o.confirm(&swap)).await?;
                    info!(
                        order_id = %order.id,
                        tx_hash = %swap.tx_hash,
                        executed_price = %swap.executed_price,
                        "Order confirmed"
                    );
                    self.push.finish(order.id, &frame_for(order)).await;
                    return Ok(());
                }
                OrderStatus::Confirmed | OrderStatus::Failed => return Ok(()),
            }
        }
    }

    /// Apply `change` to a copy of `order`, persist it, then adopt it.
    async fn commit<F>(&self, order: &mut Order, change: F) -> Result<()>
    where
        F: FnOnce(&mut Order) -> Result<()>,
    {
        let mut next = order.clone();
        change(&mut next)?;
        if let Err(problems) = next.validate() {
            return Err(SwapError::Internal(problems.join("; ")));
        }

        self.store.upsert(&next).await?;
        info!(
            order_id = %next.id,
            from = %order.status,
            to = %next.status,
            "Order status changed"
        );
        *order = next;
        Ok(())
    }

    async fn requote(&self, order: &Order) -> Result<Quote> {
        let venue = order.selected_venue.ok_or_else(|| {
            SwapError::Build(format!("{} order has no selected venue", order.status))
        })?;
        debug!(order_id = %order.id, %venue, "Re-quoting selected venue");
        self.router
            .quote_from(venue, &order.token_in, &order.token_out, order.amount_in)
            .await
    }

    /// Call the venue once. Anything other than a definite rejection leaves
    /// the swap outcome unknown.
    async fn execute(
        &self,
        order: &Order,
        quote: &Quote,
        marker: &ExecuteMarker,
    ) -> Result<SwapResult> {
        let adapter = self.router.adapter(quote.venue).ok_or_else(|| {
            SwapError::Execution(format!("venue {} is not registered", quote.venue))
        })?;

        let limit = adapter.execute_timeout();
        marker.mark();
        match timeout(limit, adapter.execute(order, quote)).await {
            Ok(Ok(swap)) => Ok(swap),
            Ok(Err(e @ SwapError::Execution(_))) => Err(e),
            Ok(Err(e @ SwapError::ExecutionIndeterminate(_))) => Err(e),
            Ok(Err(other)) => Err(SwapError::ExecutionIndeterminate(other.to_string())),
            Err(_) => Err(SwapError::ExecutionIndeterminate(format!(
                "{} did not answer within {}ms",
                quote.venue,
                limit.as_millis()
            ))),
        }
    }

    /// Decide what an attempt's error means for the order. Retryable errors
    /// with attempts left are handed back to the queue untouched; anything
    /// else moves the order to `failed`.
    async fn settle_failure(&self, order: &Order, ctx: &JobContext, err: SwapError) -> Result<()> {
        if err.is_retryable() && !ctx.is_final_attempt() {
            warn!(
                order_id = %order.id,
                attempt = ctx.attempt,
                status = %order.status,
                error = %err,
                "Attempt failed, order left for retry"
            );
            return Err(err);
        }

        let message = err.client_message();
        let mut failed = order.clone();
        if let Err(e) = failed.fail(message.clone()) {
            error!(order_id = %order.id, error = %e, "Cannot mark order failed");
            self.release_if_retiring(order.id, ctx, &err).await;
            return Err(err);
        }
        if let Err(write_err) = self.store.upsert(&failed).await {
            error!(
                order_id = %order.id,
                error = %write_err,
                cause = %err,
                "Failed to persist failed status"
            );
            self.release_if_retiring(order.id, ctx, &write_err).await;
            return Err(write_err);
        }

        error!(order_id = %order.id, status = %order.status, error = %message, "Order failed");
        self.push.finish(order.id, &frame_for(&failed)).await;
        Err(err)
    }

    /// When `err` is about to retire the job without a terminal status in
    /// the store, close the client connection with a bare error frame. No
    /// status frame goes out for a status that was never persisted.
    async fn release_if_retiring(&self, order_id: Uuid, ctx: &JobContext, err: &SwapError) {
        if err.is_retryable() && !ctx.is_final_attempt() {
            return;
        }
        warn!(%order_id, error = %err, "Releasing connection without a terminal status");
        self.push
            .finish(order_id, &ErrorFrame::new(err.client_message()))
            .await;
    }
}

#[async_trait]
impl JobHandler for ExecutionEngine {
    async fn run(&self, ctx: JobContext) -> Result<()> {
        self.process(ctx).await
    }
}
