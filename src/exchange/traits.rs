use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::{Order, Quote, SwapResult, Venue};
use crate::error::Result;

pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Quote-and-execute capability of one liquidity venue.
///
/// `quote` must be idempotent. `execute` is not: the engine calls it at most
/// once per order unless the previous call definitively failed with
/// `SwapError::Execution`. Adapters should report a definite rejection as
/// `Execution` and anything where the swap may have landed as
/// `ExecutionIndeterminate`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    /// Upper bound the router puts on a single `quote` call
    fn quote_timeout(&self) -> Duration {
        DEFAULT_QUOTE_TIMEOUT
    }

    /// Upper bound the engine puts on a single `execute` call
    fn execute_timeout(&self) -> Duration {
        DEFAULT_EXECUTE_TIMEOUT
    }

    async fn quote(&self, token_in: &str, token_out: &str, amount: Decimal) -> Result<Quote>;

    async fn execute(&self, order: &Order, quote: &Quote) -> Result<SwapResult>;
}
