//! Simulated venues.
//!
//! Stand-ins for real AMM venues: quotes drift around a base price inside a
//! per-venue band, executions take a few seconds and land within ±0.5% of the
//! quoted price.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::domain::{Order, Quote, SwapResult, Venue};
use crate::error::{Result, SwapError};

use super::{VenueAdapter, DEFAULT_EXECUTE_TIMEOUT, DEFAULT_QUOTE_TIMEOUT};

const TX_HASH_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const TX_HASH_LEN: usize = 88;
/// Executions land within ±0.5% of the quoted price
const EXECUTION_SLIPPAGE_SPAN: f64 = 0.01;

/// Price behaviour of one simulated venue
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorProfile {
    pub venue: Venue,
    /// Lower bound of the relative price deviation from base
    pub band_low: f64,
    /// Upper bound of the relative price deviation from base
    pub band_high: f64,
    pub fee: Decimal,
}

impl SimulatorProfile {
    pub fn raydium() -> Self {
        Self {
            venue: Venue::Raydium,
            band_low: -0.02,
            band_high: 0.02,
            fee: dec!(0.003),
        }
    }

    pub fn meteora() -> Self {
        Self {
            venue: Venue::Meteora,
            band_low: -0.03,
            band_high: 0.02,
            fee: dec!(0.002),
        }
    }

    pub fn for_venue(venue: Venue) -> Self {
        match venue {
            Venue::Raydium => Self::raydium(),
            Venue::Meteora => Self::meteora(),
        }
    }
}

/// Latencies and limits shared by all simulated venues
#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    pub base_price: Decimal,
    pub quote_latency: Duration,
    pub execute_latency_min: Duration,
    pub execute_latency_max: Duration,
    pub quote_timeout: Duration,
    pub execute_timeout: Duration,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            base_price: dec!(100),
            quote_latency: Duration::from_millis(200),
            execute_latency_min: Duration::from_millis(2_000),
            execute_latency_max: Duration::from_millis(3_000),
            quote_timeout: DEFAULT_QUOTE_TIMEOUT,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
        }
    }
}

/// In-process venue that fabricates quotes and fills
#[derive(Debug, Clone)]
pub struct SimulatedVenue {
    profile: SimulatorProfile,
    settings: SimulatorSettings,
}

impl SimulatedVenue {
    pub fn new(profile: SimulatorProfile, settings: SimulatorSettings) -> Self {
        Self { profile, settings }
    }

    fn reject_quote(&self, reason: impl Into<String>) -> SwapError {
        SwapError::QuoteVenue {
            venue: self.profile.venue.to_string(),
            reason: reason.into(),
        }
    }

    fn validate_quote_input(&self, token_in: &str, token_out: &str, amount: Decimal) -> Result<()> {
        if token_in.trim().is_empty() || token_out.trim().is_empty() {
            return Err(self.reject_quote("token symbols must not be empty"));
        }
        if token_in.eq_ignore_ascii_case(token_out) {
            return Err(self.reject_quote(format!("cannot swap {} for itself", token_in)));
        }
        if amount <= Decimal::ZERO {
            return Err(self.reject_quote(format!("amount must be positive, got {}", amount)));
        }
        Ok(())
    }

    fn execute_latency(&self) -> Duration {
        let min = u64::try_from(self.settings.execute_latency_min.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.settings.execute_latency_max.as_millis()).unwrap_or(u64::MAX);
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Random 88-character base58 string, shaped like a Solana signature
pub fn generate_tx_hash() -> String {
    let mut rng = rand::thread_rng();
    (0..TX_HASH_LEN)
        .map(|_| TX_HASH_ALPHABET[rng.gen_range(0..TX_HASH_ALPHABET.len())] as char)
        .collect()
}

#[async_trait]
impl VenueAdapter for SimulatedVenue {
    fn venue(&self) -> Venue {
        self.profile.venue
    }

    fn quote_timeout(&self) -> Duration {
        self.settings.quote_timeout
    }

    fn execute_timeout(&self) -> Duration {
        self.settings.execute_timeout
    }

    async fn quote(&self, token_in: &str, token_out: &str, amount: Decimal) -> Result<Quote> {
        self.validate_quote_input(token_in, token_out, amount)?;

        sleep(self.settings.quote_latency).await;

        let deviation = rand::thread_rng().gen_range(self.profile.band_low..=self.profile.band_high);
        let deviation = Decimal::from_f64(deviation)
            .ok_or_else(|| self.reject_quote("price deviation out of range"))?;
        let price = (self.settings.base_price * (Decimal::ONE + deviation)).round_dp(8);

        let quote = Quote::new(self.profile.venue, amount, price, self.profile.fee);
        debug!(
            venue = %self.profile.venue,
            %price,
            estimated_output = %quote.estimated_output,
            "{} {} -> {} quoted",
            amount,
            token_in,
            token_out
        );
        Ok(quote)
    }

    async fn execute(&self, order: &Order, quote: &Quote) -> Result<SwapResult> {
        if quote.venue != self.profile.venue {
            return Err(SwapError::Execution(format!(
                "quote from {} submitted to {}",
                quote.venue, self.profile.venue
            )));
        }

        sleep(self.execute_latency()).await;

        let factor = 1.0 + (rand::thread_rng().gen::<f64>() - 0.5) * EXECUTION_SLIPPAGE_SPAN;
        let factor = Decimal::from_f64(factor)
            .ok_or_else(|| SwapError::Execution("slippage factor out of range".to_string()))?;
        let executed_price = (quote.price * factor).round_dp(8);
        let actual_output = order.amount_in * executed_price * (Decimal::ONE - quote.fee);
        let tx_hash = generate_tx_hash();

        info!(
            order_id = %order.id,
            venue = %self.profile.venue,
            %executed_price,
            %tx_hash,
            "Swap executed"
        );

        Ok(SwapResult {
            tx_hash,
            executed_price,
            actual_output,
        })
    }
}
