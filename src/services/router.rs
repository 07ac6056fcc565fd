//! Best-quote router.
//!
//! Fans a quote request out to every registered venue at once, waits for all
//! of them, and keeps the quote with the largest estimated output.

use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::domain::{Quote, Venue};
use crate::error::{Result, SwapError};
use crate::exchange::VenueAdapter;

pub struct QuoteRouter {
    adapters: Vec<Arc<dyn VenueAdapter>>,
}

impl QuoteRouter {
    pub fn new(adapters: Vec<Arc<dyn VenueAdapter>>) -> Self {
        let mut router = Self {
            adapters: Vec::with_capacity(adapters.len()),
        };
        for adapter in adapters {
            router.register(adapter);
        }
        router
    }

    /// Register an adapter, replacing any adapter already serving that venue.
    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>) {
        let venue = adapter.venue();
        info!("Registering venue adapter: {}", venue);
        self.adapters.retain(|existing| existing.venue() != venue);
        self.adapters.push(adapter);
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.adapters.iter().map(|a| a.venue()).collect()
    }

    pub fn adapter(&self, venue: Venue) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.iter().find(|a| a.venue() == venue).cloned()
    }

    /// Quote every venue concurrently and return the best result.
    pub async fn select_best(&self, token_in: &str, token_out: &str, amount: Decimal) -> Result<Quote> {
        if self.adapters.is_empty() {
            return Err(SwapError::NoVenuesAvailable(
                "no venue adapters registered".to_string(),
            ));
        }

        info!("Fetching quotes for {} {} -> {}", amount, token_in, token_out);

        let results = join_all(
            self.adapters
                .iter()
                .map(|adapter| quote_within_timeout(adapter.as_ref(), token_in, token_out, amount)),
        )
        .await;

        let mut quotes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (adapter, result) in self.adapters.iter().zip(results) {
            match result {
                Ok(quote) => {
                    info!(
                        venue = %quote.venue,
                        price = %quote.price,
                        fee = %quote.fee,
                        estimated_output = %quote.estimated_output,
                        "Quote received"
                    );
                    quotes.push(quote);
                }
                Err(e) => {
                    warn!(venue = %adapter.venue(), error = %e, "Venue excluded from routing");
                    failures.push(format!("{}: {}", adapter.venue(), e));
                }
            }
        }

        let best = pick_best(&quotes)
            .cloned()
            .ok_or_else(|| SwapError::NoVenuesAvailable(failures.join("; ")))?;

        let runner_up = quotes
            .iter()
            .filter(|q| q.venue != best.venue)
            .map(|q| q.estimated_output)
            .max();
        match runner_up {
            Some(next) => info!(
                "Selected {} (better by {})",
                best.venue,
                (best.estimated_output - next).round_dp(6)
            ),
            None => info!("Selected {} (only quote)", best.venue),
        }

        Ok(best)
    }

    /// Quote a single venue, used when the order is already routed.
    pub async fn quote_from(
        &self,
        venue: Venue,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
    ) -> Result<Quote> {
        let adapter = self.adapter(venue).ok_or_else(|| SwapError::QuoteVenue {
            venue: venue.to_string(),
            reason: "venue is not registered".to_string(),
        })?;
        quote_within_timeout(adapter.as_ref(), token_in, token_out, amount).await
    }
}

async fn quote_within_timeout(
    adapter: &dyn VenueAdapter,
    token_in: &str,
    token_out: &str,
    amount: Decimal,
) -> Result<Quote> {
    let limit = adapter.quote_timeout();
    match timeout(limit, adapter.quote(token_in, token_out, amount)).await {
        Ok(result) => result,
        Err(_) => Err(SwapError::QuoteTimeout {
            venue: adapter.venue().to_string(),
            elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Highest estimated output wins; equal outputs go to the lexicographically
/// smaller venue tag.
pub fn pick_best(quotes: &[Quote]) -> Option<&Quote> {
    quotes.iter().max_by(|a, b| {
        a.estimated_output
            .cmp(&b.estimated_output)
            .then_with(|| b.venue.as_str().cmp(a.venue.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockVenueAdapter;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn quoting(venue: Venue, price: Decimal, fee: Decimal) -> MockVenueAdapter {
        let mut mock = MockVenueAdapter::new();
        mock.expect_venue().return_const(venue);
        mock.expect_quote_timeout()
            .return_const(Duration::from_millis(200));
        mock.expect_quote()
            .returning(move |_, _, amount| Ok(Quote::new(venue, amount, price, fee)));
        mock
    }

    fn failing(venue: Venue) -> MockVenueAdapter {
        let mut mock = MockVenueAdapter::new();
        mock.expect_venue().return_const(venue);
        mock.expect_quote_timeout()
            .return_const(Duration::from_millis(200));
        mock.expect_quote().returning(move |_, _, _| {
            Err(SwapError::QuoteVenue {
                venue: venue.to_string(),
                reason: "pool drained".to_string(),
            })
        });
        mock
    }

    fn router(mocks: Vec<MockVenueAdapter>) -> QuoteRouter {
        QuoteRouter::new(
            mocks
                .into_iter()
                .map(|m| Arc::new(m) as Arc<dyn VenueAdapter>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn picks_highest_estimated_output() {
        // Meteora's lower fee beats Raydium's slightly better price
        let router = router(vec![
            quoting(Venue::Raydium, dec!(100.0), dec!(0.003)),
            quoting(Venue::Meteora, dec!(99.95), dec!(0.002)),
        ]);

        let best = router.select_best("SOL", "USDC", dec!(1.5)).await.unwrap();
        assert_eq!(best.venue, Venue::Meteora);
    }

    #[tokio::test]
    async fn tolerates_partial_failure() {
        let router = router(vec![
            failing(Venue::Raydium),
            quoting(Venue::Meteora, dec!(99), dec!(0.002)),
        ]);

        let best = router.select_best("SOL", "USDC", dec!(1)).await.unwrap();
        assert_eq!(best.venue, Venue::Meteora);
    }

    #[tokio::test]
    async fn all_failures_mean_no_venues() {
        let router = router(vec![failing(Venue::Raydium), failing(Venue::Meteora)]);

        let err = router.select_best("SOL", "USDC", dec!(1)).await.unwrap_err();
        assert!(matches!(err, SwapError::NoVenuesAvailable(_)));
        assert!(err.to_string().contains("pool drained"));
    }

    #[tokio::test]
    async fn empty_router_has_no_venues() {
        let router = QuoteRouter::new(Vec::new());
        assert!(matches!(
            router.select_best("SOL", "USDC", dec!(1)).await,
            Err(SwapError::NoVenuesAvailable(_))
        ));
    }

    struct StalledVenue;

    #[async_trait::async_trait]
    impl VenueAdapter for StalledVenue {
        fn venue(&self) -> Venue {
            Venue::Raydium
        }

        fn quote_timeout(&self) -> Duration {
            Duration::from_millis(20)
        }

        async fn quote(&self, _: &str, _: &str, amount: Decimal) -> Result<Quote> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Quote::new(Venue::Raydium, amount, dec!(1000), dec!(0.003)))
        }

        async fn execute(
            &self,
            _: &crate::domain::Order,
            _: &Quote,
        ) -> Result<crate::domain::SwapResult> {
            Err(SwapError::Execution("stalled".to_string()))
        }
    }

    #[tokio::test]
    async fn slow_venue_times_out_and_is_excluded() {
        let router = QuoteRouter::new(vec![
            Arc::new(StalledVenue) as Arc<dyn VenueAdapter>,
            Arc::new(quoting(Venue::Meteora, dec!(98), dec!(0.002))),
        ]);

        let started = tokio::time::Instant::now();
        let best = router.select_best("SOL", "USDC", dec!(1)).await.unwrap();
        assert_eq!(best.venue, Venue::Meteora);
        assert!(started.elapsed() < Duration::from_secs(1));

        let err = router
            .quote_from(Venue::Raydium, "SOL", "USDC", dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::QuoteTimeout { elapsed_ms: 20, .. }));
    }

    #[tokio::test]
    async fn quote_from_requires_registered_venue() {
        let router = router(vec![quoting(Venue::Meteora, dec!(98), dec!(0.002))]);

        let quote = router
            .quote_from(Venue::Meteora, "SOL", "USDC", dec!(2))
            .await
            .unwrap();
        assert_eq!(quote.estimated_output, dec!(2) * dec!(98) * dec!(0.998));

        assert!(matches!(
            router.quote_from(Venue::Raydium, "SOL", "USDC", dec!(2)).await,
            Err(SwapError::QuoteVenue { .. })
        ));
    }

    #[test]
    fn register_replaces_adapter_for_same_venue() {
        let mut router = router(vec![quoting(Venue::Raydium, dec!(100), dec!(0.003))]);
        router.register(Arc::new(quoting(Venue::Meteora, dec!(98), dec!(0.002))));
        router.register(Arc::new(quoting(Venue::Raydium, dec!(101), dec!(0.003))));

        assert_eq!(router.venues(), vec![Venue::Meteora, Venue::Raydium]);
    }

    #[test]
    fn ties_go_to_smaller_venue_tag() {
        let quotes = vec![
            Quote::new(Venue::Raydium, dec!(1), dec!(100), dec!(0.002)),
            Quote::new(Venue::Meteora, dec!(1), dec!(100), dec!(0.002)),
        ];
        assert_eq!(pick_best(&quotes).unwrap().venue, Venue::Meteora);

        let reversed: Vec<Quote> = quotes.into_iter().rev().collect();
        assert_eq!(pick_best(&reversed).unwrap().venue, Venue::Meteora);
    }
}
