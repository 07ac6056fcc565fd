use std::sync::Arc;
use std::time::Duration;

use crate::config::VenueConfig;
use crate::domain::Venue;
use crate::error::{Result, SwapError};

use super::{SimulatedVenue, SimulatorProfile, SimulatorSettings, VenueAdapter};

/// Create the venue adapters named in `VenueConfig::enabled`.
pub fn build_venues(config: &VenueConfig) -> Result<Vec<Arc<dyn VenueAdapter>>> {
    let mut venues = Vec::with_capacity(config.enabled.len());
    for name in &config.enabled {
        let venue = name
            .parse::<Venue>()
            .map_err(|e| SwapError::Internal(format!("venues.enabled: {}", e)))?;
        if venues.contains(&venue) {
            continue;
        }
        venues.push(venue);
    }

    if venues.is_empty() {
        return Err(SwapError::Internal(
            "venues.enabled must name at least one venue".to_string(),
        ));
    }

    Ok(build_venues_for(&venues, config))
}

/// Create simulated adapters for an explicit venue list.
pub fn build_venues_for(venues: &[Venue], config: &VenueConfig) -> Vec<Arc<dyn VenueAdapter>> {
    let settings = SimulatorSettings {
        base_price: config.base_price,
        quote_latency: Duration::from_millis(config.quote_latency_ms),
        execute_latency_min: Duration::from_millis(config.execute_latency_min_ms),
        execute_latency_max: Duration::from_millis(config.execute_latency_max_ms),
        quote_timeout: Duration::from_millis(config.quote_timeout_ms),
        execute_timeout: Duration::from_millis(config.execute_timeout_ms),
    };

    venues
        .iter()
        .map(|venue| {
            let adapter: Arc<dyn VenueAdapter> = Arc::new(SimulatedVenue::new(
                SimulatorProfile::for_venue(*venue),
                settings.clone(),
            ));
            adapter
        })
        .collect()
}
