pub mod factory;
pub mod simulator;
mod traits;

pub use factory::{build_venues, build_venues_for};
pub use simulator::{SimulatedVenue, SimulatorProfile, SimulatorSettings};
pub use traits::{VenueAdapter, DEFAULT_EXECUTE_TIMEOUT, DEFAULT_QUOTE_TIMEOUT};

#[cfg(test)]
pub use traits::MockVenueAdapter;
