pub mod adapters;
pub mod api;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod services;
pub mod validation;

pub use adapters::{MemoryStore, OrderStore, PostgresStore};
pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownPhase, ShutdownSignal, ShutdownToken};
pub use domain::{ErrorFrame, Order, OrderStatus, Quote, StatusFrame, SwapResult, Venue};
pub use error::{Result, SwapError};
pub use exchange::{build_venues, SimulatedVenue, VenueAdapter};
pub use execution::{accept_order, recover_unfinished, ExecutionEngine, JobQueue, QueueStats};
pub use services::{PushHandle, PushRegistry, QuoteRouter};
