use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the swap execution service
#[derive(Error, Debug)]
pub enum SwapError {
    // Ingress errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Venue errors
    #[error("Quote from {venue} timed out after {elapsed_ms}ms")]
    QuoteTimeout { venue: String, elapsed_ms: u64 },

    #[error("Quote from {venue} failed: {reason}")]
    QuoteVenue { venue: String, reason: String },

    #[error("No venue returned a quote: {0}")]
    NoVenuesAvailable(String),

    // Order execution errors
    #[error("Transaction build failed: {0}")]
    Build(String),

    #[error("Swap execution failed: {0}")]
    Execution(String),

    #[error("Swap outcome unknown, refusing to re-execute: {0}")]
    ExecutionIndeterminate(String),

    #[error("Slippage exceeded: minimum output {min_output}, actual output {actual_output}")]
    SlippageExceeded {
        min_output: Decimal,
        actual_output: Decimal,
    },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Push channel errors
    #[error("Push delivery failed: {0}")]
    Push(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for SwapError
pub type Result<T> = std::result::Result<T, SwapError>;

impl From<sqlx::Error> for SwapError {
    fn from(err: sqlx::Error) -> Self {
        SwapError::Persistence(err.to_string())
    }
}

impl SwapError {
    /// Stable tag for the error family, used in failure frames and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::InvalidRequest(_) => "InvalidRequest",
            SwapError::QuoteTimeout { .. } => "QuoteTimeout",
            SwapError::QuoteVenue { .. } => "QuoteVenueError",
            SwapError::NoVenuesAvailable(_) => "NoVenuesAvailable",
            SwapError::Build(_) => "BuildError",
            SwapError::Execution(_) => "ExecutionError",
            SwapError::ExecutionIndeterminate(_) => "ExecutionIndeterminate",
            SwapError::SlippageExceeded { .. } => "SlippageExceeded",
            SwapError::InvalidStateTransition { .. } => "InvalidStateTransition",
            SwapError::Persistence(_) | SwapError::Migration(_) => "PersistenceError",
            SwapError::Push(_) => "PushError",
            SwapError::Config(_) => "ConfigError",
            SwapError::Json(_) => "SerializationError",
            SwapError::Io(_) => "IoError",
            SwapError::Internal(_) => "InternalError",
        }
    }

    /// Whether the job layer may schedule another attempt after this error.
    ///
    /// `ExecutionIndeterminate` and `SlippageExceeded` are never retryable:
    /// the venue may already have filled the swap.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwapError::QuoteTimeout { .. }
                | SwapError::QuoteVenue { .. }
                | SwapError::NoVenuesAvailable(_)
                | SwapError::Execution(_)
                | SwapError::Persistence(_)
        )
    }

    /// Human-readable message sent to the client in a `failed` frame.
    pub fn client_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn retryable_errors_follow_job_policy() {
        assert!(SwapError::NoVenuesAvailable("none".into()).is_retryable());
        assert!(SwapError::Execution("rejected".into()).is_retryable());
        assert!(SwapError::Persistence("pool timed out".into()).is_retryable());

        assert!(!SwapError::ExecutionIndeterminate("crashed".into()).is_retryable());
        assert!(!SwapError::Build("bad quote".into()).is_retryable());
        assert!(!SwapError::SlippageExceeded {
            min_output: dec!(99),
            actual_output: dec!(90),
        }
        .is_retryable());
    }

    #[test]
    fn client_message_is_tagged() {
        let err = SwapError::NoVenuesAvailable("raydium: down; meteora: down".into());
        let msg = err.client_message();
        assert!(msg.starts_with("NoVenuesAvailable: "));
        assert!(msg.contains("meteora: down"));
    }
}
