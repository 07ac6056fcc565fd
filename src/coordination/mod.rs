//! Process-wide coordination: signal handling and shutdown sequencing.

pub mod shutdown;

pub use shutdown::{
    install_signal_handlers, GracefulShutdown, ShutdownPhase, ShutdownSignal, ShutdownToken,
};
