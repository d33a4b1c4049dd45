//! Process bootstrap: logging, backend wiring and shutdown

pub mod backend;
pub mod logging;
pub mod shutdown;

pub use backend::{Services, build_services};
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{ShutdownSignal, drain_on_shutdown, join_with_timeout, wait_for_shutdown_signal};
