//! Structured logging for blobcmd
//!
//! Installs a `tracing` subscriber configured from the blobcmd settings.
//!
//! # Features
//!
//! - **Output Formats**: pretty, compact and JSON
//! - **Level Filtering**: `log_level` from the config file, else `RUST_LOG`
//! - **Quiet Transport**: the HTTP client crates stay at `warn` under a debug level
//! - **stderr by Default**: stdout stays free for listing records, colors only on a terminal
//! - **Test Helper**: [`init_for_tests`] routes events through the test harness
//!
//! # Example
//!
//! ```no_run
//! use blobcmd_observability::{init_tracing, LogFormat};
//!
//! init_tracing(LogFormat::Pretty, Some("info")).unwrap();
//! tracing::info!("Application started");
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput, TRANSPORT_TARGETS};
pub use initialization::{init_for_tests, init_tracing, init_tracing_with_config};

/// Tracing re-exports for convenience
pub use tracing::{debug, error, info, trace, warn, Level};
