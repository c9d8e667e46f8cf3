//! Tether Telemetry - logging setup and load tracing.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - A conversion from the `[logging]` config section
//! - Per-load contexts that tie every log line of one extension load together
//!
//! # Example
//!
//! ```rust,no_run
//! use tether_telemetry::{LoadContext, LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), tether_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("tether_traps=trace");
//! setup_logging(&config)?;
//!
//! let ctx = LoadContext::new("https://extensions.example/fetch.js");
//! let _guard = ctx.span().entered();
//! tracing::info!("loading");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{LoadContext, LoadGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
