//! Commonly used telemetry types.
//!
//! ```rust
//! use tether_telemetry::prelude::*;
//! ```

pub use crate::{
    FileRotation, LoadContext, LoadGuard, LogConfig, LogFormat, LogTarget, TelemetryError,
    TelemetryResult, setup_default_logging, setup_logging,
};
