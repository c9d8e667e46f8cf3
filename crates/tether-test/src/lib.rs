//! Tether Test - Shared test utilities for the Tether crates.
//!
//! This crate provides a simulated host page, mock engine and script host,
//! and descriptor fixtures that can be used across the Tether crates as a
//! dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tether-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use tether_test::{MockFetcher, MockScriptHost, ScriptBehaviour, StaticExtension, TestHarness};
//!
//! #[tokio::test]
//! async fn test_load() {
//!     let ext = StaticExtension::new(tether_test::test_descriptor("demo")).into_object();
//!     let scripts = MockScriptHost::new().with_default_behaviour(ScriptBehaviour::Register(ext));
//!     let fetcher = MockFetcher::new().with_source("https://ext.example/demo.js", "// demo");
//!     let harness = TestHarness::new(scripts, fetcher);
//!     let context = harness.context();
//!
//!     context.loader().load("https://ext.example/demo.js").await.unwrap();
//!     assert!(context.registry().contains("demo"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
