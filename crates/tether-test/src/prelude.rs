//! Commonly used test helpers.
//!
//! ```rust
//! use tether_test::prelude::*;
//! ```

pub use crate::{
    FixtureHost, MockEngine, MockFetcher, MockScriptHost, MockServices, ScriptBehaviour,
    StaticExtension, TestHarness, gui_state, setup_test_logging, test_descriptor,
};
