#![deny(unsafe_code)]

//! Shared test utilities for the CRMPilot workspace.
//!
//! Provides reusable fixtures, config builders, and tracing helpers so that
//! individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! crmpilot-test-utils = { workspace = true }
//! ```

pub mod agent;
pub mod backend;
pub mod config;
pub mod provider;
pub mod tracing_setup;

pub use agent::{TempConfig, TestAgent};
pub use backend::{BackendCall, RecordingBackend};
pub use config::TestConfigBuilder;
pub use provider::{ScriptedProvider, tool_call};
pub use tracing_setup::init_test_tracing;
