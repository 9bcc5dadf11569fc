//! # Sentinel Runner
//!
//! Process-level plumbing around `sentinel-gates`: TOML configuration,
//! tracing initialization and the read-only control view consumed by the
//! `sentinel-check` binary.

pub mod config;
pub mod control_view;
pub mod observability;

pub use config::{DEFAULT_CONFIG_PATH, SentinelConfig};
pub use control_view::{CONTROL_VIEW_SCHEMA_VERSION, GovernanceControlView, format_mode};
pub use observability::{TracingGuards, init_tracing};
