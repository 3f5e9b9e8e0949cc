//! Trade Sentinel: risk metrics and alerting for trading services
//!
//! This is the root crate that provides benchmark and integration test access
//! to the internal modules. For actual functionality, use the individual
//! crates directly:
//!
//! - `sentinel-core`: Domain types, configuration, database helpers
//! - `alert-engine`: Risk metrics, threshold evaluation, cooldowns, notification dispatch
//! - `alert-monitor`: The periodic alerting service binary

// Re-export for benchmarks
pub use alert_engine as engine;
pub use sentinel_core as core;
