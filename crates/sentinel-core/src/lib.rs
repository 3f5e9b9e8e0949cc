//! Sentinel Core Library
//!
//! Shared domain types, configuration loading, and database helpers for the
//! Trade Sentinel risk and alert services.

pub mod config;
pub mod db;
pub mod error;
pub mod types;

pub use error::{Error, Result};
