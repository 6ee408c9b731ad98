//! Providers Module - External Data Sources
//!
//! Transport, rate-limited client and the activity-service seam with its
//! explorer-backed implementation.

pub mod client;
pub mod etherscan;
pub mod service;

pub use client::*;
pub use etherscan::*;
pub use service::*;
