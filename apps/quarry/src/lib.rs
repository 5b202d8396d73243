//! # Quarry Library
//!
//! This library exposes the CLI host modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod cli;
pub mod config;
pub mod error;
pub mod host;

// Re-export quarry_core for convenience
pub use quarry_core;
