//! Bullion Desk: chat operator console for gold dealers
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod registry;
pub mod format;
pub mod market;
pub mod session;
pub mod bot;
pub mod dashboard;
