//! swcache - offline-cache lifecycle controller
//!
//! Keeps a versioned copy of an origin's essential assets, serves
//! requests cache-first with network fallback, and hands control from one
//! cache version to the next without breaking open pages.

pub mod audit;
pub mod bypass;
pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod net;
pub mod protocol;
pub mod registration;
pub mod store;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{SwcacheError, SwcacheResult};
