//! Watchpost daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `watchpost-daemon` is used as a binary (main.rs).

pub mod bus;
pub mod cli;
pub mod ingest;
pub mod logging;
pub mod orchestrator;
pub mod service;
