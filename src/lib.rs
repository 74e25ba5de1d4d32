//! CAPWATCH: wallet market-cap bracket watcher
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod sources;
pub mod alerts;
pub mod engine;
pub mod storage;
pub mod export;
