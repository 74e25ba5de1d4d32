//! Core engine: classify, detect and drive the hourly run.

pub mod classifier;
pub mod detector;
pub mod orchestrator;
pub mod pricing;
pub mod scheduler;

pub use classifier::classify;
pub use detector::detect;
