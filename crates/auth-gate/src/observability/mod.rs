//! Observability module for Auth Gate.
//!
//! Provides metrics definitions and recording helpers. Logging goes
//! through `tracing` directly at each call site.

pub mod metrics;
