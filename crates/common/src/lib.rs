//! Common utilities shared across Auth Gate crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for unverified JWT inspection (size limits, header and claims peeking)
pub mod jwt;
