//! Middleware for Auth Gate.

pub mod auth;
