//! metricount core: transport-agnostic contracts for the metric counter function.
//!
//! This crate defines the invocation envelope, the validated metric name, the
//! counter row, and the error surface shared by the function crate and its
//! tests. It carries no runtime or database dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed invocations must surface as `MetricError`/`Result`, never a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, MetricError};
