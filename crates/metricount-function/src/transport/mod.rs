//! Transport layer modules.
//!
//! - `invoke`: accepts invocation events over HTTP and returns the response envelope.

pub mod invoke;
