//! Top-level facade crate for metricount.
//!
//! Re-exports the core contracts and the function library so users can depend on a single crate.

pub mod core {
    pub use metricount_core::*;
}

pub mod function {
    pub use metricount_function::*;
}
