#![forbid(unsafe_code)]
//! XFSR public API facade.
//!
//! Re-exports the volume, handle and error types from `xfsr-core`. Embedders
//! and the inspector binary depend on this crate only.

pub use xfsr_core::*;
