//! Public facade crate for `bodyscope`.
//!
//! This crate intentionally contains no IO or engine logic.
//! It re-exports the backend-agnostic types/traits from `bodyscope-core`.

pub use bodyscope_core::*;
