//! Public facade crate for `omnisearch`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the provider-agnostic types, traits and validators from `omnisearch-core`.

pub use omnisearch_core::*;
