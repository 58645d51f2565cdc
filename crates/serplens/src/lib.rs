//! `serplens` crate (library surface).
//!
//! The primary entrypoint is the `serplens` binary. This module re-exports the core types and
//! local implementations so they can be embedded without depending on internal crate layout.

pub use serplens_core as core;
pub use serplens_local as local;
