//! tilegen - build graph generator for tiled many-core systems
//!
//! This crate walks a source tree, builds cross-compilation environments for
//! every selected ISA and emits one static build description (ninja) for an
//! external executor.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Temporary project trees and ready-made environments for unit tests.
#[cfg(test)]
pub mod test_support;

pub use core::{env::Env, graph::Generator};
pub use ops::{generate, GenerateOptions};
