//! High-level operations.
//!
//! This module contains the implementation of tilegen commands.

pub mod generate;
pub mod traverse;

pub use generate::{
    check, construct, describe_envs, generate, render, GenerateOptions, GenerateResult,
    Generation, OutputFormat,
};
pub use traverse::{BuildCx, BuildScript, ScriptRegistry};
