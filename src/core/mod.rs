//! Core data structures for tilegen.
//!
//! - Source and build paths
//! - Targets (platform, ISA, build mode)
//! - Build environments
//! - The build graph and its ninja form
//! - Per-directory build descriptions

pub mod env;
pub mod graph;
pub mod manifest;
pub mod ninja;
pub mod path;
pub mod target;

pub use env::Env;
pub use graph::{BuildEdge, Fragment, Generator, Rule};
pub use manifest::DirManifest;
pub use path::{BuildPath, FilePath, SourcePath};
