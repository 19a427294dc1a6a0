//! Product builders.
//!
//! Every builder takes an environment and returns a graph fragment. The
//! mutable per-target state (load addresses, linker scripts, binaries,
//! Rust crates) lives in the [`Session`].

pub mod compile;
pub mod coordinator;
pub mod exe;
pub mod fs_image;
pub mod ldscript;
pub mod rules;
pub mod rust;
pub mod session;
pub mod toolchain;

pub use coordinator::Coordinator;
pub use session::{Session, SessionState, TargetState};
pub use toolchain::CrossToolchain;
