//! Command implementations

pub mod check;
pub mod env;
pub mod generate;
