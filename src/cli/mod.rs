//! Command line interface module
//!
//! Argument parsing ([`Args`]) and the [`Runner`] that executes one invocation.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
