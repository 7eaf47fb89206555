//! Command-line interface for the `digest` binary.

mod commands;
mod icons;

pub use commands::{is_verbose, run};
