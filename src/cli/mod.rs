//! Command line surface

pub mod commands;
pub mod display;
pub mod loop_cmd;

pub use commands::CliArgs;
