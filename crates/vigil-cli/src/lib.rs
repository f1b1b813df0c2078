//! Vigil CLI library
//!
//! Command-line runner for the portal acceptance scenarios.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod mock_portal;
mod output;
pub mod runner;
pub mod scenarios;

pub use commands::{Cli, ColorArg, Commands, ListArgs, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::Reporter;
