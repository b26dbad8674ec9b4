//! tagrelay CLI library
//!
//! Runs the delivery state machine outside the browser against simulated
//! capabilities, and exposes the fallback encoder and client id store.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod funnel;
pub mod simulated;

pub use cli::{Cli, Commands, LoadOutcome};
pub use commands::{run_simulation, CommandDispatcher, SimulationOptions, SimulationReport};
pub use config::AppConfig;
pub use error::{CliError, Result};
