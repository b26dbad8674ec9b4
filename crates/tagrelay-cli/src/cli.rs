//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};

use crate::funnel::Plan;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Measurement id; overrides the config file and TAGRELAY_MEASUREMENT_ID
    #[arg(short, long)]
    pub measurement_id: Option<String>,

    /// Data directory for the persisted client id
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay the demo funnel against a simulated tag load
    Simulate {
        /// How the simulated tag script load ends
        #[arg(short, long, value_enum, default_value_t = LoadOutcome::Ready)]
        outcome: LoadOutcome,
        /// Delay before the load outcome is reported
        #[arg(short, long, default_value_t = 250)]
        load_delay_ms: u64,
        /// Track the funnel while the load is still pending
        #[arg(short, long)]
        events_before_load: bool,
        /// Simulate a browser without sendBeacon
        #[arg(long)]
        no_beacon: bool,
        /// Plan the simulated visitor buys
        #[arg(short, long, value_enum, default_value_t = Plan::Pro)]
        plan: Plan,
    },
    /// Print the fallback collect URL for one event
    Encode {
        /// Event name
        name: String,
        /// Parameters as key=value; numeric values are sent as numbers
        params: Vec<String>,
    },
    /// Print the persisted fallback client id, creating it if needed
    ClientId,
}

/// Simulated tag script load result
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// onload fires
    Ready,
    /// onerror fires
    Error,
    /// Neither fires; the load timeout decides
    Hang,
}
