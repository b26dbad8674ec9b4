//! Command handlers for the tagrelay CLI

use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tagrelay_core::{
    resolve_client_id, EventName, EventParams, FallbackSender, KeyValueStore, ParamValue,
    PendingEvent, Timestamp, Tracker, TrackerConfig, TrackerStats, TransportState,
};
use tracing::{debug, info};

use crate::cli::{Commands, LoadOutcome};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::funnel::{demo_funnel, Plan};
use crate::simulated::{FileStore, Simulation};

/// Slack past the load deadline before the simulation gives up waiting
const SETTLE_MARGIN: Duration = Duration::from_millis(250);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Parameters of one simulation run
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub outcome: LoadOutcome,
    pub load_delay: Duration,
    pub events_before_load: bool,
    pub beacon_supported: bool,
    pub plan: Plan,
}

/// What a simulation run delivered, printed as JSON
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub state: TransportState,
    pub client_id: Option<String>,
    pub primary_commands: usize,
    pub fallback_urls: Vec<String>,
    pub stats: TrackerStats,
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command; must run inside a `LocalSet`
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Simulate {
                outcome,
                load_delay_ms,
                events_before_load,
                no_beacon,
                plan,
            } => {
                let options = SimulationOptions {
                    outcome,
                    load_delay: Duration::from_millis(load_delay_ms),
                    events_before_load,
                    beacon_supported: !no_beacon,
                    plan,
                };
                let storage = Rc::new(FileStore::new(config.client_store_path()?));
                let report = run_simulation(&config.tracker, &options, storage).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Commands::Encode { name, params } => {
                let store = FileStore::new(config.client_store_path()?);
                let url = encode_event(&config.tracker, &store, &name, &params)?;
                println!("{}", url);
                Ok(())
            }
            Commands::ClientId => {
                let store = FileStore::new(config.client_store_path()?);
                let resolved = resolve_client_id(
                    &store,
                    &config.tracker.client_id_storage_key,
                    Timestamp::now(),
                );
                info!("Client id source: {:?}", resolved.source);
                println!("{}", resolved.value);
                Ok(())
            }
        }
    }
}

/// Drive a tracker through the demo funnel against simulated capabilities
pub async fn run_simulation(
    config: &TrackerConfig,
    options: &SimulationOptions,
    storage: Rc<dyn KeyValueStore>,
) -> Result<SimulationReport> {
    let simulation = Simulation::new(
        options.outcome,
        options.load_delay,
        options.beacon_supported,
        storage,
    );
    let tracker = Tracker::new(config.clone(), simulation.env)?;
    tracker.initialize();

    let steps = demo_funnel(options.plan, Timestamp::now());
    if options.events_before_load {
        for step in &steps {
            tracker.track_event(step.name, step.params.clone());
        }
        debug!("{} events buffered while loading", tracker.pending_len());
        wait_for_outcome(&tracker, config.load_timeout).await?;
    } else {
        wait_for_outcome(&tracker, config.load_timeout).await?;
        for step in &steps {
            tracker.track_event(step.name, step.params.clone());
        }
    }

    let state = tracker.state();
    info!("Simulation finished in {} state", state);
    let client_id = (state == TransportState::Failed).then(|| tracker.client_id());

    Ok(SimulationReport {
        state,
        client_id,
        primary_commands: simulation.primary.command_count(),
        fallback_urls: simulation.network.sent(),
        stats: tracker.stats(),
    })
}

async fn wait_for_outcome(tracker: &Tracker, load_timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + load_timeout + SETTLE_MARGIN;
    while !tracker.state().is_terminal() {
        if tokio::time::Instant::now() >= deadline {
            return Err(CliError::Simulation(
                "tracker still pending after the load timeout".to_string(),
            ));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}

/// Fallback collect URL for one event given as `name key=value ...`
pub fn encode_event(
    config: &TrackerConfig,
    store: &dyn KeyValueStore,
    name: &str,
    raw_params: &[String],
) -> Result<String> {
    let measurement_id = config
        .measurement_id()
        .ok_or_else(|| CliError::Config("encode requires a measurement id".to_string()))?;

    let params = parse_params(raw_params)?;
    let event = PendingEvent::new(EventName::new(name)?, params);
    let client_id = resolve_client_id(store, &config.client_id_storage_key, Timestamp::now());

    let sender = FallbackSender::new(config, measurement_id);
    Ok(sender.encode(&client_id.value, &event)?.to_string())
}

/// Parse `key=value` pairs; numbers and booleans keep their type
pub fn parse_params(raw_params: &[String]) -> Result<EventParams> {
    let mut params = EventParams::new();
    for raw in raw_params {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("expected key=value, got '{}'", raw))
        })?;
        if key.is_empty() {
            return Err(CliError::InvalidArgument(format!("empty key in '{}'", raw)));
        }
        params.insert(key, parse_value(value));
    }
    Ok(params)
}

fn parse_value(value: &str) -> ParamValue {
    if let Ok(number) = value.parse::<f64>() {
        if number.is_finite() {
            return ParamValue::Number(number);
        }
    }
    match value {
        "true" => ParamValue::Bool(true),
        "false" => ParamValue::Bool(false),
        _ => ParamValue::Text(value.to_string()),
    }
}
