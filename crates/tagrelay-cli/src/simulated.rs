//! Simulated environment capabilities for running the tracker off-browser
//!
//! Script loads and the load timer run as local tasks on the current-thread
//! runtime, so every capability call and every signal happens on one thread.
//! Nothing here performs network I/O; outgoing requests are logged instead.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use tagrelay_core::{
    BeaconOutcome, Environment, FallbackNetwork, KeyValueStore, LoadSignal, LoadTimer,
    PrimaryTransport, Result as TagRelayResult, SystemTimeSource, TagCommand, TagLoader,
    TagRelayError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cli::LoadOutcome;

// ----------------------------------------------------------------------------
// Script Loader
// ----------------------------------------------------------------------------

/// Reports a fixed outcome after a fixed delay
pub struct SimulatedTagLoader {
    outcome: LoadOutcome,
    delay: Duration,
}

impl SimulatedTagLoader {
    pub fn new(outcome: LoadOutcome, delay: Duration) -> Self {
        Self { outcome, delay }
    }
}

impl TagLoader for SimulatedTagLoader {
    fn load(&self, script_url: &str, signal: LoadSignal) {
        info!("Loading tag script {}", script_url);
        let outcome = self.outcome;
        let delay = self.delay;

        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            match outcome {
                LoadOutcome::Ready => signal.loaded(),
                LoadOutcome::Error => signal.failed("simulated script error"),
                LoadOutcome::Hang => debug!("Simulated script load never settles"),
            }
        });
    }
}

// ----------------------------------------------------------------------------
// Load Timer
// ----------------------------------------------------------------------------

/// Deadline backed by a local sleep task; cancel aborts the task
#[derive(Default)]
pub struct TokioLoadTimer {
    task: RefCell<Option<JoinHandle<()>>>,
}

impl LoadTimer for TokioLoadTimer {
    fn arm(&self, after: Duration, signal: LoadSignal) {
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(after).await;
            signal.timed_out();
        });
        if let Some(previous) = self.task.borrow_mut().replace(task) {
            previous.abort();
        }
    }

    fn cancel(&self) {
        if let Some(task) = self.task.borrow_mut().take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Primary Transport
// ----------------------------------------------------------------------------

/// Logs gtag commands in place of a real tag
#[derive(Default)]
pub struct LoggingPrimary {
    commands: Cell<usize>,
}

impl LoggingPrimary {
    pub fn command_count(&self) -> usize {
        self.commands.get()
    }
}

impl PrimaryTransport for LoggingPrimary {
    fn install_stub(&self) {
        debug!("gtag stub installed");
    }

    fn command(&self, command: TagCommand) {
        self.commands.set(self.commands.get() + 1);
        match command {
            TagCommand::Js { timestamp } => info!("gtag('js', {})", timestamp),
            TagCommand::Config { measurement_id } => {
                info!("gtag('config', '{}')", measurement_id.as_str())
            }
            TagCommand::Event(event) => {
                let params: Vec<String> = event
                    .params
                    .present()
                    .filter_map(|(key, value)| value.render().map(|v| format!("{}={}", key, v)))
                    .collect();
                info!("gtag('event', '{}', {{{}}})", event.name.as_str(), params.join(", "));
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Fallback Network
// ----------------------------------------------------------------------------

/// Dry-run network that logs each collect URL
pub struct LoggingNetwork {
    beacon_supported: bool,
    sent: RefCell<Vec<String>>,
}

impl LoggingNetwork {
    pub fn new(beacon_supported: bool) -> Self {
        Self {
            beacon_supported,
            sent: RefCell::new(Vec::new()),
        }
    }

    /// URLs handed to either channel, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }
}

impl FallbackNetwork for LoggingNetwork {
    fn send_beacon(&self, url: &str) -> BeaconOutcome {
        if !self.beacon_supported {
            return BeaconOutcome::Unsupported;
        }
        info!("beacon {}", url);
        self.sent.borrow_mut().push(url.to_string());
        BeaconOutcome::Queued
    }

    fn send_request(&self, url: &str) -> TagRelayResult<()> {
        info!("GET {}", url);
        self.sent.borrow_mut().push(url.to_string());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File Store
// ----------------------------------------------------------------------------

/// Key-value store persisted as a JSON object in one file
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> TagRelayResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| TagRelayError::storage_error(format!("Failed to read store: {}", e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| TagRelayError::storage_error(format!("Failed to parse store: {}", e)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> TagRelayResult<Option<String>> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TagRelayResult<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TagRelayError::storage_error(format!("Failed to create store directory: {}", e))
            })?;
        }
        let contents = serde_json::to_string_pretty(&entries).map_err(|e| {
            TagRelayError::storage_error(format!("Failed to serialize store: {}", e))
        })?;
        std::fs::write(&self.path, contents)
            .map_err(|e| TagRelayError::storage_error(format!("Failed to write store: {}", e)))
    }
}

// ----------------------------------------------------------------------------
// Environment
// ----------------------------------------------------------------------------

/// Simulated environment plus handles to its observable parts
pub struct Simulation {
    pub primary: Rc<LoggingPrimary>,
    pub network: Rc<LoggingNetwork>,
    pub env: Environment,
}

impl Simulation {
    pub fn new(
        outcome: LoadOutcome,
        load_delay: Duration,
        beacon_supported: bool,
        storage: Rc<dyn KeyValueStore>,
    ) -> Self {
        let primary = Rc::new(LoggingPrimary::default());
        let network = Rc::new(LoggingNetwork::new(beacon_supported));
        let env = Environment {
            loader: Rc::new(SimulatedTagLoader::new(outcome, load_delay)),
            timer: Rc::new(TokioLoadTimer::default()),
            primary: primary.clone(),
            network: network.clone(),
            storage,
            clock: Rc::new(SystemTimeSource::new()),
        };
        Self {
            primary,
            network,
            env,
        }
    }
}
