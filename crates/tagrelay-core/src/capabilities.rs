//! Environment capabilities consumed by the tracker
//!
//! The tracker never touches a browser, a socket or a disk directly. Each
//! primitive it needs is one of the traits below, implemented by the web
//! bindings against real browser APIs, by the CLI against a simulated
//! environment, and by the test utilities against recording mocks.
//!
//! All traits take `&self`: the tracker runs on a single cooperative thread
//! and implementations keep whatever interior state they need in `Cell` or
//! `RefCell`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::tracker::LoadSignal;
use crate::{MeasurementId, PendingEvent, Result, TagRelayError, Timestamp};

// ----------------------------------------------------------------------------
// Primary Transport
// ----------------------------------------------------------------------------

/// Loads the remote tag script and reports the outcome
pub trait TagLoader {
    /// Begin loading `script_url`. Exactly one of [`LoadSignal::loaded`] or
    /// [`LoadSignal::failed`] should eventually be called, or neither if the
    /// environment never answers.
    fn load(&self, script_url: &str, signal: LoadSignal);
}

/// Single outstanding load deadline
pub trait LoadTimer {
    /// Arm the deadline; on expiry call [`LoadSignal::timed_out`]
    fn arm(&self, after: Duration, signal: LoadSignal);

    /// Cancel the armed deadline; a no-op when nothing is armed
    fn cancel(&self);
}

/// Positional command understood by the primary tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagCommand {
    /// `('js', timestamp)`
    Js { timestamp: Timestamp },
    /// `('config', measurement_id)`
    Config { measurement_id: MeasurementId },
    /// `('event', name, params)`
    Event(PendingEvent),
}

impl TagCommand {
    /// First positional argument of the command
    pub fn command_name(&self) -> &'static str {
        match self {
            TagCommand::Js { .. } => "js",
            TagCommand::Config { .. } => "config",
            TagCommand::Event(_) => "event",
        }
    }
}

/// Synchronous command interface of the primary tag
pub trait PrimaryTransport {
    /// Create the environment's callable stub so that other code may issue
    /// commands before the real tag attaches
    fn install_stub(&self);

    /// Deliver one command
    fn command(&self, command: TagCommand);
}

// ----------------------------------------------------------------------------
// Fallback Network
// ----------------------------------------------------------------------------

/// Result of handing a URL to the beacon primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconOutcome {
    /// The environment queued the request
    Queued,
    /// The primitive exists but refused the request
    Rejected,
    /// No beacon primitive in this environment
    Unsupported,
}

/// Best-effort, fire-and-forget network primitives
pub trait FallbackNetwork {
    /// Unload-surviving beacon send
    fn send_beacon(&self, url: &str) -> BeaconOutcome;

    /// Ordinary asynchronous GET. `Ok` means the request was dispatched;
    /// failures reported later are the implementation's to log.
    fn send_request(&self, url: &str) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Durable Storage
// ----------------------------------------------------------------------------

/// Small durable key-value string store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store for tests and environments without durable storage
#[derive(Debug)]
pub struct MemoryStore {
    data: RefCell<BTreeMap<String, String>>,
    available: bool,
}

impl MemoryStore {
    /// Create a new, available memory store
    pub fn new() -> Self {
        Self {
            data: RefCell::new(BTreeMap::new()),
            available: true,
        }
    }

    /// A store whose every operation fails, like a browser with storage
    /// disabled
    pub fn unavailable() -> Self {
        Self {
            data: RefCell::new(BTreeMap::new()),
            available: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.available {
            return Err(TagRelayError::storage_error("Storage not available"));
        }
        Ok(self.data.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if !self.available {
            return Err(TagRelayError::storage_error("Storage not available"));
        }
        self.data
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
