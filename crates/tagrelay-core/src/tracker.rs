//! Tracker - Composition of bootstrapper and dispatcher
//!
//! [`Tracker`] is the handle callers hold. It feeds every input into the
//! [`DeliveryMachine`] and executes the resulting effects against the injected
//! [`Environment`]. Asynchronous load outcomes come back through
//! [`LoadSignal`], which holds only a weak reference so a dropped tracker
//! ignores late signals.
//!
//! The machine is never borrowed while a capability runs. A capability may
//! therefore call back into the tracker synchronously (a loader that fires
//! `loaded()` from inside `load()`, a primary transport that tracks an event)
//! without tripping a `RefCell` borrow. Effects produced by such nested calls
//! are appended to one FIFO queue and run after the effects already queued,
//! so a reentrant event never overtakes a drain in progress.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::capabilities::{
    FallbackNetwork, KeyValueStore, LoadTimer, PrimaryTransport, TagCommand, TagLoader,
};
use crate::client_id::resolve_client_id;
use crate::fallback::FallbackSender;
use crate::machine::{DeliveryMachine, Effect, TrackerStats};
use crate::state::{LoadEvent, TransportState};
use crate::{
    EventName, EventParams, MeasurementId, PendingEvent, Result, TagRelayError, TimeSource,
    TrackerConfig,
};

// ----------------------------------------------------------------------------
// Environment
// ----------------------------------------------------------------------------

/// Capabilities the tracker runs against
#[derive(Clone)]
pub struct Environment {
    pub loader: Rc<dyn TagLoader>,
    pub timer: Rc<dyn LoadTimer>,
    pub primary: Rc<dyn PrimaryTransport>,
    pub network: Rc<dyn FallbackNetwork>,
    pub storage: Rc<dyn KeyValueStore>,
    pub clock: Rc<dyn TimeSource>,
}

// ----------------------------------------------------------------------------
// Tracker
// ----------------------------------------------------------------------------

struct Shared {
    machine: RefCell<DeliveryMachine>,
    env: Environment,
    fallback: Option<FallbackSender>,
    client_id_key: String,
    client_id: RefCell<Option<String>>,
    load_timeout: Duration,
    effects: RefCell<VecDeque<Effect>>,
    executing: Cell<bool>,
}

/// Event delivery handle; clones share the same state
#[derive(Clone)]
pub struct Tracker {
    shared: Rc<Shared>,
}

impl Tracker {
    /// Create a tracker. Fails only on an invalid configuration.
    pub fn new(config: TrackerConfig, env: Environment) -> Result<Self> {
        let machine = DeliveryMachine::new(&config)?;
        let fallback = config
            .measurement_id()
            .map(|id| FallbackSender::new(&config, id));

        Ok(Self {
            shared: Rc::new(Shared {
                machine: RefCell::new(machine),
                env,
                fallback,
                client_id_key: config.client_id_storage_key.clone(),
                client_id: RefCell::new(None),
                load_timeout: config.load_timeout,
                effects: RefCell::new(VecDeque::new()),
                executing: Cell::new(false),
            }),
        })
    }

    /// Start bootstrapping the primary transport. Safe to call repeatedly;
    /// only the first call has any effect.
    pub fn initialize(&self) {
        let now = self.shared.env.clock.now();
        let effects = self.shared.machine.borrow_mut().initialize(now);
        self.execute(effects);
    }

    /// Submit an event. Never fails: problems are logged and absorbed.
    pub fn track_event(&self, name: &str, params: EventParams) {
        match EventName::new(name) {
            Ok(name) => self.track(PendingEvent::new(name, params)),
            Err(e) => {
                self.shared.machine.borrow_mut().stats_mut().dropped_invalid += 1;
                tracing::warn!("Dropping event: {}", e);
            }
        }
    }

    /// Submit an already validated event
    pub fn track(&self, event: PendingEvent) {
        let effects = self.shared.machine.borrow_mut().dispatch(event);
        self.execute(effects);
    }

    pub fn state(&self) -> TransportState {
        self.shared.machine.borrow().state()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.machine.borrow().pending_len()
    }

    pub fn stats(&self) -> TrackerStats {
        self.shared.machine.borrow().stats()
    }

    pub fn measurement_id(&self) -> Option<MeasurementId> {
        self.shared.machine.borrow().measurement_id().cloned()
    }

    /// Client id used by the fallback channel
    ///
    /// Cached once it is known to be durable; with unusable storage a new id
    /// is produced on every call.
    pub fn client_id(&self) -> String {
        if let Some(cached) = self.shared.client_id.borrow().as_ref() {
            return cached.clone();
        }

        let resolved = resolve_client_id(
            self.shared.env.storage.as_ref(),
            &self.shared.client_id_key,
            self.shared.env.clock.now(),
        );
        if resolved.is_durable() {
            *self.shared.client_id.borrow_mut() = Some(resolved.value.clone());
        }
        resolved.value
    }

    /// Signal handle for load outcome reporters
    pub fn load_signal(&self) -> LoadSignal {
        LoadSignal {
            shared: Rc::downgrade(&self.shared),
        }
    }

    fn resolve(&self, event: LoadEvent) {
        let error = match &event {
            LoadEvent::Loaded => None,
            LoadEvent::LoadFailed { reason } => Some(TagRelayError::load_failed(reason.as_str())),
            LoadEvent::TimedOut { after } => Some(TagRelayError::TransportLoadTimedOut {
                duration_ms: after.as_millis() as u64,
            }),
        };

        let result = self.shared.machine.borrow_mut().resolve(event);
        match result {
            Ok(effects) => {
                match error {
                    Some(e) => tracing::warn!("{}; switching to fallback delivery", e),
                    None => tracing::info!("Primary transport ready"),
                }
                self.execute(effects);
            }
            Err(e) => tracing::debug!("{}", e),
        }
    }

    /// Queue effects and run the queue unless an outer call is already
    /// running it
    fn execute(&self, effects: Vec<Effect>) {
        self.shared.effects.borrow_mut().extend(effects);
        if self.shared.executing.replace(true) {
            return;
        }

        while let Some(effect) = self.next_effect() {
            self.run_effect(effect);
        }
        self.shared.executing.set(false);
    }

    // Separate call so the queue is not borrowed while the effect runs
    fn next_effect(&self) -> Option<Effect> {
        self.shared.effects.borrow_mut().pop_front()
    }

    fn run_effect(&self, effect: Effect) {
        let env = &self.shared.env;
        match effect {
            Effect::InstallStub => env.primary.install_stub(),
            Effect::ReportUnconfigured => {
                tracing::warn!("Measurement id not set; events will only be logged locally")
            }
            Effect::ArmTimer { after } => env.timer.arm(after, self.load_signal()),
            Effect::CancelTimer => env.timer.cancel(),
            Effect::LoadScript { url } => {
                tracing::debug!("Loading primary transport from {}", url);
                env.loader.load(&url, self.load_signal());
            }
            Effect::Primary(command) => {
                if let TagCommand::Event(event) = &command {
                    tracing::trace!("Primary event {}", event.name);
                }
                env.primary.command(command);
            }
            Effect::Fallback(event) => self.send_fallback(&event),
            Effect::ConsoleOnly(event) => {
                tracing::info!(
                    target: "tagrelay::stub",
                    event = %event.name,
                    params = ?event.params,
                    "Tracked event (no measurement id)"
                );
            }
        }
    }

    fn send_fallback(&self, event: &PendingEvent) {
        let Some(sender) = &self.shared.fallback else {
            return;
        };

        let client_id = self.client_id();
        let result = sender.send(self.shared.env.network.as_ref(), &client_id, event);

        let mut machine = self.shared.machine.borrow_mut();
        match result {
            Ok(route) => {
                machine.stats_mut().fallback_sent += 1;
                tracing::debug!("Fallback sent {} via {:?}", event.name, route);
            }
            Err(e) => {
                machine.stats_mut().fallback_failed += 1;
                tracing::warn!("Fallback send of {} failed: {}", event.name, e);
            }
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let machine = self.shared.machine.borrow();
        f.debug_struct("Tracker")
            .field("state", &machine.state())
            .field("pending", &machine.pending_len())
            .field("stats", &machine.stats())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Load Signal
// ----------------------------------------------------------------------------

/// Reports the primary transport load outcome back to its tracker
///
/// Only the first outcome across all clones takes effect.
#[derive(Clone)]
pub struct LoadSignal {
    shared: Weak<Shared>,
}

impl LoadSignal {
    /// The script loaded
    pub fn loaded(&self) {
        self.resolve(LoadEvent::Loaded);
    }

    /// The environment reported a load error
    pub fn failed<R: Into<String>>(&self, reason: R) {
        self.resolve(LoadEvent::LoadFailed {
            reason: reason.into(),
        });
    }

    /// The load deadline expired
    pub fn timed_out(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let after = shared.load_timeout;
        Tracker { shared }.resolve(LoadEvent::TimedOut { after });
    }

    /// Whether the tracker is still alive
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    fn resolve(&self, event: LoadEvent) {
        if let Some(shared) = self.shared.upgrade() {
            Tracker { shared }.resolve(event);
        }
    }
}

impl fmt::Debug for LoadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSignal")
            .field("attached", &self.is_attached())
            .finish()
    }
}
