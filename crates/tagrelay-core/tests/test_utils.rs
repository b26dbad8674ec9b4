//! Test utilities for deterministic testing of the tracker
//!
//! A virtual clock drives every asynchronous capability: the scheduled loader
//! and the virtual timer both enqueue callbacks on it, and tests move time
//! forward explicitly. Recording capabilities capture everything the tracker
//! hands to the primary transport and the network.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tagrelay_core::{
    BeaconOutcome, Environment, FallbackNetwork, KeyValueStore, LoadSignal, LoadTimer,
    MemoryStore, PrimaryTransport, Result as TagRelayResult, TagCommand, TagLoader,
    TagRelayError, TimeSource, Timestamp, Tracker, TrackerConfig,
};

// ----------------------------------------------------------------------------
// Virtual Clock
// ----------------------------------------------------------------------------

struct Scheduled {
    at: u64,
    id: u64,
    task: Box<dyn FnOnce()>,
}

/// Single-threaded virtual time with a callback queue
pub struct VirtualClock {
    now: Cell<u64>,
    next_id: Cell<u64>,
    queue: RefCell<Vec<Scheduled>>,
}

impl VirtualClock {
    pub fn new() -> Rc<Self> {
        Self::new_at(0)
    }

    pub fn new_at(start_millis: u64) -> Rc<Self> {
        Rc::new(Self {
            now: Cell::new(start_millis),
            next_id: Cell::new(0),
            queue: RefCell::new(Vec::new()),
        })
    }

    pub fn now_millis(&self) -> u64 {
        self.now.get()
    }

    /// Run `task` once `delay_millis` of virtual time has passed
    pub fn schedule(&self, delay_millis: u64, task: impl FnOnce() + 'static) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.queue.borrow_mut().push(Scheduled {
            at: self.now.get() + delay_millis,
            id,
            task: Box::new(task),
        });
        id
    }

    /// Remove a scheduled task; false if it already ran or never existed
    pub fn cancel(&self, id: u64) -> bool {
        let mut queue = self.queue.borrow_mut();
        let before = queue.len();
        queue.retain(|scheduled| scheduled.id != id);
        queue.len() != before
    }

    pub fn scheduled_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Advance time, running due tasks in (time, scheduling) order
    pub fn advance_to(&self, target_millis: u64) {
        loop {
            let next = {
                let mut queue = self.queue.borrow_mut();
                let due = queue
                    .iter()
                    .enumerate()
                    .filter(|(_, scheduled)| scheduled.at <= target_millis)
                    .min_by_key(|(_, scheduled)| (scheduled.at, scheduled.id))
                    .map(|(index, _)| index);
                due.map(|index| queue.remove(index))
            };
            match next {
                Some(scheduled) => {
                    self.now.set(scheduled.at.max(self.now.get()));
                    (scheduled.task)();
                }
                None => break,
            }
        }
        self.now.set(target_millis.max(self.now.get()));
    }

    pub fn advance(&self, millis: u64) {
        self.advance_to(self.now.get() + millis);
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now.get())
    }
}

// ----------------------------------------------------------------------------
// Scheduled Loader
// ----------------------------------------------------------------------------

/// How the simulated tag script behaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadBehavior {
    /// Signal success synchronously from inside `load`
    SucceedImmediately,
    /// Signal failure synchronously from inside `load`
    FailImmediately(&'static str),
    SucceedAfter(u64),
    FailAfter(u64, &'static str),
    /// Never signal anything
    Hang,
}

pub struct ScheduledLoader {
    clock: Rc<VirtualClock>,
    behavior: LoadBehavior,
    pub loads: RefCell<Vec<String>>,
}

impl ScheduledLoader {
    pub fn new(clock: Rc<VirtualClock>, behavior: LoadBehavior) -> Rc<Self> {
        Rc::new(Self {
            clock,
            behavior,
            loads: RefCell::new(Vec::new()),
        })
    }

    pub fn load_count(&self) -> usize {
        self.loads.borrow().len()
    }
}

impl TagLoader for ScheduledLoader {
    fn load(&self, script_url: &str, signal: LoadSignal) {
        self.loads.borrow_mut().push(script_url.to_string());
        match self.behavior {
            LoadBehavior::SucceedImmediately => signal.loaded(),
            LoadBehavior::FailImmediately(reason) => signal.failed(reason),
            LoadBehavior::SucceedAfter(delay) => {
                self.clock.schedule(delay, move || signal.loaded());
            }
            LoadBehavior::FailAfter(delay, reason) => {
                self.clock.schedule(delay, move || signal.failed(reason));
            }
            LoadBehavior::Hang => {}
        }
    }
}

// ----------------------------------------------------------------------------
// Virtual Timer
// ----------------------------------------------------------------------------

pub struct VirtualTimer {
    clock: Rc<VirtualClock>,
    armed: Cell<Option<u64>>,
    pub arms: Cell<usize>,
    pub cancels: Cell<usize>,
}

impl VirtualTimer {
    pub fn new(clock: Rc<VirtualClock>) -> Rc<Self> {
        Rc::new(Self {
            clock,
            armed: Cell::new(None),
            arms: Cell::new(0),
            cancels: Cell::new(0),
        })
    }
}

impl LoadTimer for VirtualTimer {
    fn arm(&self, after: Duration, signal: LoadSignal) {
        self.arms.set(self.arms.get() + 1);
        let id = self
            .clock
            .schedule(after.as_millis() as u64, move || signal.timed_out());
        self.armed.set(Some(id));
    }

    fn cancel(&self) {
        if let Some(id) = self.armed.take() {
            if self.clock.cancel(id) {
                self.cancels.set(self.cancels.get() + 1);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Recording Primary Transport
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPrimary {
    pub stubs: Cell<usize>,
    pub commands: RefCell<Vec<TagCommand>>,
}

impl RecordingPrimary {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Names of the events delivered, in order
    pub fn event_names(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|command| match command {
                TagCommand::Event(event) => Some(event.name.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands
            .borrow()
            .iter()
            .map(|command| command.command_name())
            .collect()
    }
}

impl PrimaryTransport for RecordingPrimary {
    fn install_stub(&self) {
        self.stubs.set(self.stubs.get() + 1);
    }

    fn command(&self, command: TagCommand) {
        self.commands.borrow_mut().push(command);
    }
}

/// Records like [`RecordingPrimary`] and tracks one extra event through the
/// attached tracker from inside its first command
pub struct ReentrantPrimary {
    pub recorded: Rc<RecordingPrimary>,
    event_name: &'static str,
    tracker: RefCell<Option<Tracker>>,
}

impl ReentrantPrimary {
    pub fn new(event_name: &'static str) -> Rc<Self> {
        Rc::new(Self {
            recorded: RecordingPrimary::new(),
            event_name,
            tracker: RefCell::new(None),
        })
    }

    /// The handle is released after the nested call, breaking the cycle
    pub fn attach(&self, tracker: Tracker) {
        *self.tracker.borrow_mut() = Some(tracker);
    }
}

impl PrimaryTransport for ReentrantPrimary {
    fn install_stub(&self) {
        self.recorded.install_stub();
    }

    fn command(&self, command: TagCommand) {
        self.recorded.command(command);
        let tracker = self.tracker.borrow_mut().take();
        if let Some(tracker) = tracker {
            tracker.track_event(self.event_name, Default::default());
        }
    }
}

// ----------------------------------------------------------------------------
// Recording Network
// ----------------------------------------------------------------------------

pub struct RecordingNetwork {
    pub beacon: Cell<BeaconOutcome>,
    pub fail_requests: Cell<bool>,
    /// Every call into the network, successful or not
    pub attempts: Cell<usize>,
    /// URLs the network accepted, in order
    pub delivered: RefCell<Vec<String>>,
    pub requests: Cell<usize>,
}

impl RecordingNetwork {
    pub fn new() -> Rc<Self> {
        Self::with_beacon(BeaconOutcome::Queued)
    }

    pub fn with_beacon(beacon: BeaconOutcome) -> Rc<Self> {
        Rc::new(Self {
            beacon: Cell::new(beacon),
            fail_requests: Cell::new(false),
            attempts: Cell::new(0),
            delivered: RefCell::new(Vec::new()),
            requests: Cell::new(0),
        })
    }

    /// Query value of `key` for each delivered URL
    pub fn query_values(&self, key: &str) -> Vec<String> {
        self.delivered
            .borrow()
            .iter()
            .filter_map(|raw| {
                let url = url::Url::parse(raw).ok()?;
                let value = url
                    .query_pairs()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.into_owned());
                value
            })
            .collect()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.query_values("en")
    }
}

impl FallbackNetwork for RecordingNetwork {
    fn send_beacon(&self, url: &str) -> BeaconOutcome {
        self.attempts.set(self.attempts.get() + 1);
        let outcome = self.beacon.get();
        if outcome == BeaconOutcome::Queued {
            self.delivered.borrow_mut().push(url.to_string());
        }
        outcome
    }

    fn send_request(&self, url: &str) -> TagRelayResult<()> {
        self.attempts.set(self.attempts.get() + 1);
        self.requests.set(self.requests.get() + 1);
        if self.fail_requests.get() {
            return Err(TagRelayError::send_failed("network unreachable"));
        }
        self.delivered.borrow_mut().push(url.to_string());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

/// A tracker wired to virtual capabilities, with handles to all of them
pub struct TestHarness {
    pub clock: Rc<VirtualClock>,
    pub loader: Rc<ScheduledLoader>,
    pub timer: Rc<VirtualTimer>,
    pub primary: Rc<RecordingPrimary>,
    pub network: Rc<RecordingNetwork>,
    pub storage: Rc<MemoryStore>,
    pub tracker: Tracker,
}

impl TestHarness {
    /// Configured tracker with a 5 ms deadline
    pub fn configured(behavior: LoadBehavior) -> Self {
        Self::build(TrackerConfig::testing(), behavior, Rc::new(MemoryStore::new()))
    }

    pub fn unconfigured() -> Self {
        Self::build(
            TrackerConfig::default(),
            LoadBehavior::Hang,
            Rc::new(MemoryStore::new()),
        )
    }

    pub fn build(config: TrackerConfig, behavior: LoadBehavior, storage: Rc<MemoryStore>) -> Self {
        let clock = VirtualClock::new();
        let loader = ScheduledLoader::new(clock.clone(), behavior);
        let timer = VirtualTimer::new(clock.clone());
        let primary = RecordingPrimary::new();
        let network = RecordingNetwork::new();

        let env = Environment {
            loader: loader.clone(),
            timer: timer.clone(),
            primary: primary.clone(),
            network: network.clone(),
            storage: storage.clone() as Rc<dyn KeyValueStore>,
            clock: clock.clone(),
        };
        let tracker = Tracker::new(config, env).expect("valid test configuration");

        Self {
            clock,
            loader,
            timer,
            primary,
            network,
            storage,
            tracker,
        }
    }

    pub fn track(&self, name: &str) {
        self.tracker.track_event(name, Default::default());
    }
}

/// Names `event_0 .. event_{n-1}`
pub fn event_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("event_{}", i)).collect()
}
