//! Readiness State Machine
//!
//! Tracks whether the primary transport can be used. The machine is tiny but
//! strict: `Pending` is the only state with outgoing transitions, and each of
//! them can fire at most once. Any later load signal is rejected with a
//! [`StateTransitionError`], which callers treat as a no-op.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Transport State
// ----------------------------------------------------------------------------

/// Readiness of the primary transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// No endpoint identity; console-only delivery for the whole lifetime
    Unconfigured,
    /// Bootstrap outcome not yet known
    Pending,
    /// Primary transport loaded
    Ready,
    /// Primary transport failed or timed out; fallback channel in use
    Failed,
}

impl TransportState {
    /// Initial state for a tracker with or without an endpoint identity
    pub fn initial(configured: bool) -> Self {
        if configured {
            TransportState::Pending
        } else {
            TransportState::Unconfigured
        }
    }

    /// No further load signal can change this state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransportState::Pending)
    }

    /// Get current state name for logging
    pub fn state_name(&self) -> &'static str {
        match self {
            TransportState::Unconfigured => "unconfigured",
            TransportState::Pending => "pending",
            TransportState::Ready => "ready",
            TransportState::Failed => "failed",
        }
    }

    /// Apply a load signal (consumes self)
    pub fn transition(self, event: LoadEvent) -> Result<TransportState, StateTransitionError> {
        match (self, &event) {
            (TransportState::Pending, LoadEvent::Loaded) => Ok(TransportState::Ready),
            (TransportState::Pending, LoadEvent::LoadFailed { .. })
            | (TransportState::Pending, LoadEvent::TimedOut { .. }) => Ok(TransportState::Failed),
            (from, _) => Err(StateTransitionError {
                from,
                event: event.event_name(),
            }),
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

// ----------------------------------------------------------------------------
// Load Events
// ----------------------------------------------------------------------------

/// Definitive signals about the primary transport load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// The environment reported the script loaded
    Loaded,
    /// The environment reported a load error
    LoadFailed { reason: String },
    /// The load deadline expired first
    TimedOut { after: Duration },
}

impl LoadEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            LoadEvent::Loaded => "loaded",
            LoadEvent::LoadFailed { .. } => "load_failed",
            LoadEvent::TimedOut { .. } => "timed_out",
        }
    }
}

/// A load signal arrived in a state that does not accept it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Ignoring {event} signal in {from} state")]
pub struct StateTransitionError {
    pub from: TransportState,
    pub event: &'static str,
}
