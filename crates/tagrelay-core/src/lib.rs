//! tagrelay Core
//!
//! Client-side analytics event delivery with graceful degradation. A
//! [`Tracker`] bootstraps a remotely loaded tag once, buffers events while the
//! outcome is unknown, and then routes each event to the primary tag, to a
//! best-effort collection request, or to the local log when no measurement id
//! is configured.
//!
//! Everything environment-specific (script loading, timers, storage, network)
//! is injected through the traits in [`capabilities`], so the same state
//! machine runs in the browser, in the CLI simulator and under test.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod buffer;
pub mod capabilities;
pub mod client_id;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod machine;
pub mod state;
pub mod tracker;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use buffer::PendingBuffer;
pub use capabilities::{
    BeaconOutcome, FallbackNetwork, KeyValueStore, LoadTimer, MemoryStore, PrimaryTransport,
    TagCommand, TagLoader,
};
pub use client_id::{generate_client_id, resolve_client_id, ClientIdSource, ResolvedClientId};
pub use config::TrackerConfig;
pub use errors::{Result, TagRelayError};
pub use fallback::{FallbackRoute, FallbackSender};
pub use machine::{DeliveryMachine, Effect, TrackerStats};
pub use state::{LoadEvent, StateTransitionError, TransportState};
pub use tracker::{Environment, LoadSignal, Tracker};
pub use types::{
    EventName, EventParams, MeasurementId, ParamValue, PendingEvent, SystemTimeSource,
    TimeSource, Timestamp,
};
