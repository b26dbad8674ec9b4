//! Delivery Machine
//!
//! Pure decision logic of the tracker. It owns the readiness state, the
//! one-shot bootstrap flag and the pending buffer, and answers every input
//! with a list of [`Effect`]s for the caller to execute. It never calls into
//! the environment itself, so every ordering and exactly-once guarantee can be
//! checked here without any capability in place.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::PendingBuffer;
use crate::capabilities::TagCommand;
use crate::state::{LoadEvent, StateTransitionError, TransportState};
use crate::{MeasurementId, PendingEvent, Result, Timestamp, TrackerConfig};

// ----------------------------------------------------------------------------
// Effects
// ----------------------------------------------------------------------------

/// Side effects requested by the machine, executed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create the primary transport's synchronous stub
    InstallStub,
    /// Emit the missing-configuration diagnostic
    ReportUnconfigured,
    /// Arm the load deadline
    ArmTimer { after: Duration },
    /// Cancel the load deadline
    CancelTimer,
    /// Ask the environment to load the tag script
    LoadScript { url: String },
    /// Deliver a command through the primary transport
    Primary(TagCommand),
    /// Send one event through the fallback channel
    Fallback(PendingEvent),
    /// Log the event locally, no network
    ConsoleOnly(PendingEvent),
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Delivery counters for one tracker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Events handed to the primary transport, flushed ones included
    pub primary_sent: u64,
    /// Fallback sends dispatched, flushed ones included
    pub fallback_sent: u64,
    /// Fallback sends that could not be dispatched
    pub fallback_failed: u64,
    /// Events only logged because no identity is configured
    pub console_only: u64,
    /// Events appended to the pending buffer
    pub buffered: u64,
    /// Buffered events drained into the primary transport on `Ready`
    pub flushed_to_primary: u64,
    /// Buffered events drained into the fallback channel on `Failed`
    pub flushed_to_fallback: u64,
    /// Events dropped for an invalid name
    pub dropped_invalid: u64,
}

// ----------------------------------------------------------------------------
// Delivery Machine
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct DeliveryMachine {
    measurement_id: Option<MeasurementId>,
    script_url: Option<String>,
    load_timeout: Duration,
    state: TransportState,
    bootstrapped: bool,
    timer_armed: bool,
    started_at: Option<Timestamp>,
    buffer: PendingBuffer,
    stats: TrackerStats,
}

impl DeliveryMachine {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        let measurement_id = config.measurement_id();
        let script_url = match &measurement_id {
            Some(id) => Some(config.script_url(id)?.to_string()),
            None => None,
        };

        Ok(Self {
            state: TransportState::initial(measurement_id.is_some()),
            measurement_id,
            script_url,
            load_timeout: config.load_timeout,
            bootstrapped: false,
            timer_armed: false,
            started_at: None,
            buffer: PendingBuffer::new(),
            stats: TrackerStats::default(),
        })
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn measurement_id(&self) -> Option<&MeasurementId> {
        self.measurement_id.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn stats_mut(&mut self) -> &mut TrackerStats {
        &mut self.stats
    }

    /// Start bootstrap; only the first call produces effects
    pub fn initialize(&mut self, now: Timestamp) -> Vec<Effect> {
        if self.bootstrapped {
            return Vec::new();
        }
        self.bootstrapped = true;

        let mut effects = vec![Effect::InstallStub];
        match &self.script_url {
            None => effects.push(Effect::ReportUnconfigured),
            Some(url) => {
                self.started_at = Some(now);
                self.timer_armed = true;
                // Arm before loading so a synchronous outcome can cancel it
                effects.push(Effect::ArmTimer {
                    after: self.load_timeout,
                });
                effects.push(Effect::LoadScript { url: url.clone() });
            }
        }
        effects
    }

    /// Route one caller event according to the current state
    pub fn dispatch(&mut self, event: PendingEvent) -> Vec<Effect> {
        match self.state {
            TransportState::Unconfigured => {
                self.stats.console_only += 1;
                vec![Effect::ConsoleOnly(event)]
            }
            TransportState::Pending => {
                self.stats.buffered += 1;
                self.buffer.push(event);
                Vec::new()
            }
            TransportState::Ready => {
                self.stats.primary_sent += 1;
                vec![Effect::Primary(TagCommand::Event(event))]
            }
            TransportState::Failed => vec![Effect::Fallback(event)],
        }
    }

    /// Apply a load outcome. The first definitive signal wins; every later
    /// one comes back as an error and changes nothing.
    pub fn resolve(
        &mut self,
        event: LoadEvent,
    ) -> std::result::Result<Vec<Effect>, StateTransitionError> {
        if !self.bootstrapped {
            return Err(StateTransitionError {
                from: self.state,
                event: event.event_name(),
            });
        }

        let timed_out = matches!(event, LoadEvent::TimedOut { .. });
        self.state = self.state.transition(event)?;

        let mut effects = Vec::new();
        if self.timer_armed {
            self.timer_armed = false;
            if !timed_out {
                effects.push(Effect::CancelTimer);
            }
        }

        let drained = self.buffer.drain_all();
        match self.state {
            TransportState::Ready => {
                if let Some(id) = &self.measurement_id {
                    effects.push(Effect::Primary(TagCommand::Js {
                        timestamp: self.started_at.unwrap_or_else(|| Timestamp::new(0)),
                    }));
                    effects.push(Effect::Primary(TagCommand::Config {
                        measurement_id: id.clone(),
                    }));
                }
                let count = drained.len() as u64;
                self.stats.flushed_to_primary += count;
                self.stats.primary_sent += count;
                effects.extend(
                    drained
                        .into_iter()
                        .map(|event| Effect::Primary(TagCommand::Event(event))),
                );
            }
            _ => {
                self.stats.flushed_to_fallback += drained.len() as u64;
                effects.extend(drained.into_iter().map(Effect::Fallback));
            }
        }
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventName, EventParams};

    fn event(name: &str) -> PendingEvent {
        PendingEvent::new(EventName::new(name).unwrap(), EventParams::new())
    }

    fn configured() -> DeliveryMachine {
        DeliveryMachine::new(&TrackerConfig::with_measurement_id("G-UNIT")).unwrap()
    }

    #[test]
    fn test_unconfigured_initialize_reports_once() {
        let mut machine = DeliveryMachine::new(&TrackerConfig::default()).unwrap();
        assert_eq!(machine.state(), TransportState::Unconfigured);
        assert_eq!(
            machine.initialize(Timestamp::new(0)),
            vec![Effect::InstallStub, Effect::ReportUnconfigured]
        );
        assert!(machine.initialize(Timestamp::new(1)).is_empty());
    }

    #[test]
    fn test_configured_initialize_arms_then_loads() {
        let mut machine = configured();
        let effects = machine.initialize(Timestamp::new(0));
        assert_eq!(
            effects,
            vec![
                Effect::InstallStub,
                Effect::ArmTimer {
                    after: Duration::from_secs(5)
                },
                Effect::LoadScript {
                    url: "https://www.googletagmanager.com/gtag/js?id=G-UNIT".to_string()
                },
            ]
        );
        assert!(machine.initialize(Timestamp::new(0)).is_empty());
    }

    #[test]
    fn test_ready_flushes_to_primary_after_bootstrap_commands() {
        let mut machine = configured();
        machine.initialize(Timestamp::new(42));
        assert!(machine.dispatch(event("a")).is_empty());
        assert!(machine.dispatch(event("b")).is_empty());

        let effects = machine.resolve(LoadEvent::Loaded).unwrap();
        assert_eq!(effects[0], Effect::CancelTimer);
        assert_eq!(
            effects[1],
            Effect::Primary(TagCommand::Js {
                timestamp: Timestamp::new(42)
            })
        );
        assert!(matches!(effects[2], Effect::Primary(TagCommand::Config { .. })));
        assert_eq!(effects[3], Effect::Primary(TagCommand::Event(event("a"))));
        assert_eq!(effects[4], Effect::Primary(TagCommand::Event(event("b"))));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Fallback(_))));
        assert_eq!(machine.pending_len(), 0);
        assert_eq!(machine.stats().flushed_to_primary, 2);
    }

    #[test]
    fn test_timeout_flushes_to_fallback_without_cancel() {
        let mut machine = configured();
        machine.initialize(Timestamp::new(0));
        machine.dispatch(event("a"));

        let effects = machine
            .resolve(LoadEvent::TimedOut {
                after: Duration::from_secs(5),
            })
            .unwrap();
        assert_eq!(effects, vec![Effect::Fallback(event("a"))]);
        assert_eq!(machine.state(), TransportState::Failed);
    }

    #[test]
    fn test_second_outcome_is_rejected() {
        let mut machine = configured();
        machine.initialize(Timestamp::new(0));
        machine.dispatch(event("a"));
        machine
            .resolve(LoadEvent::LoadFailed {
                reason: "404".to_string(),
            })
            .unwrap();

        assert!(machine
            .resolve(LoadEvent::TimedOut {
                after: Duration::from_secs(5)
            })
            .is_err());
        assert!(machine.resolve(LoadEvent::Loaded).is_err());
        assert_eq!(machine.state(), TransportState::Failed);
        assert_eq!(machine.stats().flushed_to_fallback, 1);
    }

    #[test]
    fn test_outcome_before_initialize_is_rejected() {
        let mut machine = configured();
        assert!(machine.resolve(LoadEvent::Loaded).is_err());
        assert_eq!(machine.state(), TransportState::Pending);
    }

    #[test]
    fn test_dispatch_routes_by_state() {
        let mut machine = configured();
        machine.initialize(Timestamp::new(0));
        machine.resolve(LoadEvent::Loaded).unwrap();
        assert_eq!(
            machine.dispatch(event("x")),
            vec![Effect::Primary(TagCommand::Event(event("x")))]
        );

        let mut machine = configured();
        machine.initialize(Timestamp::new(0));
        machine
            .resolve(LoadEvent::LoadFailed {
                reason: "blocked".to_string(),
            })
            .unwrap();
        assert_eq!(machine.dispatch(event("y")), vec![Effect::Fallback(event("y"))]);
    }
}
