//! Property-based tests for delivery guarantees
//!
//! For any interleaving of events and any load outcome, every event is
//! delivered exactly once, through exactly one channel, in call order.

use proptest::prelude::*;
use tagrelay_core::{EventParams, FallbackSender, PendingEvent, TrackerConfig, TransportState};

mod test_utils;
use test_utils::{LoadBehavior, TestHarness};

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Loaded,
    Failed,
    Hang,
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Loaded), Just(Outcome::Failed), Just(Outcome::Hang)]
}

/// Event names with the virtual time at which each is tracked
fn arb_schedule() -> impl Strategy<Value = Vec<(String, u64)>> {
    prop::collection::vec(("[a-z][a-z_]{0,15}", 0u64..12), 0..24).prop_map(|mut events| {
        events.sort_by_key(|(_, at)| *at);
        events
    })
}

proptest! {
    /// Property: each event reaches exactly one channel, in order
    #[test]
    fn every_event_delivered_once_in_order(
        schedule in arb_schedule(),
        outcome in arb_outcome(),
        load_at in 1u64..10,
    ) {
        let behavior = match outcome {
            Outcome::Loaded => LoadBehavior::SucceedAfter(load_at),
            Outcome::Failed => LoadBehavior::FailAfter(load_at, "generated failure"),
            Outcome::Hang => LoadBehavior::Hang,
        };
        let h = TestHarness::configured(behavior);
        h.tracker.initialize();

        for (name, at) in &schedule {
            h.clock.advance_to(*at);
            h.track(name);
        }
        h.clock.advance_to(20);

        let expected: Vec<String> = schedule.iter().map(|(name, _)| name.clone()).collect();
        let via_primary = h.primary.event_names();
        let via_fallback = h.network.event_names();

        match h.tracker.state() {
            TransportState::Ready => {
                prop_assert_eq!(&via_primary, &expected);
                prop_assert!(via_fallback.is_empty());
            }
            TransportState::Failed => {
                prop_assert_eq!(&via_fallback, &expected);
                prop_assert!(via_primary.is_empty());
            }
            other => prop_assert!(false, "unexpected state {:?}", other),
        }
        prop_assert_eq!(h.tracker.pending_len(), 0);
    }

    /// Property: an unconfigured tracker never makes a network call
    #[test]
    fn unconfigured_is_network_silent(names in prop::collection::vec("[a-z_]{0,12}", 0..16)) {
        let h = TestHarness::unconfigured();
        h.tracker.initialize();
        for name in &names {
            h.track(name);
        }
        prop_assert_eq!(h.network.attempts.get(), 0);
        prop_assert!(h.primary.commands.borrow().is_empty());
    }

    /// Property: numeric params are always `epn.`, others `ep.`
    #[test]
    fn param_prefix_follows_type(
        key in "[a-z]{1,10}",
        number in -1.0e6f64..1.0e6,
        text in "[a-zA-Z]{1,10}",
    ) {
        let config = TrackerConfig::with_measurement_id("G-PROP");
        let sender = FallbackSender::new(&config, config.measurement_id().unwrap());

        let numeric = PendingEvent::new(
            "e".to_string().try_into().unwrap(),
            EventParams::new().with(key.clone(), number),
        );
        let url = sender.encode("1.1", &numeric).unwrap();
        let numeric_key = format!("epn.{}", key);
        prop_assert!(url.query_pairs().any(|(k, _)| k == numeric_key.as_str()));

        let textual = PendingEvent::new(
            "e".to_string().try_into().unwrap(),
            EventParams::new().with(key.clone(), text),
        );
        let url = sender.encode("1.1", &textual).unwrap();
        let text_key = format!("ep.{}", key);
        prop_assert!(url.query_pairs().any(|(k, _)| k == text_key.as_str()));
    }
}
