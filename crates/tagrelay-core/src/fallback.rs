//! Fallback channel: direct collection requests
//!
//! Used once the primary transport is known to be unavailable. Each event is
//! encoded into a single GET URL and handed to the environment's
//! fire-and-forget primitives. Sends are at-most-once: there is no
//! acknowledgement and nothing is retried.

use url::Url;

use crate::capabilities::{BeaconOutcome, FallbackNetwork};
use crate::{MeasurementId, ParamValue, PendingEvent, Result, TrackerConfig};

/// Query key prefix for string and boolean parameters
pub const TEXT_PARAM_PREFIX: &str = "ep.";

/// Query key prefix for numeric parameters
pub const NUMERIC_PARAM_PREFIX: &str = "epn.";

/// Which primitive carried a fallback send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackRoute {
    Beacon,
    Request,
}

// ----------------------------------------------------------------------------
// Fallback Sender
// ----------------------------------------------------------------------------

/// Encodes events for the collection endpoint and dispatches them
#[derive(Debug, Clone)]
pub struct FallbackSender {
    endpoint: String,
    protocol_version: String,
    measurement_id: MeasurementId,
}

impl FallbackSender {
    pub fn new(config: &TrackerConfig, measurement_id: MeasurementId) -> Self {
        Self {
            endpoint: config.collect_endpoint.clone(),
            protocol_version: config.protocol_version.clone(),
            measurement_id,
        }
    }

    /// Build the collection URL for one event
    ///
    /// Required fields come first (`v`, `tid`, `cid`, `en`), then one pair per
    /// present parameter in insertion order.
    pub fn encode(&self, client_id: &str, event: &PendingEvent) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("v", &self.protocol_version)
                .append_pair("tid", self.measurement_id.as_str())
                .append_pair("cid", client_id)
                .append_pair("en", event.name.as_str());

            for (key, value) in event.params.present() {
                if let Some(rendered) = value.render() {
                    query.append_pair(&param_key(key, value), &rendered);
                }
            }
        }
        Ok(url)
    }

    /// Encode and dispatch one event
    pub fn send(
        &self,
        network: &dyn FallbackNetwork,
        client_id: &str,
        event: &PendingEvent,
    ) -> Result<FallbackRoute> {
        let url = self.encode(client_id, event)?;
        dispatch(network, url.as_str())
    }
}

fn param_key(key: &str, value: &ParamValue) -> String {
    if value.is_numeric() {
        format!("{}{}", NUMERIC_PARAM_PREFIX, key)
    } else {
        format!("{}{}", TEXT_PARAM_PREFIX, key)
    }
}

/// Prefer the beacon primitive, fall through to a plain request
pub fn dispatch(network: &dyn FallbackNetwork, url: &str) -> Result<FallbackRoute> {
    match network.send_beacon(url) {
        BeaconOutcome::Queued => Ok(FallbackRoute::Beacon),
        outcome => {
            if outcome == BeaconOutcome::Rejected {
                tracing::debug!("Beacon rejected, falling back to request");
            }
            network.send_request(url)?;
            Ok(FallbackRoute::Request)
        }
    }
}
