//! tagrelay Web Application - Composition Root
//!
//! Wires the browser capabilities into a [`Tracker`] and exposes it to
//! JavaScript as `WebTracker`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagrelay_core::{Tracker, TrackerConfig, TrackerStats, TransportState};
use wasm_bindgen::prelude::*;

use crate::browser::{browser_environment, params_from_js};
use crate::utils::js_error;

// ----------------------------------------------------------------------------
// JavaScript Interop Types
// ----------------------------------------------------------------------------

/// JavaScript-compatible tracker status
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsTrackerStatus {
    pub state: String,
    pub measurement_id: Option<String>,
    pub pending: usize,
    pub stats: JsTrackerStats,
}

/// Delivery counters with JavaScript field names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsTrackerStats {
    pub primary_sent: u64,
    pub fallback_sent: u64,
    pub fallback_failed: u64,
    pub console_only: u64,
    pub buffered: u64,
    pub flushed_to_primary: u64,
    pub flushed_to_fallback: u64,
    pub dropped_invalid: u64,
}

impl From<TrackerStats> for JsTrackerStats {
    fn from(stats: TrackerStats) -> Self {
        Self {
            primary_sent: stats.primary_sent,
            fallback_sent: stats.fallback_sent,
            fallback_failed: stats.fallback_failed,
            console_only: stats.console_only,
            buffered: stats.buffered,
            flushed_to_primary: stats.flushed_to_primary,
            flushed_to_fallback: stats.flushed_to_fallback,
            dropped_invalid: stats.dropped_invalid,
        }
    }
}

impl JsTrackerStatus {
    pub fn from_tracker(tracker: &Tracker) -> Self {
        Self {
            state: tracker.state().state_name().to_string(),
            measurement_id: tracker.measurement_id().map(|id| id.as_str().to_string()),
            pending: tracker.pending_len(),
            stats: tracker.stats().into(),
        }
    }
}

/// Build the tracker configuration from constructor arguments
pub fn web_config(measurement_id: Option<String>, load_timeout_ms: Option<u32>) -> TrackerConfig {
    let mut config = TrackerConfig {
        measurement_id,
        ..TrackerConfig::default()
    };
    if let Some(millis) = load_timeout_ms {
        config = config.load_timeout(Duration::from_millis(millis as u64));
    }
    config
}

// ----------------------------------------------------------------------------
// Web Tracker
// ----------------------------------------------------------------------------

/// Analytics tracker bound to the current page
#[wasm_bindgen]
pub struct WebTracker {
    tracker: Tracker,
}

#[wasm_bindgen]
impl WebTracker {
    /// Create a tracker; a missing or blank measurement id selects console-only mode
    #[wasm_bindgen(constructor)]
    pub fn new(
        measurement_id: Option<String>,
        load_timeout_ms: Option<u32>,
    ) -> Result<WebTracker, JsValue> {
        let config = web_config(measurement_id, load_timeout_ms);
        let tracker = Tracker::new(config, browser_environment()).map_err(js_error)?;
        Ok(WebTracker { tracker })
    }

    /// Install the gtag stub and start loading the tag script. Idempotent.
    #[wasm_bindgen]
    pub fn init(&self) {
        self.tracker.initialize();
    }

    /// Record one event; `params` is a plain object of scalar values
    #[wasm_bindgen(js_name = trackEvent)]
    pub fn track_event(&self, name: &str, params: JsValue) {
        self.tracker.track_event(name, params_from_js(&params));
    }

    /// Current transport state name
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        self.tracker.state().state_name().to_string()
    }

    #[wasm_bindgen(js_name = isReady)]
    pub fn is_ready(&self) -> bool {
        self.tracker.state() == TransportState::Ready
    }

    /// Events waiting for the load outcome
    #[wasm_bindgen(js_name = pendingCount)]
    pub fn pending_count(&self) -> usize {
        self.tracker.pending_len()
    }

    #[wasm_bindgen(js_name = clientId)]
    pub fn client_id(&self) -> String {
        self.tracker.client_id()
    }

    /// Delivery counters as a plain object
    #[wasm_bindgen]
    pub fn stats(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&JsTrackerStats::from(self.tracker.stats()))
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize stats: {}", e)))
    }

    /// Tracker status as a plain object
    #[wasm_bindgen]
    pub fn status(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&JsTrackerStatus::from_tracker(&self.tracker))
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize status: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_config_defaults() {
        let config = web_config(None, None);
        assert!(config.measurement_id().is_none());
        assert_eq!(config.load_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_web_config_overrides() {
        let config = web_config(Some("G-WEB123".to_string()), Some(1500));
        assert_eq!(config.measurement_id().unwrap().as_str(), "G-WEB123");
        assert_eq!(config.load_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = JsTrackerStatus {
            state: "pending".to_string(),
            measurement_id: Some("G-WEB123".to_string()),
            pending: 2,
            stats: JsTrackerStats::default(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["measurementId"], "G-WEB123");
        assert_eq!(json["pending"], 2);
        assert_eq!(json["stats"]["primarySent"], 0);
        assert!(json["stats"].get("primary_sent").is_none());
    }

    #[test]
    fn test_stats_view_uses_camel_case_names() {
        let stats = TrackerStats {
            primary_sent: 3,
            flushed_to_fallback: 2,
            dropped_invalid: 1,
            ..TrackerStats::default()
        };
        let json = serde_json::to_value(JsTrackerStats::from(stats)).unwrap();
        assert_eq!(json["primarySent"], 3);
        assert_eq!(json["flushedToFallback"], 2);
        assert_eq!(json["droppedInvalid"], 1);
        assert_eq!(json["fallbackSent"], 0);
        assert_eq!(json.as_object().unwrap().len(), 8);
    }
}
