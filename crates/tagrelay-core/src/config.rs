//! Tracker configuration
//!
//! One externally supplied value matters at runtime: the measurement id. Its
//! absence is a valid configuration that puts the tracker in console-only
//! mode. Everything else has production defaults and only changes in tests or
//! when pointing at a different collection backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{MeasurementId, Result, TagRelayError};

/// Default deadline for the primary transport to report a load outcome
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Tag script location; the measurement id is appended as `?id=`
pub const DEFAULT_SCRIPT_BASE_URL: &str = "https://www.googletagmanager.com/gtag/js";

/// Collection endpoint used by the fallback channel
pub const DEFAULT_COLLECT_ENDPOINT: &str = "https://www.google-analytics.com/g/collect";

/// Measurement protocol version sent as `v=`
pub const DEFAULT_PROTOCOL_VERSION: &str = "2";

/// Durable storage key holding the fallback client id
pub const DEFAULT_CLIENT_ID_STORAGE_KEY: &str = "tagrelay_client_id";

// ----------------------------------------------------------------------------
// Tracker Configuration
// ----------------------------------------------------------------------------

/// Configuration for a [`crate::Tracker`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Destination property; `None` or blank disables all network delivery
    pub measurement_id: Option<String>,
    /// How long bootstrap waits for a load outcome before failing over
    #[serde(with = "duration_millis")]
    pub load_timeout: Duration,
    /// Base URL of the primary tag script
    pub script_base_url: String,
    /// Fallback collection endpoint
    pub collect_endpoint: String,
    /// Protocol version field of fallback requests
    pub protocol_version: String,
    /// Storage key of the persisted fallback client id
    pub client_id_storage_key: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            measurement_id: None,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            script_base_url: DEFAULT_SCRIPT_BASE_URL.to_string(),
            collect_endpoint: DEFAULT_COLLECT_ENDPOINT.to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            client_id_storage_key: DEFAULT_CLIENT_ID_STORAGE_KEY.to_string(),
        }
    }
}

impl TrackerConfig {
    /// Production defaults delivering to the given property
    pub fn with_measurement_id<S: Into<String>>(measurement_id: S) -> Self {
        Self {
            measurement_id: Some(measurement_id.into()),
            ..Self::default()
        }
    }

    /// Configuration for tests: fixed id and a short deadline
    pub fn testing() -> Self {
        Self {
            measurement_id: Some("G-TEST0001".to_string()),
            load_timeout: Duration::from_millis(5),
            ..Self::default()
        }
    }

    /// Override the load deadline
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// The configured identity, if any; blank values count as absent
    pub fn measurement_id(&self) -> Option<MeasurementId> {
        self.measurement_id.as_deref().and_then(MeasurementId::new)
    }

    /// Full script URL for the given identity
    pub fn script_url(&self, measurement_id: &MeasurementId) -> Result<url::Url> {
        let url = url::Url::parse_with_params(
            &self.script_base_url,
            &[("id", measurement_id.as_str())],
        )?;
        Ok(url)
    }

    /// Check URLs and timeouts before handing the config to a tracker
    pub fn validate(&self) -> Result<()> {
        if self.load_timeout.is_zero() {
            return Err(TagRelayError::config_error("load_timeout must be non-zero"));
        }
        if self.protocol_version.trim().is_empty() {
            return Err(TagRelayError::config_error("protocol_version is empty"));
        }
        if self.client_id_storage_key.trim().is_empty() {
            return Err(TagRelayError::config_error("client_id_storage_key is empty"));
        }
        url::Url::parse(&self.script_base_url)?;
        url::Url::parse(&self.collect_endpoint)?;
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
