//! Error types for the tagrelay delivery layer
//!
//! None of these ever cross the [`crate::Tracker`] boundary. They exist so that
//! the fallible helpers underneath it (name validation, URL encoding, storage,
//! fallback sends) can use `?` and so that the diagnostic line logged for each
//! failure carries a precise reason.

// ----------------------------------------------------------------------------
// Error Type
// ----------------------------------------------------------------------------

/// Failures inside the delivery layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagRelayError {
    #[error("Invalid event name: {reason}")]
    InvalidEventName { reason: String },

    #[error("Primary transport failed to load: {reason}")]
    TransportLoadFailed { reason: String },

    #[error("Primary transport did not load within {duration_ms}ms")]
    TransportLoadTimedOut { duration_ms: u64 },

    #[error("Fallback send failed: {reason}")]
    FallbackSendFailed { reason: String },

    #[error("Storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

// ----------------------------------------------------------------------------
// Convenience Constructors
// ----------------------------------------------------------------------------

impl TagRelayError {
    /// Create an invalid event name error
    pub fn invalid_event_name<T: Into<String>>(reason: T) -> Self {
        TagRelayError::InvalidEventName {
            reason: reason.into(),
        }
    }

    /// Create a load failure error
    pub fn load_failed<T: Into<String>>(reason: T) -> Self {
        TagRelayError::TransportLoadFailed {
            reason: reason.into(),
        }
    }

    /// Create a fallback send failure
    pub fn send_failed<T: Into<String>>(reason: T) -> Self {
        TagRelayError::FallbackSendFailed {
            reason: reason.into(),
        }
    }

    /// Create a storage error with a message
    pub fn storage_error<T: Into<String>>(reason: T) -> Self {
        TagRelayError::StorageUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        TagRelayError::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the delivery layer
pub type Result<T> = std::result::Result<T, TagRelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_reason() {
        let err = TagRelayError::load_failed("script error");
        assert_eq!(
            err.to_string(),
            "Primary transport failed to load: script error"
        );

        let err = TagRelayError::TransportLoadTimedOut { duration_ms: 5000 };
        assert_eq!(
            err.to_string(),
            "Primary transport did not load within 5000ms"
        );
    }

    #[test]
    fn test_url_error_conversion() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: TagRelayError = parse_err.into();
        assert!(matches!(err, TagRelayError::InvalidUrl(_)));
    }
}
