//! Fallback client identity
//!
//! The fallback channel needs a per-client id. It is read from durable storage
//! when present, otherwise generated and written back. When storage is
//! unusable the id is ephemeral: callers must not cache it, so every fallback
//! send regenerates one.

use crate::capabilities::KeyValueStore;
use crate::Timestamp;

/// Where a resolved client id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdSource {
    /// Read back from durable storage
    Stored,
    /// Freshly generated and persisted
    Generated,
    /// Generated but storage was unavailable
    Ephemeral,
}

/// A client id together with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClientId {
    pub value: String,
    pub source: ClientIdSource,
}

impl ResolvedClientId {
    /// Whether the id is stable enough to keep for the tracker's lifetime
    pub fn is_durable(&self) -> bool {
        self.source != ClientIdSource::Ephemeral
    }
}

/// Generate a `<random u32>.<unix seconds>` client id
pub fn generate_client_id(now: Timestamp) -> String {
    let mut bytes = [0u8; 4];
    let random = match getrandom::getrandom(&mut bytes) {
        Ok(()) => u32::from_le_bytes(bytes),
        Err(e) => {
            tracing::debug!("OS randomness unavailable ({}), deriving client id from clock", e);
            (now.as_millis() as u32).rotate_left(13) ^ 0x9E37_79B9
        }
    };
    format!("{}.{}", random, now.as_secs())
}

/// Load the persisted client id, creating and persisting one if needed
pub fn resolve_client_id(store: &dyn KeyValueStore, key: &str, now: Timestamp) -> ResolvedClientId {
    match store.get(key) {
        Ok(Some(existing)) if !existing.trim().is_empty() => {
            return ResolvedClientId {
                value: existing,
                source: ClientIdSource::Stored,
            };
        }
        Ok(_) => {}
        Err(e) => {
            tracing::debug!("Client id storage read failed: {}", e);
            return ResolvedClientId {
                value: generate_client_id(now),
                source: ClientIdSource::Ephemeral,
            };
        }
    }

    let value = generate_client_id(now);
    match store.set(key, &value) {
        Ok(()) => ResolvedClientId {
            value,
            source: ClientIdSource::Generated,
        },
        Err(e) => {
            tracing::debug!("Client id storage write failed: {}", e);
            ResolvedClientId {
                value,
                source: ClientIdSource::Ephemeral,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryStore;

    #[test]
    fn test_generated_id_format() {
        let id = generate_client_id(Timestamp::new(1_700_000_000_123));
        let (random, secs) = id.split_once('.').unwrap();
        assert!(random.parse::<u32>().is_ok());
        assert_eq!(secs, "1700000000");
    }

    #[test]
    fn test_resolve_persists_then_reuses() {
        let store = MemoryStore::new();
        let first = resolve_client_id(&store, "cid", Timestamp::new(1_000));
        assert_eq!(first.source, ClientIdSource::Generated);

        let second = resolve_client_id(&store, "cid", Timestamp::new(9_000));
        assert_eq!(second.source, ClientIdSource::Stored);
        assert_eq!(first.value, second.value);
    }

    #[test]
    fn test_blank_stored_value_is_replaced() {
        let store = MemoryStore::new();
        store.set("cid", "").unwrap();
        let resolved = resolve_client_id(&store, "cid", Timestamp::new(1_000));
        assert_eq!(resolved.source, ClientIdSource::Generated);
        assert_eq!(store.get("cid").unwrap(), Some(resolved.value));
    }

    #[test]
    fn test_unavailable_store_is_ephemeral() {
        let store = MemoryStore::unavailable();
        let resolved = resolve_client_id(&store, "cid", Timestamp::new(1_000));
        assert_eq!(resolved.source, ClientIdSource::Ephemeral);
        assert!(!resolved.is_durable());
    }
}
