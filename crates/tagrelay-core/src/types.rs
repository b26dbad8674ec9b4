//! Core value types: time, identities and event payloads

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Result, TagRelayError};

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get current wall-clock timestamp
    pub fn now() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(all(feature = "wasm", target_arch = "wasm32"))] {
                Self(js_sys::Date::now() as u64)
            } else {
                use std::time::{SystemTime, UNIX_EPOCH};
                let duration = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                Self(duration.as_millis() as u64)
            }
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of the current time, injectable for deterministic tests
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation of [`TimeSource`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Measurement Id
// ----------------------------------------------------------------------------

/// Opaque token identifying the destination analytics property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(String);

impl MeasurementId {
    /// Returns `None` for blank values; a blank id is an unconfigured tracker.
    pub fn new<S: AsRef<str>>(raw: S) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Event Name
// ----------------------------------------------------------------------------

/// Non-empty event name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventName(String);

impl EventName {
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TagRelayError::invalid_event_name("event name is empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EventName {
    type Error = TagRelayError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Parameter Values
// ----------------------------------------------------------------------------

/// A single event parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Present in the caller's map but without a value; never encoded
    Absent,
}

impl ParamValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, ParamValue::Absent)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamValue::Number(_))
    }

    /// Wire rendering; `None` for [`ParamValue::Absent`]
    pub fn render(&self) -> Option<String> {
        match self {
            ParamValue::Text(text) => Some(text.clone()),
            // f64 Display is shortest-form: 3.0 renders as "3"
            ParamValue::Number(number) => Some(number.to_string()),
            ParamValue::Bool(flag) => Some(flag.to_string()),
            ParamValue::Absent => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

macro_rules! impl_from_integer {
    ($($int:ty),*) => {
        $(
            impl From<$int> for ParamValue {
                fn from(value: $int) -> Self {
                    ParamValue::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Absent)
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ParamValue::Text(text) => serializer.serialize_str(text),
            ParamValue::Number(number) => serializer.serialize_f64(*number),
            ParamValue::Bool(flag) => serializer.serialize_bool(*flag),
            ParamValue::Absent => serializer.serialize_none(),
        }
    }
}

struct ParamValueVisitor;

impl<'de> Visitor<'de> for ParamValueVisitor {
    type Value = ParamValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Text(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Absent)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<ParamValue, E> {
        Ok(ParamValue::Absent)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<ParamValue, D::Error> {
        deserializer.deserialize_any(ParamValueVisitor)
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ParamValueVisitor)
    }
}

// ----------------------------------------------------------------------------
// Event Parameters
// ----------------------------------------------------------------------------

/// Insertion-ordered parameter map
///
/// Event payloads are small, so entries live inline and lookups are linear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventParams {
    entries: SmallVec<[(String, ParamValue); 4]>,
}

impl EventParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter; a replaced key keeps its original position
    pub fn insert<K: Into<String>, V: Into<ParamValue>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// All entries in insertion order, absent values included
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Entries that carry a value
    pub fn present(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.iter().filter(|(_, value)| !value.is_absent())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for EventParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = EventParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl Serialize for EventParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct EventParamsVisitor;

impl<'de> Visitor<'de> for EventParamsVisitor {
    type Value = EventParams;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of event parameters")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> std::result::Result<EventParams, A::Error> {
        let mut params = EventParams::new();
        while let Some((key, value)) = map.next_entry::<String, ParamValue>()? {
            params.insert(key, value);
        }
        Ok(params)
    }

    // A missing params argument (null / undefined) means no parameters
    fn visit_unit<E: de::Error>(self) -> std::result::Result<EventParams, E> {
        Ok(EventParams::new())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<EventParams, E> {
        Ok(EventParams::new())
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<EventParams, D::Error> {
        deserializer.deserialize_map(EventParamsVisitor)
    }
}

impl<'de> Deserialize<'de> for EventParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(EventParamsVisitor)
    }
}

// ----------------------------------------------------------------------------
// Pending Event
// ----------------------------------------------------------------------------

/// A named event with its parameters, as submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub name: EventName,
    #[serde(default)]
    pub params: EventParams,
}

impl PendingEvent {
    pub fn new(name: EventName, params: EventParams) -> Self {
        Self { name, params }
    }
}
