//! Timestamp codec for Hyperstack API payloads.
//!
//! The API emits timestamps as `YYYY-MM-DDTHH:MM:SS` (no timezone, no
//! fractional seconds) and uses the literal string `"null"` for unset
//! values.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const LAYOUT: &str = "%Y-%m-%dT%H:%M:%S";

/// A Hyperstack API timestamp; the default value is "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApiTimestamp(pub Option<NaiveDateTime>);

impl ApiTimestamp {
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for ApiTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ts) => write!(f, "{}", ts.format(LAYOUT)),
            None => write!(f, "null"),
        }
    }
}

impl From<NaiveDateTime> for ApiTimestamp {
    fn from(ts: NaiveDateTime) -> Self {
        Self(Some(ts))
    }
}

impl Serialize for ApiTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ApiTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Accept both a JSON null and the API's literal "null" string.
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("null") => Ok(Self::default()),
            Some(value) => NaiveDateTime::parse_from_str(value, LAYOUT)
                .map(|ts| Self(Some(ts)))
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn sample() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 16)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap()
    }

    #[test]
    fn round_trips_to_second_precision() {
        let original = ApiTimestamp::from(sample());
        let encoded = serde_json::to_string(&original).unwrap();
        assert_eq!(encoded, "\"2024-07-16T09:30:15\"");

        let decoded: ApiTimestamp = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.0.unwrap().second(), 15);
    }

    #[test]
    fn null_string_decodes_to_unset() {
        let decoded: ApiTimestamp = serde_json::from_str("\"null\"").unwrap();
        assert_eq!(decoded, ApiTimestamp::default());
        assert!(!decoded.is_set());
    }

    #[test]
    fn json_null_decodes_to_unset() {
        let decoded: ApiTimestamp = serde_json::from_str("null").unwrap();
        assert_eq!(decoded, ApiTimestamp::default());
    }

    #[test]
    fn unset_encodes_as_null_string() {
        let encoded = serde_json::to_string(&ApiTimestamp::default()).unwrap();
        assert_eq!(encoded, "\"null\"");
    }

    #[test]
    fn rejects_other_layouts() {
        assert!(serde_json::from_str::<ApiTimestamp>("\"2024-07-16 09:30:15\"").is_err());
        assert!(serde_json::from_str::<ApiTimestamp>("\"2024-07-16T09:30:15Z\"").is_err());
    }
}
