use std::fmt;
use std::str::FromStr;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use crate::core::error::{Error, Result};

/// Cumulative document reads and writes of one database.
///
/// Stored as the string `"reads:writes"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestCount {
    pub reads: u64,
    pub writes: u64,
}

impl RequestCount {
    pub fn new(reads: u64, writes: u64) -> Self {
        RequestCount { reads, writes }
    }

    pub fn add(self, reads: u64, writes: u64) -> Self {
        RequestCount {
            reads: self.reads.saturating_add(reads),
            writes: self.writes.saturating_add(writes),
        }
    }
}

impl fmt::Display for RequestCount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.reads, self.writes)
    }
}

impl FromStr for RequestCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (reads, writes) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid_argument(format!("malformed request count '{}'", s)))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|e| Error::invalid_argument(format!("malformed request count '{}': {}", s, e)))
        };

        Ok(RequestCount {
            reads: parse(reads)?,
            writes: parse(writes)?,
        })
    }
}

impl Serialize for RequestCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Per-database metadata record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Bearer token required for access, `None` for a public database
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub requests: RequestCount,
}

impl Meta {
    pub fn public() -> Self {
        Meta::default()
    }

    pub fn protected(token: impl Into<String>) -> Self {
        Meta {
            auth: Some(token.into()),
            requests: RequestCount::default(),
        }
    }

    pub fn is_protected(&self) -> bool {
        self.auth.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_count_uses_colon_format() {
        let count = RequestCount::new(3, 7);
        assert_eq!(count.to_string(), "3:7");
        assert_eq!("3:7".parse::<RequestCount>().unwrap(), count);
        assert!("3".parse::<RequestCount>().is_err());
        assert!("a:1".parse::<RequestCount>().is_err());
        assert!("-1:1".parse::<RequestCount>().is_err());
    }

    #[test]
    fn meta_round_trips_through_stored_json() {
        let meta: Meta = serde_json::from_str(r#"{"auth":"secret","requests":"10:2"}"#).unwrap();
        assert_eq!(meta.auth.as_deref(), Some("secret"));
        assert_eq!(meta.requests, RequestCount::new(10, 2));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json, serde_json::json!({"auth": "secret", "requests": "10:2"}));
    }

    #[test]
    fn missing_requests_default_to_zero() {
        let meta: Meta = serde_json::from_str(r#"{"auth":null}"#).unwrap();
        assert!(!meta.is_protected());
        assert_eq!(meta.requests, RequestCount::default());
    }
}
