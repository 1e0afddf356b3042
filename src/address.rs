use crate::error::ValidationError;

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Serialize, Serializer};

/// The network prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "kaspa";
/// Number of characters after the `<prefix>:` part.
pub const PAYLOAD_LEN: usize = 61;

/// An address a request asks about, checked against the
/// `<prefix>:<61 lowercase alphanumeric chars>` scheme.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    /// Parse an address, requiring the given network prefix.
    pub fn parse_with_prefix(s: &str, prefix: &str) -> Result<Address, ValidationError> {
        let invalid = || ValidationError::Address(s.to_string());

        let payload = s
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(invalid)?;
        if payload.len() != PAYLOAD_LEN
            || !payload
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(invalid());
        }

        Ok(Address(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse_with_prefix(s, DEFAULT_PREFIX)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(de::Error::custom)
    }
}
