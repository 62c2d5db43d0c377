use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(AssetId);
id_newtype!(BlockNumber);

impl AssetId {
    /// Position of this asset inside a 1-based, dense snapshot.
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()?.checked_sub(1)
    }
}

const ADDRESS_HEX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("address is empty")]
    Empty,
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),
    #[error("address must have {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("address contains non-hex characters: {0}")]
    NonHex(String),
}

/// An account or contract address: `0x` followed by 40 hex digits.
///
/// Stored lowercase so that checksummed and plain spellings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AddressParseError::Empty);
        }

        let Some(digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) else {
            return Err(AddressParseError::MissingPrefix(raw.to_string()));
        };

        if digits.len() != ADDRESS_HEX_LEN {
            return Err(AddressParseError::InvalidLength {
                expected: ADDRESS_HEX_LEN,
                actual: digits.len(),
            });
        }

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::NonHex(raw.to_string()));
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened `0x1234…abcd` form for log lines.
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn random() -> Self {
        Self(format!(
            "0x{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One registry entry as cached by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub content_hash: String,
    pub owner: Address,
    /// Unix timestamp (seconds) at which the ledger recorded the registration.
    pub registered_at: i64,
}

impl Asset {
    pub fn registered_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.registered_at, 0)
    }
}
