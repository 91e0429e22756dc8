//! Serde helpers for `u128` amounts in text formats.
//!
//! TOML integers stop at `i64`, and 18-decimal token amounts do not fit. Amounts
//! are written as decimal strings and read back from either a string or a
//! plain integer.
//!
//! ```ignore
//! #[serde(with = "weir_core::serde_amount")]
//! pub tokens_per_cycle: u128,
//! ```

use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Int(u64),
    Str(String),
}

impl RawAmount {
    fn parse<E: serde::de::Error>(self) -> Result<u128, E> {
        match self {
            Self::Int(n) => Ok(n as u128),
            Self::Str(s) => s
                .replace('_', "")
                .parse::<u128>()
                .map_err(|e| E::custom(format!("invalid amount {s:?}: {e}"))),
        }
    }
}

pub fn serialize<S>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&amount.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    RawAmount::deserialize(deserializer)?.parse()
}

/// The same encoding for `Option<u128>`
pub mod option {
    use super::*;

    pub fn serialize<S>(amount: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match amount {
            Some(amount) => serializer.serialize_some(&amount.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<RawAmount>::deserialize(deserializer)?
            .map(RawAmount::parse::<D::Error>)
            .transpose()
    }
}
