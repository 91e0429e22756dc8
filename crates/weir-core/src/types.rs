//! Core type definitions for Weir
//!
//! Amounts are raw token units (`u128`), timestamps are unix seconds (`i64`).
//! Cumulative per-weight accumulators are carried as [`Scaled`] values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

use crate::error::{Result, WeirError};
use crate::math::mul_div;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Token amount in the smallest unit
pub type Amount = u128;

/// Fixed-point scale used by the ledger accumulator (1e18)
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Address - identity of an actor (pool, farm, staker, escrow, ledger)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Deterministic address derived from a human label ("alice", "pool-1")
    pub fn from_label(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self(bytes)
    }

    /// Address whose last eight bytes hold `n` big-endian
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(raw)
            .map_err(|e| WeirError::InvalidArgument(format!("address {s}: {e}")))?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|_| WeirError::InvalidArgument(format!("address {s}: expected 20 bytes")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Staked token class (the id of a multi-token position class)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenClass(pub u32);

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class-{}", self.0)
    }
}

/// Scaled - an unsigned fixed-point value with an explicit scale.
///
/// Every constructor and every application divides with floor rounding,
/// never round-to-nearest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scaled(u128);

impl Scaled {
    pub const ZERO: Self = Self(0);

    /// Wrap a raw (already scaled) value
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    /// `floor(amount * scale / weight)`; zero weight is rejected
    pub fn per_weight(amount: Amount, weight: u128, scale: u128) -> Result<Self> {
        if weight == 0 {
            return Err(WeirError::InvalidArgument("division by zero weight".into()));
        }
        mul_div(amount, scale, weight).map(Self)
    }

    /// `floor(weight * self / scale)`: the amount owed to `weight` units
    pub fn apply(self, weight: u128, scale: u128) -> Result<Amount> {
        mul_div(weight, self.0, scale)
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(WeirError::ArithmeticOverflow("scaled accumulator"))
    }
}

impl Sub for Scaled {
    type Output = Scaled;

    /// Saturating: accumulators are monotonic, a negative delta is zero progress
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Scaled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
