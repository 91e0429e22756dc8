//! Error types for Weir ledger operations

use thiserror::Error;

/// Result type alias for Weir operations
pub type Result<T> = std::result::Result<T, WeirError>;

/// Errors that can occur in Weir ledger operations
///
/// Every public operation is transactional: when one of these is returned
/// the component that raised it has not mutated any state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeirError {
    // === Authorization ===
    /// Wrong caller for a privileged operation
    #[error("Unauthorized caller {caller} for {operation}")]
    Unauthorized {
        operation: &'static str,
        caller: String,
    },

    // === Arguments ===
    /// Negative period index, timestamp before genesis, zero amount, ...
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Duplicate registration
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Unknown pool, account or token class
    #[error("Not found: {0}")]
    NotFound(String),

    // === Pool state ===
    /// Previous recorded period is after the latest recorded period.
    /// Not fatal: the ledger treats it as zero progress.
    #[error("Ordering anomaly: previous period {previous} > latest period {latest}")]
    OrderingAnomaly { latest: u64, previous: u64 },

    /// Pool has not passed the eligibility check
    #[error("Pool is not eligible: {0}")]
    PoolNotEligible(String),

    // === Balances ===
    /// Not enough tokens (or staked units) for the requested operation
    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u128, available: u128 },

    /// Checked arithmetic failed
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    // === Setup ===
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WeirError {
    /// Build an `Unauthorized` error from any displayable caller
    pub fn unauthorized(operation: &'static str, caller: impl std::fmt::Display) -> Self {
        Self::Unauthorized {
            operation,
            caller: caller.to_string(),
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::Unauthorized { .. } => 1001,
            Self::InvalidArgument(_) => 1002,
            Self::AlreadyExists(_) => 1003,
            Self::NotFound(_) => 1004,
            Self::OrderingAnomaly { .. } => 1005,
            Self::PoolNotEligible(_) => 1006,
            Self::InsufficientBalance { .. } => 1007,
            Self::ArithmeticOverflow(_) => 1008,
            Self::Config(_) => 9001,
        }
    }

    /// Whether the error must abort the calling operation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::OrderingAnomaly { .. })
    }
}
