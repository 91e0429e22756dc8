//! # Weir Economics - Emission, Escrow and Weighted Reward Distribution
//!
//! A fixed-supply token is released under a halving schedule, metered out of
//! an escrow, split across registered pools by a time-weighted performance
//! score, and finally split across each pool's stakers by weighted balance.
//!
//! ## Components
//!
//! - **EmissionSchedule**: halving cycles and cumulative unlocked amount
//! - **Escrow**: custodies the allocation and releases the unlocked delta
//! - **WeightLedger**: period-indexed pool weights and the lazy
//!   reward-per-weight accumulator
//! - **PoolDistributor**: per-pool reward-per-token over weighted token classes
//!
//! ## Reward flow
//!
//! ```text
//! ┌──────────────┐   unlocked    ┌────────┐  release   ┌──────────────┐
//! │  Emission    │──────────────►│ Escrow │───────────►│ WeightLedger │
//! │  Schedule    │               └────────┘            └──────┬───────┘
//! └──────────────┘                                claim (farm)│
//!                                                             ▼
//!                                                   ┌──────────────────┐
//!                                                   │ PoolDistributor  │──► stakers
//!                                                   └──────────────────┘
//! ```
//!
//! Nothing runs in the background: every accumulator is derived lazily from
//! the injected clock when an operation is called.

pub mod config;
pub mod distributor;
pub mod emission;
pub mod escrow;
pub mod ledger;
pub mod performance;

// Re-exports
pub use config::{
    ClassWeight, DistributorConfig, EconomicsConfig, EscrowConfig, LedgerConfig, LoggingConfig, ScheduleConfig,
};
pub use distributor::{PoolDistributor, StakerAccount};
pub use emission::EmissionSchedule;
pub use escrow::Escrow;
pub use ledger::{PeriodCalendar, PoolRecord, WeightLedger};
pub use performance::GlobalPerformance;

/// Economic constants
pub mod constants {
    /// One week in seconds
    pub const ONE_WEEK_SECS: i64 = 7 * 24 * 3600;

    /// Halving cycle length: 26 weeks
    pub const DEFAULT_CYCLE_DURATION_SECS: i64 = 26 * ONE_WEEK_SECS;

    /// Ledger period length: 2 weeks
    pub const DEFAULT_PERIOD_DURATION_SECS: i64 = 2 * ONE_WEEK_SECS;

    /// One whole token in smallest units
    pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

    /// Scale of the average price change score (per-mille per period)
    pub const APC_SCALE: u128 = 1_000;

    /// Minimum pool capital for eligibility: 10,000 tokens
    pub const DEFAULT_MIN_CAPITAL: u128 = 10_000 * ONE_TOKEN;

    /// Minimum number of investors for eligibility
    pub const DEFAULT_MIN_INVESTORS: u64 = 10;

    /// Default staked token classes and their weights
    pub const DEFAULT_CLASS_WEIGHTS: [(u32, u128); 4] = [(1, 65), (2, 20), (3, 10), (4, 5)];
}

pub use constants::*;
