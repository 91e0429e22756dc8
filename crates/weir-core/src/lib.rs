//! # Weir Core
//!
//! Leaf building blocks for the Weir emission and reward ledger.
//!
//! This crate provides:
//! - `WeirError` - The error taxonomy shared by every component
//! - `Address`, `Scaled` - Identities and floor-rounded fixed-point values
//! - `math` - Integer log, square root, wide `mul_div` and time scaling
//! - `Clock` - Injected source of time
//! - `Transferable` / `MultiTransferable` / `Mintable` / `Owned` - Token capabilities
//! - `tx::atomically` - Draft-and-commit state transitions
//!
//! ## Data flow
//!
//! ```text
//!   math ──► EmissionSchedule ──► Escrow ──► WeightLedger ──► PoolDistributor ──► stakers
//!                                   │             │                  │
//!                                   └──── Transferable (reward token) ┘
//! ```

pub mod clock;
pub mod error;
pub mod math;
pub mod serde_amount;
pub mod token;
pub mod tx;
pub mod types;

pub use clock::*;
pub use error::*;
pub use token::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{Result, WeirError};
    pub use crate::math::{isqrt, log2_floor, mul_div, mul_div_rem, scale_by_time};
    pub use crate::token::{
        ClassTokenBank, ClassTransfer, Mintable, MultiTransferable, Owned, TokenBank, Transfer,
        Transferable,
    };
    pub use crate::tx::atomically;
    pub use crate::types::*;
}
