//! # Pool Performance Scoring
//!
//! A pool's weight is its unrealized profit scaled by how its average price
//! change (APC) compares with the global duration-weighted average (aAPC).
//!
//! | Pool APC        | Weight                                         |
//! |-----------------|------------------------------------------------|
//! | above aAPC      | `profit * isqrt(apc - aAPC)`                   |
//! | equal to aAPC   | `profit`                                       |
//! | below aAPC      | `profit * log2_floor(apc) / isqrt(aAPC - apc)` |
//!
//! A pool whose price never rose (APC 0) weighs nothing while the average
//! is positive.

use serde::{Deserialize, Serialize};
use weir_core::math::{isqrt, log2_floor, mul_div};
use weir_core::{Amount, Result, WeirError};

use crate::constants::APC_SCALE;

/// Running duration-weighted average of every pool's APC
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPerformance {
    pub total_weighted_apc: u128,
    pub total_duration: u128,
}

impl GlobalPerformance {
    /// aAPC, floored; 0 while no duration has been recorded
    pub fn average_apc(&self) -> u128 {
        if self.total_duration == 0 {
            0
        } else {
            self.total_weighted_apc / self.total_duration
        }
    }

    /// Swap one pool's previous contribution for its new one
    pub fn replace_contribution(
        &mut self,
        old_weighted_apc: u128,
        old_duration: u128,
        new_weighted_apc: u128,
        new_duration: u128,
    ) -> Result<()> {
        self.total_weighted_apc = self
            .total_weighted_apc
            .saturating_sub(old_weighted_apc)
            .checked_add(new_weighted_apc)
            .ok_or(WeirError::ArithmeticOverflow("total weighted APC"))?;
        self.total_duration = self
            .total_duration
            .saturating_sub(old_duration)
            .checked_add(new_duration)
            .ok_or(WeirError::ArithmeticOverflow("total duration"))?;
        Ok(())
    }
}

/// Average price change per period, in per-mille.
///
/// Returns `OrderingAnomaly` when the previous record is newer than the
/// latest one; callers treat that as zero progress.
pub fn average_price_change(
    latest_price: u128,
    latest_period: u64,
    previous_price: u128,
    previous_period: u64,
) -> Result<u128> {
    if previous_period > latest_period {
        return Err(WeirError::OrderingAnomaly {
            latest: latest_period,
            previous: previous_period,
        });
    }
    if previous_price == 0 || latest_price <= previous_price {
        return Ok(0);
    }
    let periods = (latest_period - previous_period).max(1) as u128;
    let ratio = mul_div(latest_price, APC_SCALE, previous_price)?;
    Ok((ratio - APC_SCALE) / periods)
}

/// Weight of a pool with the given profit and APC against `global`.
///
/// Zero until the global average has data, and zero for a pool that has
/// not been tracked for any time yet.
pub fn pool_weight(
    unrealized_profit: Amount,
    pool_apc: u128,
    global: &GlobalPerformance,
    own_duration: u128,
) -> Result<u128> {
    if global.total_duration == 0 || own_duration == 0 {
        return Ok(0);
    }
    let average = global.average_apc();

    if pool_apc > average {
        return unrealized_profit
            .checked_mul(isqrt(pool_apc - average))
            .ok_or(WeirError::ArithmeticOverflow("pool weight boost"));
    }
    if pool_apc == average {
        return Ok(unrealized_profit);
    }

    // average - apc >= 1 here, so the root is never zero
    mul_div(
        unrealized_profit,
        u128::from(log2_floor(pool_apc)),
        isqrt(average - pool_apc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ONE_TOKEN;

    fn tokens(n: u128) -> u128 {
        n * ONE_TOKEN
    }

    fn milli(n: u128) -> u128 {
        n * ONE_TOKEN / 1000
    }

    #[test]
    fn test_apc_small_values() {
        assert_eq!(average_price_change(milli(1200), 1, tokens(1), 1).unwrap(), 200);
        assert_eq!(average_price_change(milli(900), 1, milli(600), 1).unwrap(), 500);
    }

    #[test]
    fn test_apc_across_periods() {
        assert_eq!(average_price_change(milli(2400), 2, tokens(2), 0).unwrap(), 100);
    }

    #[test]
    fn test_apc_large_values() {
        assert_eq!(average_price_change(tokens(3), 1, tokens(2), 1).unwrap(), 500);
    }

    #[test]
    fn test_apc_zero_cases() {
        assert_eq!(average_price_change(800, 2, 1000, 1).unwrap(), 0);
        assert_eq!(average_price_change(1000, 2, 0, 1).unwrap(), 0);
    }

    #[test]
    fn test_apc_ordering_anomaly() {
        let err = average_price_change(1000, 1, 200, 2).unwrap_err();
        assert_eq!(
            err,
            WeirError::OrderingAnomaly {
                latest: 1,
                previous: 2
            }
        );
        assert!(!err.is_fatal());
    }

    fn global(weighted: u128, duration: u128) -> GlobalPerformance {
        GlobalPerformance {
            total_weighted_apc: weighted,
            total_duration: duration,
        }
    }

    #[test]
    fn test_weight_without_data_is_zero() {
        assert_eq!(pool_weight(1000, 200, &global(0, 0), 10).unwrap(), 0);
        assert_eq!(pool_weight(1000, 200, &global(150, 1), 0).unwrap(), 0);
    }

    #[test]
    fn test_weight_above_average() {
        let g = global(150, 1);
        assert_eq!(pool_weight(tokens(8), 200, &g, 1).unwrap(), tokens(56));
        assert_eq!(pool_weight(tokens(30), 500, &g, 1).unwrap(), tokens(540));
        assert_eq!(
            pool_weight(tokens(1_000_000), 500, &g, 1).unwrap(),
            tokens(18_000_000)
        );
    }

    #[test]
    fn test_weight_below_average() {
        let g = global(150, 1);
        let expected = tokens(10_000) * 6 / 7;
        assert_eq!(pool_weight(tokens(10_000), 100, &g, 1).unwrap(), expected);

        // aAPC 499: log2(400) = 8, isqrt(99) = 9
        let g = global(115_400, 231);
        assert_eq!(g.average_apc(), 499);
        assert_eq!(
            pool_weight(tokens(10), 400, &g, 1).unwrap(),
            8_888_888_888_888_888_888
        );

        // aAPC 699: log2(600) = 9, isqrt(99) = 9
        let g = global(161_600, 231);
        assert_eq!(g.average_apc(), 699);
        assert_eq!(pool_weight(tokens(25), 600, &g, 1).unwrap(), tokens(25));
    }

    #[test]
    fn test_weight_of_flat_pool_below_average_is_zero() {
        assert_eq!(pool_weight(tokens(10), 0, &global(150, 1), 1).unwrap(), 0);
        assert_eq!(pool_weight(tokens(10), 1, &global(150, 1), 1).unwrap(), 0);
    }

    #[test]
    fn test_weight_at_average_is_profit() {
        assert_eq!(pool_weight(tokens(10), 200, &global(22_400, 112), 112).unwrap(), tokens(10));
        assert_eq!(pool_weight(tokens(10), 0, &global(0, 5), 5).unwrap(), tokens(10));
    }

    #[test]
    fn test_replace_contribution() {
        let mut g = global(10_000, 100);
        g.replace_contribution(0, 0, 22_400, 112).unwrap();
        g.replace_contribution(22_400, 112, 34_200, 114).unwrap();
        assert_eq!(g, global(44_200, 214));
        assert_eq!(g.average_apc(), 206);
    }
}
