//! Integer math primitives
//!
//! Pure functions, no state. Every division rounds towards zero (floor for
//! the unsigned domain used here).

use crate::error::{Result, WeirError};

mod wide {
    use uint::construct_uint;

    construct_uint! {
        /// 256-bit unsigned integer for widened intermediates
        pub struct U256(4);
    }
}

pub use wide::U256;

/// Floor of the base-2 logarithm; `log2_floor(0) == 0`
pub fn log2_floor(x: u128) -> u32 {
    if x == 0 {
        0
    } else {
        127 - x.leading_zeros()
    }
}

/// Floor integer square root
pub fn isqrt(x: u128) -> u128 {
    if x < 2 {
        return x;
    }
    // Newton iteration seeded above the root
    let mut r = 1u128 << (log2_floor(x) / 2 + 1);
    loop {
        let next = (r + x / r) / 2;
        if next >= r {
            return r;
        }
        r = next;
    }
}

/// `floor(a * b / d)` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(WeirError::InvalidArgument("mul_div by zero".into()));
    }
    let product = U256::from(a) * U256::from(b);
    let quotient = product / U256::from(d);
    if quotient.bits() > 128 {
        return Err(WeirError::ArithmeticOverflow("mul_div"));
    }
    Ok(quotient.low_u128())
}

/// `(a * b + carry) / d` as `(quotient, remainder)`, 256-bit intermediate.
///
/// Feeding each remainder back as the next `carry` makes a chain of
/// divisions by the same `d` sum to the single division of the total.
pub fn mul_div_rem(a: u128, b: u128, carry: u128, d: u128) -> Result<(u128, u128)> {
    if d == 0 {
        return Err(WeirError::InvalidArgument("mul_div_rem by zero".into()));
    }
    let numerator = U256::from(a)
        .checked_mul(U256::from(b))
        .and_then(|p| p.checked_add(U256::from(carry)))
        .ok_or(WeirError::ArithmeticOverflow("mul_div_rem"))?;
    let (quotient, remainder) = numerator.div_mod(U256::from(d));
    if quotient.bits() > 128 {
        return Err(WeirError::ArithmeticOverflow("mul_div_rem"));
    }
    Ok((quotient.low_u128(), remainder.low_u128()))
}

/// Move linearly between two values by the elapsed fraction of a window.
///
/// At `current == start_ts` the result is `end_value`; at
/// `current == start_ts + duration` it is `start_value`. Outside the window
/// (or for an empty window) the result is 0.
pub fn scale_by_time(
    start_value: u128,
    end_value: u128,
    current: i64,
    start_ts: i64,
    duration: i64,
) -> Result<u128> {
    if duration <= 0 || start_ts > current {
        return Ok(0);
    }
    let window_end = start_ts
        .checked_add(duration)
        .ok_or(WeirError::ArithmeticOverflow("scale_by_time window"))?;
    if window_end < current {
        return Ok(0);
    }

    let elapsed = (current - start_ts) as u128;
    let duration = duration as u128;
    if start_value >= end_value {
        let step = mul_div(start_value - end_value, elapsed, duration)?;
        Ok(end_value + step)
    } else {
        let step = mul_div(end_value - start_value, elapsed, duration)?;
        Ok(end_value - step)
    }
}
