//! # Emission Schedule
//!
//! Halving release schedule. Cycle `n` (1-based) releases
//! `tokens_per_cycle / 2^(n-1)` tokens at a constant per-second rate.
//!
//! ```text
//! Cycle 1: T        rate T / C
//! Cycle 2: T / 2    rate T / 2C
//! Cycle 3: T / 4    rate T / 4C
//! ...
//! ```
//!
//! The unlocked amount at `t` is the sum of every fully elapsed cycle plus
//! the current cycle's rate times the seconds elapsed in it. All divisions
//! floor, so independently timed calls may differ by a few units of dust.

use serde::{Deserialize, Serialize};
use weir_core::{Amount, Result, Timestamp, WeirError};

use crate::config::ScheduleConfig;

/// Halving emission schedule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionSchedule {
    /// First cycle's budget
    tokens_per_cycle: Amount,
    /// Cycle length in seconds
    cycle_duration: i64,
    /// Start of cycle 1
    genesis_time: Timestamp,
}

impl EmissionSchedule {
    pub fn new(tokens_per_cycle: Amount, cycle_duration: i64, genesis_time: Timestamp) -> Result<Self> {
        if cycle_duration <= 0 {
            return Err(WeirError::InvalidArgument(format!(
                "cycle duration must be positive, got {cycle_duration}"
            )));
        }
        Ok(Self {
            tokens_per_cycle,
            cycle_duration,
            genesis_time,
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(
            config.tokens_per_cycle,
            config.cycle_duration_secs,
            config.genesis_time,
        )
    }

    pub fn tokens_per_cycle(&self) -> Amount {
        self.tokens_per_cycle
    }

    pub fn cycle_duration(&self) -> i64 {
        self.cycle_duration
    }

    pub fn genesis_time(&self) -> Timestamp {
        self.genesis_time
    }

    /// 1-based cycle containing `t`; 0 before genesis
    pub fn cycle_index(&self, t: Timestamp) -> u64 {
        if t < self.genesis_time {
            return 0;
        }
        ((t - self.genesis_time) / self.cycle_duration) as u64 + 1
    }

    /// Budget of cycle `n`; 0 for `n == 0` and once halving reaches zero
    pub fn tokens_for_cycle(&self, n: u64) -> Amount {
        match n {
            0 => 0,
            n if n > 128 => 0,
            n => self.tokens_per_cycle >> (n - 1),
        }
    }

    /// Per-second release rate during cycle `n`
    pub fn reward_rate(&self, n: u64) -> Amount {
        self.tokens_for_cycle(n) / self.cycle_duration as u128
    }

    /// Start timestamp of cycle `n`
    pub fn start_of_cycle(&self, n: u64) -> Result<Timestamp> {
        if n == 0 {
            return Err(WeirError::InvalidArgument("cycle index starts at 1".into()));
        }
        i64::try_from(n - 1)
            .ok()
            .and_then(|k| k.checked_mul(self.cycle_duration))
            .and_then(|offset| self.genesis_time.checked_add(offset))
            .ok_or(WeirError::ArithmeticOverflow("start of cycle"))
    }

    pub fn current_cycle(&self, now: Timestamp) -> u64 {
        self.cycle_index(now)
    }

    pub fn current_reward_rate(&self, now: Timestamp) -> Amount {
        self.reward_rate(self.cycle_index(now))
    }

    /// Start of the cycle containing `now`; genesis when `now` is before it
    pub fn start_of_current_cycle(&self, now: Timestamp) -> Timestamp {
        let cycle = self.cycle_index(now).max(1);
        let elapsed_cycles = (cycle - 1) as i64;
        self.genesis_time + elapsed_cycles * self.cycle_duration
    }

    /// Cumulative tokens unlocked at `t`; 0 before genesis
    pub fn available_rewards(&self, t: Timestamp) -> Amount {
        let cycle = self.cycle_index(t);
        if cycle == 0 {
            return 0;
        }

        let mut total: Amount = 0;
        for n in 1..cycle {
            let budget = self.tokens_for_cycle(n);
            if budget == 0 {
                break;
            }
            total = total.saturating_add(budget);
        }

        let cycle_start = self.start_of_current_cycle(t);
        let elapsed = (t - cycle_start) as u128;
        total.saturating_add(self.reward_rate(cycle).saturating_mul(elapsed))
    }

    /// Sum of every cycle's budget (the geometric series limit, floored)
    pub fn total_emission(&self) -> Amount {
        (1..=128u64)
            .map(|n| self.tokens_for_cycle(n))
            .take_while(|budget| *budget > 0)
            .fold(0u128, |acc, budget| acc.saturating_add(budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use proptest::prelude::*;

    const C: i64 = DEFAULT_CYCLE_DURATION_SECS;
    const GENESIS: i64 = 1_700_000_000;

    fn schedule() -> EmissionSchedule {
        EmissionSchedule::new(4 * C as u128, C, GENESIS).unwrap()
    }

    #[test]
    fn test_cycle_index() {
        let s = schedule();
        assert_eq!(s.cycle_index(GENESIS - 1), 0);
        assert_eq!(s.cycle_index(GENESIS + 100), 1);
        assert_eq!(s.cycle_index(GENESIS + 27 * ONE_WEEK_SECS), 2);
        assert_eq!(s.cycle_index(GENESIS + 2 * C), 3);
    }

    #[test]
    fn test_tokens_for_cycle() {
        let s = schedule();
        assert_eq!(s.tokens_for_cycle(0), 0);
        assert_eq!(s.tokens_for_cycle(1), 4 * C as u128);
        assert_eq!(s.tokens_for_cycle(3), C as u128);
        assert_eq!(s.tokens_for_cycle(200), 0);
    }

    #[test]
    fn test_start_of_cycle() {
        let s = schedule();
        assert_eq!(s.start_of_cycle(1).unwrap(), GENESIS);
        assert_eq!(s.start_of_cycle(2).unwrap(), GENESIS + C);
        assert_eq!(s.start_of_cycle(3).unwrap(), GENESIS + 2 * C);
        assert!(s.start_of_cycle(0).is_err());
    }

    #[test]
    fn test_reward_rate_halves() {
        let s = schedule();
        assert_eq!(s.reward_rate(1), 4);
        assert_eq!(s.reward_rate(3), 1);
        assert_eq!(s.current_reward_rate(GENESIS + 100), 4);
        assert_eq!(s.current_reward_rate(GENESIS + 27 * ONE_WEEK_SECS), 2);
    }

    #[test]
    fn test_start_of_current_cycle() {
        let s = schedule();
        assert_eq!(s.start_of_current_cycle(GENESIS + 100), GENESIS);
        assert_eq!(s.start_of_current_cycle(GENESIS + 27 * ONE_WEEK_SECS), GENESIS + C);
        assert_eq!(s.start_of_current_cycle(GENESIS - 5), GENESIS);
    }

    #[test]
    fn test_available_rewards_within_first_cycle() {
        let s = schedule();
        assert_eq!(s.available_rewards(0), 0);
        assert_eq!(s.available_rewards(GENESIS), 0);
        assert_eq!(s.available_rewards(GENESIS + 50), 200);
    }

    #[test]
    fn test_available_rewards_cross_cycle() {
        let s = schedule();
        let t = GENESIS + C + ONE_WEEK_SECS;
        assert_eq!(s.available_rewards(t), 4 * C as u128 + 2 * ONE_WEEK_SECS as u128);
    }

    #[test]
    fn test_total_emission_is_twice_first_cycle() {
        let s = EmissionSchedule::new(1 << 20, C, GENESIS).unwrap();
        assert_eq!(s.total_emission(), (1 << 21) - 1);
    }

    #[test]
    fn test_rejects_zero_cycle() {
        assert!(EmissionSchedule::new(100, 0, GENESIS).is_err());
    }

    proptest! {
        #[test]
        fn prop_available_rewards_monotonic(a in 0i64..(10 * C), b in 0i64..(10 * C)) {
            let s = schedule();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(s.available_rewards(GENESIS + lo) <= s.available_rewards(GENESIS + hi));
        }

        #[test]
        fn prop_available_rewards_never_exceeds_total(t in 0i64..(300 * C)) {
            let s = schedule();
            prop_assert!(s.available_rewards(GENESIS + t) <= s.total_emission());
        }
    }
}
