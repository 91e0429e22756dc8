//! # Weight Ledger
//!
//! Allocates escrow emission across registered pools, period by period.
//!
//! ## Periods
//!
//! Time is cut into fixed periods counted from genesis. Each period keeps a
//! weight per pool (overwritten on every update inside the period) and a
//! global weight that is always the sum of the pool weights.
//!
//! ## Accumulator
//!
//! `reward_per_weight` is a cumulative tokens-per-unit-weight value scaled
//! by 1e18. It is advanced lazily: the interval since the last advance is
//! split at period boundaries and each piece adds
//! `released * SCALE / global_weight(period)`. Pieces with zero global weight
//! add nothing; their tokens are deferred into the next piece that has
//! weight. The division remainder is carried forward, so the result does
//! not depend on how often the accumulator was advanced.
//!
//! ```text
//!   period p-1          period p              period p+1
//! |---------------|----------------------|-----------------|
//!          last ^ |<- G[p]             ->| now ^
//!        checkpoint[p]             checkpoint[p+1]
//! ```
//!
//! A pool's earnings replay the same pieces against its own weight history,
//! using the accumulator checkpoints recorded at each crossed boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use weir_core::math::{mul_div_rem, scale_by_time};
use weir_core::tx::atomically;
use weir_core::{
    Address, Amount, Clock, Result, Scaled, Timestamp, Transfer, Transferable, WeirError, SCALE,
};

use crate::config::LedgerConfig;
use crate::escrow::Escrow;
use crate::performance::{self, GlobalPerformance};

/// Fixed-length periods counted from genesis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCalendar {
    genesis: Timestamp,
    period_duration: i64,
}

impl PeriodCalendar {
    pub fn new(genesis: Timestamp, period_duration: i64) -> Result<Self> {
        if period_duration <= 0 {
            return Err(WeirError::InvalidArgument(format!(
                "period duration must be positive, got {period_duration}"
            )));
        }
        Ok(Self {
            genesis,
            period_duration,
        })
    }

    pub fn genesis(&self) -> Timestamp {
        self.genesis
    }

    pub fn period_duration(&self) -> i64 {
        self.period_duration
    }

    /// Period containing `t`
    pub fn index(&self, t: Timestamp) -> Result<u64> {
        if t < self.genesis {
            return Err(WeirError::InvalidArgument(format!(
                "timestamp {t} is before genesis {}",
                self.genesis
            )));
        }
        Ok(((t - self.genesis) / self.period_duration) as u64)
    }

    /// Start timestamp of period `i`
    pub fn start(&self, i: i64) -> Result<Timestamp> {
        if i < 0 {
            return Err(WeirError::InvalidArgument(format!(
                "period index {i} is negative"
            )));
        }
        i.checked_mul(self.period_duration)
            .and_then(|offset| self.genesis.checked_add(offset))
            .ok_or(WeirError::ArithmeticOverflow("start of period"))
    }

    /// Period of `t`, with everything before genesis in period 0
    fn index_clamped(&self, t: Timestamp) -> u64 {
        if t <= self.genesis {
            0
        } else {
            ((t - self.genesis) / self.period_duration) as u64
        }
    }

    fn start_of(&self, i: u64) -> Timestamp {
        (i as i64)
            .saturating_mul(self.period_duration)
            .saturating_add(self.genesis)
    }
}

/// Everything the ledger knows about one pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub registered: bool,
    pub eligible: bool,
    /// Farm allowed to claim for this pool
    pub farm: Address,
    pub unrealized_profit: Amount,
    pub latest_price: u128,
    pub latest_period_index: u64,
    pub previous_price: u128,
    pub previous_period_index: u64,
    pub last_updated: Timestamp,
    /// Registration time; start of the pool's performance window
    pub tracking_since: Timestamp,
    pub pool_apc: u128,
    /// This pool's share of the global performance totals
    pub weighted_apc_contribution: u128,
    pub duration_contribution: u128,
    pub reward_per_weight_paid: Scaled,
    /// Period of `reward_per_weight_paid`
    pub paid_period: u64,
    pub pending_reward: Amount,
}

/// Lazily advanced reward-per-weight accumulator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Accumulator {
    reward_per_weight: Scaled,
    /// Scaled remainder of the last division
    dust: u128,
    /// Tokens released while the global weight was zero
    deferred: Amount,
    /// Accumulator value at the start of each crossed period
    checkpoints: BTreeMap<u64, Scaled>,
    last_update_time: Timestamp,
}

impl Accumulator {
    fn advance(
        &mut self,
        calendar: &PeriodCalendar,
        escrow: &Escrow,
        global_weights: &BTreeMap<u64, u128>,
        now: Timestamp,
    ) -> Result<()> {
        let mut cursor = self.last_update_time;
        while cursor < now {
            let period = calendar.index_clamped(cursor);
            let boundary = calendar.start_of(period + 1);
            let segment_end = boundary.min(now);

            let released = escrow
                .unlocked_at(segment_end)
                .saturating_sub(escrow.unlocked_at(cursor));
            let weight = global_weights.get(&period).copied().unwrap_or(0);

            if weight == 0 {
                if released > 0 {
                    warn!(period, released, "zero global weight, deferring release");
                }
                self.deferred = self
                    .deferred
                    .checked_add(released)
                    .ok_or(WeirError::ArithmeticOverflow("deferred rewards"))?;
            } else {
                let amount = released
                    .checked_add(self.deferred)
                    .ok_or(WeirError::ArithmeticOverflow("deferred rewards"))?;
                let (increment, dust) = mul_div_rem(amount, SCALE, self.dust, weight)?;
                self.reward_per_weight = self
                    .reward_per_weight
                    .checked_add(Scaled::from_raw(increment))?;
                self.dust = dust;
                self.deferred = 0;
                debug!(period, amount, weight, increment, "accumulator advanced");
            }

            if segment_end == boundary {
                self.checkpoints.insert(period + 1, self.reward_per_weight);
            }
            cursor = segment_end;
        }
        self.last_update_time = self.last_update_time.max(now);
        Ok(())
    }

    fn checkpoint(&self, period: u64) -> Result<Scaled> {
        self.checkpoints
            .get(&period)
            .copied()
            .ok_or_else(|| WeirError::NotFound(format!("accumulator checkpoint for period {period}")))
    }

    /// Pending reward plus everything accrued since the pool's last settlement
    fn owed(
        &self,
        calendar: &PeriodCalendar,
        record: &PoolRecord,
        weights: Option<&BTreeMap<u64, u128>>,
    ) -> Result<Amount> {
        let mut owed = record.pending_reward;
        let current = calendar.index_clamped(self.last_update_time);
        let Some(weights) = weights else {
            return Ok(owed);
        };
        if record.paid_period > current {
            return Ok(owed);
        }

        for (&period, &weight) in weights.range(record.paid_period..=current) {
            let low = if period == record.paid_period {
                record.reward_per_weight_paid
            } else {
                self.checkpoint(period)?
            };
            let high = if period == current {
                self.reward_per_weight
            } else {
                self.checkpoint(period + 1)?
            };
            owed = owed
                .checked_add((high - low).apply(weight, SCALE)?)
                .ok_or(WeirError::ArithmeticOverflow("earned"))?;
        }
        Ok(owed)
    }
}

/// Ledger state mutated as one unit by every operation
#[derive(Clone, Debug)]
struct LedgerState {
    escrow: Escrow,
    pools: BTreeMap<Address, PoolRecord>,
    global_period_weight: BTreeMap<u64, u128>,
    pool_period_weight: BTreeMap<Address, BTreeMap<u64, u128>>,
    performance: GlobalPerformance,
    accumulator: Accumulator,
}

impl LedgerState {
    fn advance(&mut self, calendar: &PeriodCalendar, now: Timestamp) -> Result<()> {
        self.accumulator
            .advance(calendar, &self.escrow, &self.global_period_weight, now)
    }

    /// Fold the pool's accrual into `pending_reward` and snapshot the accumulator
    fn settle(&mut self, calendar: &PeriodCalendar, pool: &Address) -> Result<()> {
        let record = self
            .pools
            .get_mut(pool)
            .ok_or_else(|| WeirError::NotFound(format!("pool {pool}")))?;
        let owed = self
            .accumulator
            .owed(calendar, record, self.pool_period_weight.get(pool))?;
        record.pending_reward = owed;
        record.reward_per_weight_paid = self.accumulator.reward_per_weight;
        record.paid_period = calendar.index_clamped(self.accumulator.last_update_time);
        Ok(())
    }
}

/// Period-indexed weight and reward ledger
pub struct WeightLedger<C: Clock> {
    /// Account that holds released emission
    address: Address,
    /// Only caller allowed to register pools
    pool_factory: Address,
    calendar: PeriodCalendar,
    min_capital: Amount,
    min_investors: u64,
    clock: C,
    state: LedgerState,
}

impl<C: Clock> WeightLedger<C> {
    /// Create a ledger that owns `escrow`. The escrow must release to `address`.
    pub fn new(
        address: Address,
        pool_factory: Address,
        escrow: Escrow,
        config: &LedgerConfig,
        clock: C,
    ) -> Result<Self> {
        if escrow.recipient() != address {
            return Err(WeirError::InvalidArgument(format!(
                "escrow releases to {}, not to the ledger {address}",
                escrow.recipient()
            )));
        }
        let genesis = escrow.schedule().genesis_time();
        let calendar = PeriodCalendar::new(genesis, config.period_duration_secs)?;
        let accumulator = Accumulator {
            last_update_time: genesis,
            ..Accumulator::default()
        };

        Ok(Self {
            address,
            pool_factory,
            calendar,
            min_capital: config.min_capital,
            min_investors: config.min_investors,
            clock,
            state: LedgerState {
                escrow,
                pools: BTreeMap::new(),
                global_period_weight: BTreeMap::new(),
                pool_period_weight: BTreeMap::new(),
                performance: GlobalPerformance::default(),
                accumulator,
            },
        })
    }

    // === Period arithmetic ===

    pub fn period_index(&self, t: Timestamp) -> Result<u64> {
        self.calendar.index(t)
    }

    pub fn start_of_period(&self, i: i64) -> Result<Timestamp> {
        self.calendar.start(i)
    }

    pub fn current_period(&self) -> Result<u64> {
        self.calendar.index(self.clock.now())
    }

    // === Registration and eligibility ===

    /// Register `pool` with its farm and a seed price. Pool factory only.
    pub fn register_pool(
        &mut self,
        caller: &Address,
        pool: Address,
        farm: Address,
        seed_price: u128,
    ) -> Result<()> {
        if *caller != self.pool_factory {
            return Err(WeirError::unauthorized("registerPool", caller));
        }
        let now = self.clock.now();
        let calendar = self.calendar;

        atomically(&mut self.state, |state| {
            if state.pools.contains_key(&pool) {
                return Err(WeirError::AlreadyExists(format!("pool {pool}")));
            }
            state.advance(&calendar, now)?;
            let period = calendar.index_clamped(now);
            state.pools.insert(
                pool,
                PoolRecord {
                    registered: true,
                    eligible: false,
                    farm,
                    unrealized_profit: 0,
                    latest_price: seed_price,
                    latest_period_index: period,
                    previous_price: seed_price,
                    previous_period_index: period,
                    last_updated: now,
                    tracking_since: now,
                    pool_apc: 0,
                    weighted_apc_contribution: 0,
                    duration_contribution: 0,
                    reward_per_weight_paid: state.accumulator.reward_per_weight,
                    paid_period: period,
                    pending_reward: 0,
                },
            );
            Ok(())
        })?;

        info!(pool = %pool, farm = %farm, seed_price, "registered pool");
        Ok(())
    }

    fn meets_thresholds(&self, capital: Amount, investors: u64) -> bool {
        capital >= self.min_capital && investors >= self.min_investors
    }

    /// Called by a pool to become eligible. Never revokes eligibility.
    pub fn mark_pool_as_eligible(
        &mut self,
        caller: &Address,
        capital: Amount,
        investors: u64,
    ) -> Result<bool> {
        let qualifies = self.meets_thresholds(capital, investors);
        let record = self
            .state
            .pools
            .get_mut(caller)
            .ok_or_else(|| WeirError::unauthorized("markPoolAsEligible", caller))?;

        if qualifies && !record.eligible {
            record.eligible = true;
            info!(pool = %caller, capital, investors, "pool became eligible");
        }
        Ok(record.eligible)
    }

    /// Re-run the eligibility check for `pool`; may revoke. Pool factory only.
    pub fn reevaluate_eligibility(
        &mut self,
        caller: &Address,
        pool: &Address,
        capital: Amount,
        investors: u64,
    ) -> Result<bool> {
        if *caller != self.pool_factory {
            return Err(WeirError::unauthorized("reevaluateEligibility", caller));
        }
        let qualifies = self.meets_thresholds(capital, investors);
        let record = self
            .state
            .pools
            .get_mut(pool)
            .ok_or_else(|| WeirError::NotFound(format!("pool {pool}")))?;

        if record.eligible != qualifies {
            info!(pool = %pool, eligible = qualifies, "pool eligibility changed");
        }
        record.eligible = qualifies;
        Ok(qualifies)
    }

    // === Weights ===

    /// Record a pool's new profit and price, then overwrite its weight for
    /// the current period. Callable by the pool or its farm.
    pub fn update_weight(
        &mut self,
        caller: &Address,
        pool: &Address,
        unrealized_profit: Amount,
        price: u128,
    ) -> Result<u128> {
        let now = self.clock.now();
        let calendar = self.calendar;
        let pool = *pool;

        let (weight, apc) = atomically(&mut self.state, |state| {
            let record = state
                .pools
                .get(&pool)
                .ok_or_else(|| WeirError::NotFound(format!("pool {pool}")))?;
            if *caller != pool && *caller != record.farm {
                return Err(WeirError::unauthorized("updateWeight", caller));
            }
            let period = calendar.index(now)?;

            // Accrual up to now belongs to the old weights
            state.advance(&calendar, now)?;
            state.settle(&calendar, &pool)?;

            let record = state
                .pools
                .get_mut(&pool)
                .ok_or_else(|| WeirError::NotFound(format!("pool {pool}")))?;
            if period > record.latest_period_index {
                record.previous_price = record.latest_price;
                record.previous_period_index = record.latest_period_index;
            }
            record.latest_price = price;
            record.latest_period_index = period;
            record.unrealized_profit = unrealized_profit;
            record.pool_apc = apc_or_zero(&pool, record)?;

            let duration = now.saturating_sub(record.tracking_since).max(0) as u128;
            let weighted_apc = record
                .pool_apc
                .checked_mul(duration)
                .ok_or(WeirError::ArithmeticOverflow("weighted APC"))?;
            state.performance.replace_contribution(
                record.weighted_apc_contribution,
                record.duration_contribution,
                weighted_apc,
                duration,
            )?;
            record.weighted_apc_contribution = weighted_apc;
            record.duration_contribution = duration;
            record.last_updated = now;

            let weight = performance::pool_weight(
                record.unrealized_profit,
                record.pool_apc,
                &state.performance,
                duration,
            )?;

            let old = state
                .pool_period_weight
                .entry(pool)
                .or_default()
                .insert(period, weight)
                .unwrap_or(0);
            let global = state.global_period_weight.entry(period).or_insert(0);
            *global = global
                .checked_sub(old)
                .and_then(|g| g.checked_add(weight))
                .ok_or(WeirError::ArithmeticOverflow("global period weight"))?;

            Ok((weight, record.pool_apc))
        })?;

        info!(pool = %pool, weight, apc, unrealized_profit, price, "updated pool weight");
        Ok(weight)
    }

    /// Current APC of `pool` from its recorded prices
    pub fn average_price_change(&self, pool: &Address) -> Result<u128> {
        let record = self.record(pool)?;
        apc_or_zero(pool, record)
    }

    /// Weight `pool` would get right now from its recorded profit and APC
    pub fn pool_weight(&self, pool: &Address) -> Result<u128> {
        let record = self.record(pool)?;
        let duration = self
            .clock
            .now()
            .saturating_sub(record.tracking_since)
            .max(0) as u128;
        performance::pool_weight(
            record.unrealized_profit,
            record.pool_apc,
            &self.state.performance,
            duration,
        )
    }

    /// Current period's global weight blended from the previous period's
    /// by elapsed time. Informational; accrual uses recorded weights.
    pub fn effective_global_weight(&self) -> Result<u128> {
        let now = self.clock.now();
        let period = self.calendar.index(now)?;
        let current = self.global_period_weight(period);
        if period == 0 {
            return Ok(current);
        }
        let previous = self.global_period_weight(period - 1);
        scale_by_time(
            current,
            previous,
            now,
            self.calendar.start_of(period),
            self.calendar.period_duration(),
        )
    }

    // === Rewards ===

    /// Accumulator value as of now, without mutating anything
    pub fn reward_per_weight(&self) -> Result<Scaled> {
        let mut accumulator = self.state.accumulator.clone();
        accumulator.advance(
            &self.calendar,
            &self.state.escrow,
            &self.state.global_period_weight,
            self.clock.now(),
        )?;
        Ok(accumulator.reward_per_weight)
    }

    /// Advance and persist the accumulator, pulling the escrow release into
    /// the ledger's balance
    pub fn update_reward_per_weight(&mut self, token: &dyn Transferable) -> Result<Scaled> {
        let now = self.clock.now();
        let calendar = self.calendar;

        atomically(&mut self.state, |state| {
            let release = state.escrow.record_release(now);
            state.advance(&calendar, now)?;
            if let Some(transfer) = release {
                token.transfer_batch(&[transfer])?;
            }
            Ok(state.accumulator.reward_per_weight)
        })
    }

    /// Rewards `pool` could claim right now
    pub fn earned(&self, pool: &Address) -> Result<Amount> {
        let record = self.record(pool)?;
        let mut accumulator = self.state.accumulator.clone();
        accumulator.advance(
            &self.calendar,
            &self.state.escrow,
            &self.state.global_period_weight,
            self.clock.now(),
        )?;
        accumulator.owed(&self.calendar, record, self.state.pool_period_weight.get(pool))
    }

    /// Pay `pool`'s rewards to its farm. Farm only; the pool must be eligible.
    ///
    /// Pulls the escrow release first. With nothing earned no transfer to the
    /// farm happens and the released tokens stay in the ledger.
    pub fn claim_latest_rewards(
        &mut self,
        caller: &Address,
        pool: &Address,
        token: &dyn Transferable,
    ) -> Result<Amount> {
        let now = self.clock.now();
        let calendar = self.calendar;
        let address = self.address;
        let pool = *pool;

        let paid = atomically(&mut self.state, |state| {
            let record = state
                .pools
                .get(&pool)
                .ok_or_else(|| WeirError::NotFound(format!("pool {pool}")))?;
            if *caller != record.farm {
                return Err(WeirError::unauthorized("claimLatestRewards", caller));
            }
            if !record.eligible {
                return Err(WeirError::PoolNotEligible(pool.to_string()));
            }
            let farm = record.farm;

            let mut transfers: Vec<Transfer> =
                state.escrow.record_release(now).into_iter().collect();
            state.advance(&calendar, now)?;
            state.settle(&calendar, &pool)?;

            let record = state
                .pools
                .get_mut(&pool)
                .ok_or_else(|| WeirError::NotFound(format!("pool {pool}")))?;
            let owed = std::mem::take(&mut record.pending_reward);
            if owed > 0 {
                transfers.push(Transfer::new(address, farm, owed));
            } else {
                debug!(pool = %pool, "nothing earned, no payout");
            }

            if !transfers.is_empty() {
                token.transfer_batch(&transfers)?;
            }
            Ok(owed)
        })?;

        if paid > 0 {
            info!(pool = %pool, farm = %caller, amount = paid, "claimed rewards");
        }
        Ok(paid)
    }

    // === Views ===

    fn record(&self, pool: &Address) -> Result<&PoolRecord> {
        self.state
            .pools
            .get(pool)
            .ok_or_else(|| WeirError::NotFound(format!("pool {pool}")))
    }

    pub fn pool(&self, pool: &Address) -> Option<&PoolRecord> {
        self.state.pools.get(pool)
    }

    pub fn registered_pools(&self) -> impl Iterator<Item = &Address> {
        self.state.pools.keys()
    }

    pub fn global_period_weight(&self, period: u64) -> u128 {
        self.state
            .global_period_weight
            .get(&period)
            .copied()
            .unwrap_or(0)
    }

    pub fn pool_period_weight(&self, pool: &Address, period: u64) -> u128 {
        self.state
            .pool_period_weight
            .get(pool)
            .and_then(|weights| weights.get(&period))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_weighted_apc(&self) -> u128 {
        self.state.performance.total_weighted_apc
    }

    pub fn total_duration(&self) -> u128 {
        self.state.performance.total_duration
    }

    pub fn global_average_apc(&self) -> u128 {
        self.state.performance.average_apc()
    }

    /// Time the accumulator was last persisted
    pub fn last_update_time(&self) -> Timestamp {
        self.state.accumulator.last_update_time
    }

    /// Tokens released during zero-weight time and not yet allocated
    pub fn deferred_rewards(&self) -> Amount {
        self.state.accumulator.deferred
    }

    pub fn escrow(&self) -> &Escrow {
        &self.state.escrow
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn pool_factory(&self) -> Address {
        self.pool_factory
    }

    pub fn calendar(&self) -> &PeriodCalendar {
        &self.calendar
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// APC of a record; an ordering anomaly counts as zero progress
fn apc_or_zero(pool: &Address, record: &PoolRecord) -> Result<u128> {
    match performance::average_price_change(
        record.latest_price,
        record.latest_period_index,
        record.previous_price,
        record.previous_period_index,
    ) {
        Ok(apc) => Ok(apc),
        Err(e) if !e.is_fatal() => {
            warn!(pool = %pool, error = %e, "treating as zero progress");
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::emission::EmissionSchedule;
    use weir_core::{ManualClock, Mintable, TokenBank};

    const C: i64 = DEFAULT_CYCLE_DURATION_SECS;
    const P: i64 = DEFAULT_PERIOD_DURATION_SECS;
    const G: i64 = 1_700_000_000;

    struct Fixture {
        ledger: WeightLedger<ManualClock>,
        clock: ManualClock,
        token: TokenBank,
        factory: Address,
    }

    fn fixture_with_funding(funding: Amount) -> Fixture {
        let clock = ManualClock::new(G);
        let token = TokenBank::new();
        let factory = Address::from_label("factory");
        let ledger_addr = Address::from_label("ledger");
        let escrow_addr = Address::from_label("escrow");

        let schedule = EmissionSchedule::new(4 * C as u128, C, G).unwrap();
        let escrow = Escrow::new(escrow_addr, ledger_addr, schedule, 8 * C as u128);
        token.mint(escrow_addr, funding).unwrap();

        let config = LedgerConfig {
            period_duration_secs: P,
            min_capital: 10_000 * ONE_TOKEN,
            min_investors: 10,
        };
        let ledger = WeightLedger::new(ledger_addr, factory, escrow, &config, clock.clone()).unwrap();
        Fixture {
            ledger,
            clock,
            token,
            factory,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_funding(8 * C as u128)
    }

    fn pool(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn farm(n: u64) -> Address {
        Address::from_low_u64(1000 + n)
    }

    fn tokens(n: u128) -> u128 {
        n * ONE_TOKEN
    }

    fn milli(n: u128) -> u128 {
        n * ONE_TOKEN / 1000
    }

    impl Fixture {
        fn register(&mut self, n: u64, seed_price: u128) {
            let factory = self.factory;
            self.ledger
                .register_pool(&factory, pool(n), farm(n), seed_price)
                .unwrap();
        }

        fn make_eligible(&mut self, n: u64) {
            assert!(self
                .ledger
                .mark_pool_as_eligible(&pool(n), tokens(10_000), 20)
                .unwrap());
        }
    }

    #[test]
    fn test_register_pool() {
        let mut f = fixture();
        let err = f
            .ledger
            .register_pool(&pool(9), pool(1), farm(1), 1000)
            .unwrap_err();
        assert_eq!(err.code(), 1001);

        f.register(1, 1000);
        let record = f.ledger.pool(&pool(1)).unwrap();
        assert!(record.registered);
        assert!(!record.eligible);
        assert_eq!(record.farm, farm(1));

        let factory = f.factory;
        let err = f
            .ledger
            .register_pool(&factory, pool(1), farm(1), 1000)
            .unwrap_err();
        assert!(matches!(err, WeirError::AlreadyExists(_)));

        f.register(2, 5000);
        assert_eq!(f.ledger.registered_pools().count(), 2);
        assert_ne!(f.ledger.pool(&pool(2)).unwrap().farm, farm(1));
    }

    #[test]
    fn test_mark_pool_as_eligible() {
        let mut f = fixture();
        assert!(f.ledger.mark_pool_as_eligible(&pool(1), tokens(10_000), 20).is_err());

        f.register(1, 1000);
        assert!(!f.ledger.mark_pool_as_eligible(&pool(1), 0, 20).unwrap());
        assert!(!f.ledger.mark_pool_as_eligible(&pool(1), tokens(10_000), 0).unwrap());
        assert!(f.ledger.mark_pool_as_eligible(&pool(1), tokens(10_000), 20).unwrap());

        // a failing check does not revoke
        assert!(f.ledger.mark_pool_as_eligible(&pool(1), 0, 0).unwrap());
        assert!(f.ledger.pool(&pool(1)).unwrap().eligible);
    }

    #[test]
    fn test_reevaluate_eligibility_can_revoke() {
        let mut f = fixture();
        f.register(1, 1000);
        f.make_eligible(1);

        let factory = f.factory;
        assert!(f.ledger.reevaluate_eligibility(&pool(1), &pool(1), 0, 0).is_err());
        assert!(!f.ledger.reevaluate_eligibility(&factory, &pool(1), 0, 0).unwrap());
        assert!(!f.ledger.pool(&pool(1)).unwrap().eligible);
        assert!(f
            .ledger
            .reevaluate_eligibility(&factory, &pool(1), tokens(20_000), 11)
            .unwrap());
    }

    #[test]
    fn test_period_arithmetic() {
        let f = fixture();
        assert!(f.ledger.period_index(G - ONE_WEEK_SECS).is_err());
        assert_eq!(f.ledger.period_index(G + 100).unwrap(), 0);
        assert_eq!(f.ledger.period_index(G + 1000 + 2 * ONE_WEEK_SECS).unwrap(), 1);

        assert!(f.ledger.start_of_period(-1).is_err());
        assert_eq!(f.ledger.start_of_period(0).unwrap(), G);
        assert_eq!(f.ledger.start_of_period(3).unwrap(), G + 3 * P);
    }

    #[test]
    fn test_first_update_in_period_zero() {
        let mut f = fixture();
        f.register(1, tokens(1));
        f.clock.set(G + 112);

        let weight = f
            .ledger
            .update_weight(&pool(1), &pool(1), tokens(10), milli(1200))
            .unwrap();

        assert_eq!(weight, tokens(10));
        assert_eq!(f.ledger.total_duration(), 112);
        assert_eq!(f.ledger.total_weighted_apc(), 22_400);
        assert_eq!(f.ledger.pool_period_weight(&pool(1), 0), tokens(10));
        assert_eq!(f.ledger.global_period_weight(0), tokens(10));
        assert_eq!(f.ledger.last_update_time(), G + 112);

        let record = f.ledger.pool(&pool(1)).unwrap();
        assert_eq!(record.pool_apc, 200);
        assert_eq!(record.unrealized_profit, tokens(10));
        assert_eq!(record.latest_price, milli(1200));
        assert_eq!(record.previous_price, tokens(1));
        assert_eq!(record.latest_period_index, 0);
        assert_eq!(record.previous_period_index, 0);
        assert_eq!(record.last_updated, G + 112);
    }

    #[test]
    fn test_repeated_updates_overwrite_period_weight() {
        let mut f = fixture();
        f.register(1, tokens(1));
        f.clock.set(G + 112);
        f.ledger
            .update_weight(&pool(1), &pool(1), tokens(10), milli(1200))
            .unwrap();
        f.clock.set(G + 113);
        f.ledger
            .update_weight(&farm(1), &pool(1), tokens(20), milli(1300))
            .unwrap();

        assert_eq!(f.ledger.total_duration(), 113);
        assert_eq!(f.ledger.total_weighted_apc(), 33_900);
        assert_eq!(f.ledger.pool_period_weight(&pool(1), 0), tokens(20));
        assert_eq!(f.ledger.global_period_weight(0), tokens(20));

        let record = f.ledger.pool(&pool(1)).unwrap();
        assert_eq!(record.pool_apc, 300);
        assert_eq!(record.previous_price, tokens(1));
        assert_eq!(record.previous_period_index, 0);
    }

    #[test]
    fn test_update_weight_against_other_pools() {
        let mut f = fixture();
        f.register(1, tokens(1));
        f.register(2, 1000);

        // pool 2 contributes APC 100 over 100s
        f.clock.set(G + 100);
        f.ledger
            .update_weight(&pool(2), &pool(2), tokens(10), 1100)
            .unwrap();
        assert_eq!(f.ledger.total_weighted_apc(), 10_000);
        assert_eq!(f.ledger.total_duration(), 100);
        assert_eq!(f.ledger.global_period_weight(0), tokens(10));

        f.clock.set(G + 112);
        f.ledger
            .update_weight(&pool(1), &pool(1), tokens(10), milli(1200))
            .unwrap();
        f.clock.set(G + 114);
        let weight = f
            .ledger
            .update_weight(&pool(1), &pool(1), tokens(20), milli(1300))
            .unwrap();

        assert_eq!(f.ledger.total_weighted_apc(), 44_200);
        assert_eq!(f.ledger.total_duration(), 214);
        assert_eq!(f.ledger.global_average_apc(), 206);
        assert_eq!(weight, tokens(180));
        assert_eq!(f.ledger.global_period_weight(0), tokens(190));
    }

    #[test]
    fn test_new_period_shifts_previous_price() {
        let mut f = fixture();
        f.register(1, 1000);
        f.clock.set(G + 2 * P + 5);
        f.ledger.update_weight(&pool(1), &pool(1), 10, 1200).unwrap();

        let record = f.ledger.pool(&pool(1)).unwrap();
        assert_eq!(record.previous_price, 1000);
        assert_eq!(record.previous_period_index, 0);
        assert_eq!(record.latest_period_index, 2);
        // 20% over two periods
        assert_eq!(record.pool_apc, 100);
        assert_eq!(f.ledger.average_price_change(&pool(1)).unwrap(), 100);
    }

    #[test]
    fn test_update_weight_authorization() {
        let mut f = fixture();
        f.register(1, 1000);
        f.clock.set(G + 10);
        let err = f
            .ledger
            .update_weight(&pool(7), &pool(1), 10, 1000)
            .unwrap_err();
        assert_eq!(err.code(), 1001);
        assert!(f.ledger.update_weight(&pool(3), &pool(3), 10, 1000).is_err());
    }

    #[test]
    fn test_update_weight_before_genesis_rejected() {
        let mut f = fixture();
        f.clock.set(G - 10);
        f.register(1, 1000);
        let err = f.ledger.update_weight(&pool(1), &pool(1), 10, 1000).unwrap_err();
        assert!(matches!(err, WeirError::InvalidArgument(_)));
        assert_eq!(f.ledger.total_duration(), 0);
    }

    #[test]
    fn test_single_pool_earns_all_emission_including_deferred() {
        let mut f = fixture();
        f.register(1, 1000);

        // no weight yet: the first 100s are deferred
        f.clock.set(G + 100);
        f.ledger.update_weight(&pool(1), &pool(1), 10, 1000).unwrap();
        assert_eq!(f.ledger.deferred_rewards(), 400);
        assert_eq!(f.ledger.global_period_weight(0), 10);

        f.clock.set(G + P);
        assert_eq!(f.ledger.earned(&pool(1)).unwrap(), 4 * P as u128);

        // nobody updates in period 1, its release is deferred
        f.clock.set(G + 2 * P + 50);
        f.ledger.update_weight(&pool(1), &pool(1), 10, 1000).unwrap();
        assert_eq!(f.ledger.deferred_rewards(), 4 * P as u128 + 200);

        f.clock.set(G + 3 * P);
        let schedule = f.ledger.escrow().schedule().clone();
        assert_eq!(
            f.ledger.earned(&pool(1)).unwrap(),
            schedule.available_rewards(G + 3 * P)
        );
    }

    #[test]
    fn test_two_pools_split_by_weight() {
        let mut f = fixture();
        f.register(1, 1000);
        f.register(2, 1000);
        f.clock.set(G + 10);
        f.ledger.update_weight(&pool(1), &pool(1), 30, 1000).unwrap();
        f.ledger.update_weight(&pool(2), &pool(2), 10, 1000).unwrap();
        assert_eq!(f.ledger.global_period_weight(0), 40);

        f.clock.set(G + 1010);
        // 40 deferred + 4000 released, split 3:1
        assert_eq!(f.ledger.earned(&pool(1)).unwrap(), 3030);
        assert_eq!(f.ledger.earned(&pool(2)).unwrap(), 1010);
    }

    #[test]
    fn test_weight_change_is_not_retroactive() {
        let mut f = fixture();
        f.register(1, 1000);
        f.register(2, 1000);
        f.clock.set(G + 10);
        f.ledger.update_weight(&pool(1), &pool(1), 10, 1000).unwrap();
        f.ledger.update_weight(&pool(2), &pool(2), 10, 1000).unwrap();

        f.clock.set(G + 110);
        assert_eq!(f.ledger.earned(&pool(1)).unwrap(), 220);

        // pool 1 triples its weight; its past accrual is kept as is
        f.ledger.update_weight(&pool(1), &pool(1), 30, 1000).unwrap();
        assert_eq!(f.ledger.pool(&pool(1)).unwrap().pending_reward, 220);

        f.clock.set(G + 210);
        assert_eq!(f.ledger.earned(&pool(1)).unwrap(), 220 + 300);
        assert_eq!(f.ledger.earned(&pool(2)).unwrap(), 220 + 100);
    }

    #[test]
    fn test_claim_pays_farm() {
        let mut f = fixture();
        f.register(1, 1000);
        f.clock.set(G + 100);
        f.ledger.update_weight(&pool(1), &pool(1), 10, 1000).unwrap();

        f.clock.set(G + P);
        let err = f
            .ledger
            .claim_latest_rewards(&farm(1), &pool(1), &f.token)
            .unwrap_err();
        assert!(matches!(err, WeirError::PoolNotEligible(_)));

        f.make_eligible(1);
        let err = f
            .ledger
            .claim_latest_rewards(&pool(1), &pool(1), &f.token)
            .unwrap_err();
        assert_eq!(err.code(), 1001);

        let paid = f
            .ledger
            .claim_latest_rewards(&farm(1), &pool(1), &f.token)
            .unwrap();
        assert_eq!(paid, 4 * P as u128);
        assert_eq!(f.token.balance_of(&farm(1)), 4 * P as u128);
        assert_eq!(f.ledger.escrow().distributed_rewards(), 4 * P as u128);
        assert_eq!(f.token.balance_of(&f.ledger.address()), 0);

        let record = f.ledger.pool(&pool(1)).unwrap();
        assert_eq!(record.pending_reward, 0);
        assert_eq!(record.reward_per_weight_paid, f.ledger.reward_per_weight().unwrap());

        // nothing new at the same instant
        assert_eq!(
            f.ledger
                .claim_latest_rewards(&farm(1), &pool(1), &f.token)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_claim_without_weight_parks_release() {
        let mut f = fixture();
        f.register(1, 1000);
        f.make_eligible(1);

        f.clock.set(G + 500);
        let paid = f
            .ledger
            .claim_latest_rewards(&farm(1), &pool(1), &f.token)
            .unwrap();
        assert_eq!(paid, 0);
        assert_eq!(f.token.balance_of(&farm(1)), 0);
        assert_eq!(f.token.balance_of(&f.ledger.address()), 2000);
        assert_eq!(f.ledger.deferred_rewards(), 2000);
    }

    #[test]
    fn test_failed_claim_rolls_back() {
        let mut f = fixture_with_funding(100);
        f.register(1, 1000);
        f.make_eligible(1);
        f.clock.set(G + 100);
        f.ledger.update_weight(&pool(1), &pool(1), 10, 1000).unwrap();

        f.clock.set(G + 200);
        let before_time = f.ledger.last_update_time();
        let err = f
            .ledger
            .claim_latest_rewards(&farm(1), &pool(1), &f.token)
            .unwrap_err();
        assert!(matches!(err, WeirError::InsufficientBalance { .. }));

        assert_eq!(f.ledger.escrow().distributed_rewards(), 0);
        assert_eq!(f.ledger.last_update_time(), before_time);
        assert_eq!(f.ledger.earned(&pool(1)).unwrap(), 800);
        assert_eq!(f.token.balance_of(&farm(1)), 0);
    }

    #[test]
    fn test_reward_per_weight_is_granularity_insensitive() {
        let mut stepped = fixture();
        let mut single = fixture();
        for f in [&mut stepped, &mut single] {
            f.register(1, 1000);
            f.clock.set(G + 7);
            f.ledger.update_weight(&pool(1), &pool(1), 3, 1000).unwrap();
        }

        for t in [G + 11, G + P - 1, G + P, G + P + 13, G + 2 * P + 1] {
            stepped.clock.set(t);
            stepped.ledger.update_reward_per_weight(&stepped.token).unwrap();
        }
        single.clock.set(G + 2 * P + 1);

        assert_eq!(
            stepped.ledger.reward_per_weight().unwrap(),
            single.ledger.reward_per_weight().unwrap()
        );
        assert_eq!(
            stepped.ledger.earned(&pool(1)).unwrap(),
            single.ledger.earned(&pool(1)).unwrap()
        );
        single.ledger.update_reward_per_weight(&single.token).unwrap();
        assert_eq!(stepped.ledger.deferred_rewards(), single.ledger.deferred_rewards());
    }

    #[test]
    fn test_effective_global_weight() {
        let mut f = fixture();
        f.register(1, 1000);
        f.clock.set(G + 10);
        f.ledger.update_weight(&pool(1), &pool(1), 1000, 1000).unwrap();
        assert_eq!(f.ledger.effective_global_weight().unwrap(), 1000);

        f.clock.set(G + P + P / 2);
        f.ledger.update_weight(&pool(1), &pool(1), 3000, 1000).unwrap();
        // halfway from 1000 towards 3000
        assert_eq!(f.ledger.effective_global_weight().unwrap(), 2000);
    }
}
