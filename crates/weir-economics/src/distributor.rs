//! # Pool Distributor
//!
//! Splits one pool's rewards across its stakers. Stakers lock units of
//! several token classes; each class has a weight coefficient and a staker's
//! share is proportional to `Σ balance(class) * weight(class)`.
//!
//! Rewards are pushed in by the owner (the weight ledger, usually through
//! [`PoolDistributor::harvest`]) and accounted with a reward-per-token
//! accumulator at `reward_scale`. Rewards added while nothing is staked are
//! forwarded upstream instead of being stranded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weir_core::tx::atomically;
use weir_core::{
    Address, Amount, ClassTransfer, Clock, MultiTransferable, Owned, Result, Scaled, TokenClass,
    Transfer, Transferable, WeirError,
};

use crate::config::DistributorConfig;
use crate::ledger::WeightLedger;

/// One staker's position
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerAccount {
    pub balances: BTreeMap<TokenClass, Amount>,
    pub weighted_balance: u128,
    pub reward_per_token_paid: Scaled,
    /// Settled, unclaimed rewards
    pub rewards: Amount,
}

/// Class weights and accumulator scale; fixed at construction
#[derive(Clone, Debug)]
struct StakeTerms {
    class_weights: BTreeMap<TokenClass, u128>,
    reward_scale: u128,
}

impl StakeTerms {
    fn weight_of(&self, class: TokenClass) -> Result<u128> {
        self.class_weights
            .get(&class)
            .copied()
            .ok_or_else(|| WeirError::NotFound(format!("token {class}")))
    }
}

#[derive(Clone, Debug, Default)]
struct DistributorState {
    stakers: BTreeMap<Address, StakerAccount>,
    supply_by_class: BTreeMap<TokenClass, Amount>,
    weighted_total_supply: u128,
    reward_per_token: Scaled,
    /// Cumulative rewards accepted; payouts do not reduce it
    total_available: Amount,
}

impl DistributorState {
    /// Fold accrual into `rewards`, opening the account on first stake
    fn settle(&mut self, terms: &StakeTerms, staker: &Address) -> Result<&mut StakerAccount> {
        let reward_per_token = self.reward_per_token;
        let account = self.stakers.entry(*staker).or_default();
        settle_account(account, reward_per_token, terms)?;
        Ok(account)
    }

    fn credit(
        &mut self,
        terms: &StakeTerms,
        staker: &Address,
        class: TokenClass,
        amount: Amount,
    ) -> Result<()> {
        let weighted = amount
            .checked_mul(terms.weight_of(class)?)
            .ok_or(WeirError::ArithmeticOverflow("weighted stake"))?;

        let account = self.settle(terms, staker)?;
        let balance = account.balances.entry(class).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(WeirError::ArithmeticOverflow("stake balance"))?;
        account.weighted_balance = account
            .weighted_balance
            .checked_add(weighted)
            .ok_or(WeirError::ArithmeticOverflow("weighted balance"))?;

        let supply = self.supply_by_class.entry(class).or_insert(0);
        *supply = supply
            .checked_add(amount)
            .ok_or(WeirError::ArithmeticOverflow("class supply"))?;
        self.weighted_total_supply = self
            .weighted_total_supply
            .checked_add(weighted)
            .ok_or(WeirError::ArithmeticOverflow("weighted supply"))?;
        Ok(())
    }

    fn debit(
        &mut self,
        terms: &StakeTerms,
        staker: &Address,
        class: TokenClass,
        amount: Amount,
    ) -> Result<()> {
        let weighted = amount
            .checked_mul(terms.weight_of(class)?)
            .ok_or(WeirError::ArithmeticOverflow("weighted stake"))?;

        let account = self.settle(terms, staker)?;
        let balance = account.balances.entry(class).or_insert(0);
        if *balance < amount {
            return Err(WeirError::InsufficientBalance {
                required: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        if *balance == 0 {
            account.balances.remove(&class);
        }
        account.weighted_balance -= weighted;

        if let Some(supply) = self.supply_by_class.get_mut(&class) {
            *supply -= amount;
        }
        self.weighted_total_supply -= weighted;
        Ok(())
    }

    /// Zero for an address that never staked; no account is opened
    fn take_reward(&mut self, terms: &StakeTerms, staker: &Address) -> Result<Amount> {
        let reward_per_token = self.reward_per_token;
        let Some(account) = self.stakers.get_mut(staker) else {
            return Ok(0);
        };
        settle_account(account, reward_per_token, terms)?;
        Ok(std::mem::take(&mut account.rewards))
    }
}

/// Fold accrual into `rewards` using the current weighted balance
fn settle_account(
    account: &mut StakerAccount,
    reward_per_token: Scaled,
    terms: &StakeTerms,
) -> Result<()> {
    let accrued = (reward_per_token - account.reward_per_token_paid)
        .apply(account.weighted_balance, terms.reward_scale)?;
    account.rewards = account
        .rewards
        .checked_add(accrued)
        .ok_or(WeirError::ArithmeticOverflow("staker rewards"))?;
    account.reward_per_token_paid = reward_per_token;
    Ok(())
}

/// Per-pool staking and reward distribution
pub struct PoolDistributor {
    /// Account holding staked units and undistributed rewards
    address: Address,
    pool: Address,
    /// Only caller allowed to add rewards
    owner: Address,
    /// Receiver of rewards added while nothing is staked
    upstream: Address,
    terms: StakeTerms,
    state: DistributorState,
}

impl Owned for PoolDistributor {
    fn owner(&self) -> Address {
        self.owner
    }
}

impl PoolDistributor {
    pub fn new(
        address: Address,
        pool: Address,
        owner: Address,
        upstream: Address,
        config: &DistributorConfig,
    ) -> Result<Self> {
        let class_weights = config.weights_by_class();
        if class_weights.is_empty() || class_weights.values().any(|w| *w == 0) {
            return Err(WeirError::InvalidArgument(
                "distributor needs at least one class, all with non-zero weight".into(),
            ));
        }
        if config.reward_scale == 0 {
            return Err(WeirError::InvalidArgument("reward scale must be non-zero".into()));
        }

        Ok(Self {
            address,
            pool,
            owner,
            upstream,
            terms: StakeTerms {
                class_weights,
                reward_scale: config.reward_scale,
            },
            state: DistributorState::default(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn pool(&self) -> Address {
        self.pool
    }

    pub fn upstream(&self) -> Address {
        self.upstream
    }

    pub fn class_weight(&self, class: TokenClass) -> Option<u128> {
        self.terms.class_weights.get(&class).copied()
    }

    pub fn reward_scale(&self) -> u128 {
        self.terms.reward_scale
    }

    /// Lock `amount` units of `class` from `caller`
    pub fn stake(
        &mut self,
        caller: &Address,
        class: TokenClass,
        amount: Amount,
        staking_token: &dyn MultiTransferable,
    ) -> Result<()> {
        if amount == 0 {
            return Err(WeirError::InvalidArgument("cannot stake 0".into()));
        }
        let terms = &self.terms;
        let address = self.address;

        atomically(&mut self.state, |state| {
            state.credit(terms, caller, class, amount)?;
            staking_token.transfer_batch(&[ClassTransfer {
                from: *caller,
                to: address,
                class,
                amount,
            }])
        })?;

        debug!(staker = %caller, %class, amount, "staked");
        Ok(())
    }

    /// Return `amount` units of `class` to `caller`
    pub fn withdraw(
        &mut self,
        caller: &Address,
        class: TokenClass,
        amount: Amount,
        staking_token: &dyn MultiTransferable,
    ) -> Result<()> {
        if amount == 0 {
            return Err(WeirError::InvalidArgument("cannot withdraw 0".into()));
        }
        let terms = &self.terms;
        let address = self.address;

        atomically(&mut self.state, |state| {
            state.debit(terms, caller, class, amount)?;
            staking_token.transfer_batch(&[ClassTransfer {
                from: address,
                to: *caller,
                class,
                amount,
            }])
        })?;

        debug!(staker = %caller, %class, amount, "withdrew");
        Ok(())
    }

    /// Pay out `caller`'s settled rewards
    pub fn get_reward(&mut self, caller: &Address, reward_token: &dyn Transferable) -> Result<Amount> {
        let terms = &self.terms;
        let address = self.address;

        let reward = atomically(&mut self.state, |state| {
            let reward = state.take_reward(terms, caller)?;
            if reward > 0 {
                reward_token.transfer(address, *caller, reward)?;
            }
            Ok(reward)
        })?;

        if reward > 0 {
            info!(staker = %caller, amount = reward, "reward paid");
        }
        Ok(reward)
    }

    /// Withdraw every class and collect rewards in one step.
    ///
    /// Fails up front, changing nothing, if the distributor cannot cover the
    /// caller's rewards.
    pub fn exit(
        &mut self,
        caller: &Address,
        staking_token: &dyn MultiTransferable,
        reward_token: &dyn Transferable,
    ) -> Result<Amount> {
        let owed = self.earned(caller)?;
        let available = reward_token.balance_of(&self.address);
        if available < owed {
            return Err(WeirError::InsufficientBalance {
                required: owed,
                available,
            });
        }

        let terms = &self.terms;
        let address = self.address;
        let reward = atomically(&mut self.state, |state| {
            let positions: Vec<(TokenClass, Amount)> = state
                .stakers
                .get(caller)
                .map(|account| account.balances.iter().map(|(c, a)| (*c, *a)).collect())
                .unwrap_or_default();

            let mut returned = Vec::with_capacity(positions.len());
            for (class, amount) in positions {
                state.debit(terms, caller, class, amount)?;
                returned.push(ClassTransfer {
                    from: address,
                    to: *caller,
                    class,
                    amount,
                });
            }
            staking_token.transfer_batch(&returned)?;

            let reward = state.take_reward(terms, caller)?;
            if reward > 0 {
                reward_token.transfer_batch(&[Transfer::new(address, *caller, reward)])?;
            }
            Ok(reward)
        })?;

        info!(staker = %caller, reward, "exited");
        Ok(reward)
    }

    /// Accept `amount` reward tokens already sent to this distributor.
    /// Owner only. With nothing staked the tokens are forwarded upstream.
    pub fn add_reward(
        &mut self,
        caller: &Address,
        amount: Amount,
        reward_token: &dyn Transferable,
    ) -> Result<()> {
        self.ensure_owner(caller, "addReward")?;
        if amount == 0 {
            return Ok(());
        }

        if self.state.weighted_total_supply == 0 {
            reward_token.transfer(self.address, self.upstream, amount)?;
            info!(pool = %self.pool, amount, upstream = %self.upstream, "no stake, reward forwarded");
            return Ok(());
        }

        let terms = &self.terms;
        atomically(&mut self.state, |state| {
            let increment =
                Scaled::per_weight(amount, state.weighted_total_supply, terms.reward_scale)?;
            state.reward_per_token = state.reward_per_token.checked_add(increment)?;
            state.total_available = state
                .total_available
                .checked_add(amount)
                .ok_or(WeirError::ArithmeticOverflow("total available rewards"))?;
            Ok(())
        })?;

        info!(
            pool = %self.pool,
            amount,
            reward_per_token = %self.state.reward_per_token,
            "reward added"
        );
        Ok(())
    }

    /// Claim this pool's rewards from the ledger and distribute them.
    ///
    /// The distributor must be registered as the pool's farm and be owned by
    /// the ledger. Ownership is checked before the claim so a rejected harvest
    /// leaves the ledger's pending reward in place.
    pub fn harvest<C: Clock>(
        &mut self,
        ledger: &mut WeightLedger<C>,
        reward_token: &dyn Transferable,
    ) -> Result<Amount> {
        self.ensure_owner(&ledger.address(), "addReward")?;
        let address = self.address;
        let pool = self.pool;
        let claimed = ledger.claim_latest_rewards(&address, &pool, reward_token)?;
        self.add_reward(&ledger.address(), claimed, reward_token)?;
        Ok(claimed)
    }

    // === Views ===

    /// Unweighted units staked across all classes
    pub fn total_supply(&self) -> Amount {
        self.state.supply_by_class.values().sum()
    }

    pub fn supply_of(&self, class: TokenClass) -> Amount {
        self.state.supply_by_class.get(&class).copied().unwrap_or(0)
    }

    pub fn weighted_total_supply(&self) -> u128 {
        self.state.weighted_total_supply
    }

    pub fn account(&self, staker: &Address) -> Option<&StakerAccount> {
        self.state.stakers.get(staker)
    }

    pub fn weighted_balance(&self, staker: &Address) -> u128 {
        self.account(staker).map_or(0, |a| a.weighted_balance)
    }

    pub fn balance_of(&self, staker: &Address, class: TokenClass) -> Amount {
        self.account(staker)
            .and_then(|a| a.balances.get(&class))
            .copied()
            .unwrap_or(0)
    }

    pub fn reward_per_token_stored(&self) -> Scaled {
        self.state.reward_per_token
    }

    pub fn user_reward_per_token_paid(&self, staker: &Address) -> Scaled {
        self.account(staker)
            .map_or(Scaled::ZERO, |a| a.reward_per_token_paid)
    }

    /// Settled rewards, not counting accrual since the last settlement
    pub fn rewards(&self, staker: &Address) -> Amount {
        self.account(staker).map_or(0, |a| a.rewards)
    }

    pub fn earned(&self, staker: &Address) -> Result<Amount> {
        let Some(account) = self.account(staker) else {
            return Ok(0);
        };
        let accrued = (self.state.reward_per_token - account.reward_per_token_paid)
            .apply(account.weighted_balance, self.terms.reward_scale)?;
        account
            .rewards
            .checked_add(accrued)
            .ok_or(WeirError::ArithmeticOverflow("earned"))
    }

    pub fn total_available_rewards(&self) -> Amount {
        self.state.total_available
    }
}
