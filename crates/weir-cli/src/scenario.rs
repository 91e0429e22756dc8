//! Scenario replay against an in-memory system.
//!
//! A scenario is a TOML file with an optional `[economics]` table (the same
//! layout as a configuration file), the stakers to fund, and a list of timed
//! steps. Step times are seconds after genesis.
//!
//! ```toml
//! [[stakers]]
//! name = "alice"
//!
//! [[steps]]
//! at = 0
//! action = "register"
//! pool = "alpha"
//! seed_price = 1000
//!
//! [[steps]]
//! at = 100
//! action = "update-weight"
//! pool = "alpha"
//! profit = 10
//! price = 1100
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weir_core::prelude::*;
use weir_core::serde_amount;
use weir_economics::{EconomicsConfig, EmissionSchedule, Escrow, PoolDistributor, WeightLedger};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub economics: EconomicsConfig,
    #[serde(default)]
    pub stakers: Vec<StakerSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let scenario: Self = toml::from_str(raw).context("parsing scenario")?;
        scenario.economics.validate()?;
        Ok(scenario)
    }
}

/// A staker funded with `units` of every configured class
#[derive(Debug, Deserialize)]
pub struct StakerSpec {
    pub name: String,
    #[serde(default = "default_units", with = "serde_amount")]
    pub units: Amount,
}

fn default_units() -> Amount {
    1_000
}

#[derive(Debug, Deserialize)]
pub struct Step {
    /// Seconds after genesis
    pub at: i64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    Register {
        pool: String,
        #[serde(with = "serde_amount")]
        seed_price: u128,
    },
    Eligible {
        pool: String,
        #[serde(with = "serde_amount")]
        capital: Amount,
        investors: u64,
    },
    UpdateWeight {
        pool: String,
        #[serde(with = "serde_amount")]
        profit: Amount,
        #[serde(with = "serde_amount")]
        price: u128,
    },
    Stake {
        staker: String,
        pool: String,
        class: TokenClass,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    Withdraw {
        staker: String,
        pool: String,
        class: TokenClass,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    Harvest {
        pool: String,
    },
    Claim {
        staker: String,
        pool: String,
    },
    Exit {
        staker: String,
        pool: String,
    },
}

/// Escrow, ledger and one distributor per pool over in-memory tokens
pub struct Simulation {
    clock: ManualClock,
    rewards: TokenBank,
    stakes: ClassTokenBank,
    ledger: WeightLedger<ManualClock>,
    distributors: BTreeMap<String, PoolDistributor>,
    stakers: BTreeMap<String, Address>,
    factory: Address,
    escrow: Address,
    config: EconomicsConfig,
}

impl Simulation {
    pub fn new(config: EconomicsConfig, stakers: &[StakerSpec]) -> anyhow::Result<Self> {
        let genesis = config.schedule.genesis_time;
        let clock = ManualClock::new(genesis);
        let rewards = TokenBank::new();
        let stakes = ClassTokenBank::new();
        let factory = Address::from_label("pool-factory");
        let ledger_addr = Address::from_label("weight-ledger");
        let escrow_addr = Address::from_label("escrow");

        let schedule = EmissionSchedule::from_config(&config.schedule)?;
        let escrow = Escrow::new(escrow_addr, ledger_addr, schedule, config.lifetime_allocation());
        rewards.mint(escrow_addr, config.lifetime_allocation())?;

        let ledger = WeightLedger::new(ledger_addr, factory, escrow, &config.ledger, clock.clone())?;

        let mut funded = BTreeMap::new();
        for staker in stakers {
            let address = Address::from_label(&format!("staker:{}", staker.name));
            for class in config.distributor.weights_by_class().keys() {
                stakes.mint(address, *class, staker.units)?;
            }
            funded.insert(staker.name.clone(), address);
        }

        Ok(Self {
            clock,
            rewards,
            stakes,
            ledger,
            distributors: BTreeMap::new(),
            stakers: funded,
            factory,
            escrow: escrow_addr,
            config,
        })
    }

    pub fn run(&mut self, steps: &[Step]) -> anyhow::Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.apply(step)
                .with_context(|| format!("step {} at +{}s ({:?})", i + 1, step.at, step.action))?;
        }
        Ok(())
    }

    fn pool_address(name: &str) -> Address {
        Address::from_label(&format!("pool:{name}"))
    }

    fn staker(&self, name: &str) -> anyhow::Result<Address> {
        match self.stakers.get(name) {
            Some(address) => Ok(*address),
            None => bail!("unknown staker {name:?}"),
        }
    }

    pub fn apply(&mut self, step: &Step) -> anyhow::Result<()> {
        let now = self.config.schedule.genesis_time + step.at;
        if now < self.clock.now() {
            bail!("steps must be in time order");
        }
        self.clock.set(now);
        debug!(at = step.at, action = ?step.action, "applying step");

        match &step.action {
            Action::Register { pool, seed_price } => {
                if self.distributors.contains_key(pool) {
                    bail!("pool {pool:?} registered twice");
                }
                let address = Self::pool_address(pool);
                let distributor = PoolDistributor::new(
                    Address::from_label(&format!("distributor:{pool}")),
                    address,
                    self.ledger.address(),
                    self.escrow,
                    &self.config.distributor,
                )?;
                let factory = self.factory;
                self.ledger
                    .register_pool(&factory, address, distributor.address(), *seed_price)?;
                self.distributors.insert(pool.clone(), distributor);
            }
            Action::Eligible {
                pool,
                capital,
                investors,
            } => {
                let eligible = self.ledger.mark_pool_as_eligible(
                    &Self::pool_address(pool),
                    *capital,
                    *investors,
                )?;
                info!(pool = %pool, eligible, "eligibility check");
            }
            Action::UpdateWeight {
                pool,
                profit,
                price,
            } => {
                let address = Self::pool_address(pool);
                self.ledger.update_weight(&address, &address, *profit, *price)?;
            }
            Action::Stake {
                staker,
                pool,
                class,
                amount,
            } => {
                let who = self.staker(staker)?;
                let stakes = &self.stakes;
                match self.distributors.get_mut(pool) {
                    Some(d) => d.stake(&who, *class, *amount, stakes)?,
                    None => bail!("unknown pool {pool:?}"),
                }
            }
            Action::Withdraw {
                staker,
                pool,
                class,
                amount,
            } => {
                let who = self.staker(staker)?;
                let stakes = &self.stakes;
                match self.distributors.get_mut(pool) {
                    Some(d) => d.withdraw(&who, *class, *amount, stakes)?,
                    None => bail!("unknown pool {pool:?}"),
                }
            }
            Action::Harvest { pool } => {
                let distributor = match self.distributors.get_mut(pool) {
                    Some(d) => d,
                    None => bail!("unknown pool {pool:?}"),
                };
                distributor.harvest(&mut self.ledger, &self.rewards)?;
            }
            Action::Claim { staker, pool } => {
                let who = self.staker(staker)?;
                let rewards = &self.rewards;
                match self.distributors.get_mut(pool) {
                    Some(d) => d.get_reward(&who, rewards)?,
                    None => bail!("unknown pool {pool:?}"),
                };
            }
            Action::Exit { staker, pool } => {
                let who = self.staker(staker)?;
                let (stakes, rewards) = (&self.stakes, &self.rewards);
                match self.distributors.get_mut(pool) {
                    Some(d) => d.exit(&who, stakes, rewards)?,
                    None => bail!("unknown pool {pool:?}"),
                };
            }
        }
        Ok(())
    }

    pub fn report(&self) -> anyhow::Result<Report> {
        let escrow = self.ledger.escrow();
        let mut pools = Vec::with_capacity(self.distributors.len());
        for (name, distributor) in &self.distributors {
            let address = distributor.pool();
            let record = self
                .ledger
                .pool(&address)
                .with_context(|| format!("pool {name:?} missing from ledger"))?;
            pools.push(PoolReport {
                name: name.clone(),
                eligible: record.eligible,
                weight: self.ledger.pool_period_weight(&address, record.latest_period_index),
                apc: record.pool_apc,
                earned: self.ledger.earned(&address)?,
                distributor_balance: self.rewards.balance_of(&distributor.address()),
                total_available_rewards: distributor.total_available_rewards(),
                weighted_total_supply: distributor.weighted_total_supply(),
            });
        }

        let mut stakers = Vec::with_capacity(self.stakers.len());
        for (name, address) in &self.stakers {
            let mut earned: Amount = 0;
            for distributor in self.distributors.values() {
                earned += distributor.earned(address)?;
            }
            stakers.push(StakerReport {
                name: name.clone(),
                reward_balance: self.rewards.balance_of(address),
                earned,
            });
        }

        Ok(Report {
            time: self.clock.now(),
            escrow_distributed: escrow.distributed_rewards(),
            escrow_remaining: escrow.remaining_rewards(),
            upstream_balance: self.rewards.balance_of(&self.escrow),
            ledger_balance: self.rewards.balance_of(&self.ledger.address()),
            deferred_rewards: self.ledger.deferred_rewards(),
            global_average_apc: self.ledger.global_average_apc(),
            pools,
            stakers,
        })
    }
}

/// Final balances, printed as JSON
#[derive(Debug, Serialize)]
pub struct Report {
    pub time: Timestamp,
    #[serde(with = "serde_amount")]
    pub escrow_distributed: Amount,
    #[serde(with = "serde_amount")]
    pub escrow_remaining: Amount,
    #[serde(with = "serde_amount")]
    pub upstream_balance: Amount,
    #[serde(with = "serde_amount")]
    pub ledger_balance: Amount,
    #[serde(with = "serde_amount")]
    pub deferred_rewards: Amount,
    pub global_average_apc: u128,
    pub pools: Vec<PoolReport>,
    pub stakers: Vec<StakerReport>,
}

#[derive(Debug, Serialize)]
pub struct PoolReport {
    pub name: String,
    pub eligible: bool,
    #[serde(with = "serde_amount")]
    pub weight: u128,
    pub apc: u128,
    #[serde(with = "serde_amount")]
    pub earned: Amount,
    #[serde(with = "serde_amount")]
    pub distributor_balance: Amount,
    #[serde(with = "serde_amount")]
    pub total_available_rewards: Amount,
    #[serde(with = "serde_amount")]
    pub weighted_total_supply: u128,
}

#[derive(Debug, Serialize)]
pub struct StakerReport {
    pub name: String,
    #[serde(with = "serde_amount")]
    pub reward_balance: Amount,
    #[serde(with = "serde_amount")]
    pub earned: Amount,
}
