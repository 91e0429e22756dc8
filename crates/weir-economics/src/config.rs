//! Economics configuration types

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use weir_core::{serde_amount, Amount, Result, Timestamp, TokenClass, WeirError};

use crate::constants::*;

/// Complete economics configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomicsConfig {
    /// Halving emission schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Release escrow
    #[serde(default)]
    pub escrow: EscrowConfig,

    /// Weight ledger periods and eligibility thresholds
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Per-pool distributor settings
    #[serde(default)]
    pub distributor: DistributorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EconomicsConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WeirError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| WeirError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| WeirError::Config(e.to_string()))
    }

    /// Lifetime allocation, defaulting to the full halving series
    pub fn lifetime_allocation(&self) -> Amount {
        self.escrow
            .lifetime_allocation
            .unwrap_or_else(|| self.schedule.tokens_per_cycle.saturating_mul(2))
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.cycle_duration_secs <= 0 {
            return Err(WeirError::Config("schedule.cycle_duration_secs must be positive".into()));
        }
        if self.ledger.period_duration_secs <= 0 {
            return Err(WeirError::Config("ledger.period_duration_secs must be positive".into()));
        }
        if self.distributor.class_weights.is_empty() {
            return Err(WeirError::Config("distributor.class_weights is empty".into()));
        }
        if let Some(cw) = self.distributor.class_weights.iter().find(|cw| cw.weight == 0) {
            return Err(WeirError::Config(format!(
                "distributor.class_weights: {} has zero weight",
                cw.class
            )));
        }
        let classes = self.distributor.weights_by_class();
        if classes.len() != self.distributor.class_weights.len() {
            return Err(WeirError::Config("distributor.class_weights: duplicate class".into()));
        }
        if self.distributor.reward_scale == 0 {
            return Err(WeirError::Config("distributor.reward_scale must be non-zero".into()));
        }
        Ok(())
    }
}

/// Emission schedule settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// First cycle's budget in smallest units
    #[serde(default = "default_tokens_per_cycle", with = "serde_amount")]
    pub tokens_per_cycle: Amount,

    /// Halving cycle length
    #[serde(default = "default_cycle_duration")]
    pub cycle_duration_secs: i64,

    /// Start of cycle 1 (unix seconds)
    #[serde(default = "default_genesis_time")]
    pub genesis_time: Timestamp,
}

fn default_tokens_per_cycle() -> Amount {
    5_000_000 * ONE_TOKEN
}

fn default_cycle_duration() -> i64 {
    DEFAULT_CYCLE_DURATION_SECS
}

fn default_genesis_time() -> Timestamp {
    chrono::Utc::now().timestamp()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tokens_per_cycle: default_tokens_per_cycle(),
            cycle_duration_secs: default_cycle_duration(),
            genesis_time: default_genesis_time(),
        }
    }
}

/// Escrow settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Total tokens ever releasable; twice the first cycle when unset
    #[serde(default, with = "serde_amount::option", skip_serializing_if = "Option::is_none")]
    pub lifetime_allocation: Option<Amount>,
}

/// Weight ledger settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Period length
    #[serde(default = "default_period_duration")]
    pub period_duration_secs: i64,

    /// Capital a pool needs to become eligible
    #[serde(default = "default_min_capital", with = "serde_amount")]
    pub min_capital: Amount,

    /// Investors a pool needs to become eligible
    #[serde(default = "default_min_investors")]
    pub min_investors: u64,
}

fn default_period_duration() -> i64 {
    DEFAULT_PERIOD_DURATION_SECS
}

fn default_min_capital() -> Amount {
    DEFAULT_MIN_CAPITAL
}

fn default_min_investors() -> u64 {
    DEFAULT_MIN_INVESTORS
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            period_duration_secs: default_period_duration(),
            min_capital: default_min_capital(),
            min_investors: default_min_investors(),
        }
    }
}

/// Weight coefficient of one staked token class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassWeight {
    pub class: TokenClass,
    #[serde(with = "serde_amount")]
    pub weight: u128,
}

/// Pool distributor settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// Fixed-point scale of reward-per-token
    #[serde(default = "default_reward_scale", with = "serde_amount")]
    pub reward_scale: u128,

    /// Staked token classes and their weights
    #[serde(default = "default_class_weights")]
    pub class_weights: Vec<ClassWeight>,
}

impl DistributorConfig {
    /// Class weights keyed by class
    pub fn weights_by_class(&self) -> BTreeMap<TokenClass, u128> {
        self.class_weights
            .iter()
            .map(|cw| (cw.class, cw.weight))
            .collect()
    }
}

fn default_class_weights() -> Vec<ClassWeight> {
    DEFAULT_CLASS_WEIGHTS
        .iter()
        .map(|(class, weight)| ClassWeight {
            class: TokenClass(*class),
            weight: *weight,
        })
        .collect()
}

fn default_reward_scale() -> u128 {
    1
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            reward_scale: default_reward_scale(),
            class_weights: default_class_weights(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`pretty` or `json`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
