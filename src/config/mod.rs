//! Configuration management for the cross-chain rebalancer.
//!
//! Loads settings from environment variables and config files. The currency
//! and token reference data lives here as well; it is turned into an
//! immutable [`CurrencyRegistry`](crate::registry::CurrencyRegistry) once at
//! startup.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Rebalance input endpoint (thresholds and vault balances)
    #[serde(default)]
    pub pool: PoolConfig,
    /// Yield projects whose pool info feeds the market snapshot
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    /// Chain roles, ids and bridge ports
    #[serde(default)]
    pub chains: ChainsConfig,
    /// Allocation engine parameters
    #[serde(default)]
    pub allocation: AllocationConfig,
    /// Currency and per-chain token reference data
    #[serde(default)]
    pub currencies: Vec<CurrencyConfig>,
    /// Task store settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Run loop settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// URL returning `{ threshold, vaultInfoList }`
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub chain: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// The two chains eligible for investment and mutual bridging
    #[serde(default = "default_active_chains")]
    pub active: Vec<String>,
    /// Capital buffer chain; never invested into
    #[serde(default = "default_reserve_chain")]
    pub reserve: String,
    /// Numeric chain id per chain name
    #[serde(default = "default_chain_ids")]
    pub ids: BTreeMap<String, u64>,
    /// Bridge contract (port) address per chain name
    #[serde(default)]
    pub bridge_ports: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Minimum APR for a paired strategy to count toward a chain's capacity
    #[serde(default = "default_capacity_apr_floor")]
    pub capacity_apr_floor: Decimal,
    /// APR band that groups strategies into the leading cluster
    #[serde(default = "default_apr_tolerance")]
    pub apr_tolerance: Decimal,
    /// Upper bound on allocator rounds per chain
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// Canonical lowercase symbol (e.g. "usdt")
    pub symbol: String,
    /// Smallest amount worth bridging
    pub min_transfer_amount: Decimal,
    /// Decimal places cross-chain amounts are truncated to
    pub cross_decimal: u32,
    /// Token per chain name
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: String,
    /// Native decimal precision of the on-chain token
    pub decimals: u32,
    /// Symbol the bridge knows this token by
    pub cross_symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite task database
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Skip a run while a previously planned task is still in flight
    #[serde(default = "default_skip_when_task_open")]
    pub skip_when_task_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// HTTP request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

// Default value functions
fn default_active_chains() -> Vec<String> {
    vec!["bsc".to_string(), "polygon".to_string()]
}

fn default_reserve_chain() -> String {
    "heco".to_string()
}

fn default_chain_ids() -> BTreeMap<String, u64> {
    BTreeMap::from([
        ("bsc".to_string(), 56),
        ("heco".to_string(), 128),
        ("polygon".to_string(), 137),
    ])
}

fn default_capacity_apr_floor() -> Decimal {
    Decimal::new(18, 2) // 0.18
}

fn default_apr_tolerance() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

fn default_max_rounds() -> u32 {
    10_000
}

fn default_db_path() -> String {
    "data/rebalancer.db".to_string()
}

fn default_skip_when_task_open() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    3
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("REBALANCER"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let chains = &self.chains;

        anyhow::ensure!(
            chains.active.len() == 2 && chains.active[0] != chains.active[1],
            "exactly two distinct active chains are required"
        );

        anyhow::ensure!(
            !chains.active.contains(&chains.reserve),
            "reserve chain {} must not be an active chain",
            chains.reserve
        );

        for chain in chains.active.iter().chain(std::iter::once(&chains.reserve)) {
            anyhow::ensure!(
                chains.ids.contains_key(chain),
                "missing chain id for {}",
                chain
            );
            anyhow::ensure!(
                chains.bridge_ports.contains_key(chain),
                "missing bridge port for {}",
                chain
            );
        }

        anyhow::ensure!(
            self.allocation.capacity_apr_floor > Decimal::ZERO,
            "capacity_apr_floor must be positive"
        );

        anyhow::ensure!(
            self.allocation.apr_tolerance > Decimal::ZERO,
            "apr_tolerance must be positive"
        );

        for currency in &self.currencies {
            anyhow::ensure!(
                currency.min_transfer_amount >= Decimal::ZERO,
                "min_transfer_amount for {} must not be negative",
                currency.symbol
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            projects: Vec::new(),
            chains: ChainsConfig::default(),
            allocation: AllocationConfig::default(),
            currencies: Vec::new(),
            persistence: PersistenceConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl ChainsConfig {
    /// The active chain that is not `chain`.
    pub fn other_active(&self, chain: &str) -> Option<&str> {
        match self.active.as_slice() {
            [a, b] if a == chain => Some(b.as_str()),
            [a, b] if b == chain => Some(a.as_str()),
            _ => None,
        }
    }

    pub fn chain_id(&self, chain: &str) -> Option<u64> {
        self.ids.get(chain).copied()
    }

    pub fn bridge_port(&self, chain: &str) -> Option<&str> {
        self.bridge_ports.get(chain).map(String::as_str)
    }
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            active: default_active_chains(),
            reserve: default_reserve_chain(),
            ids: default_chain_ids(),
            bridge_ports: BTreeMap::new(),
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            capacity_apr_floor: default_capacity_apr_floor(),
            apr_tolerance: default_apr_tolerance(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            skip_when_task_open: default_skip_when_task_open(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}
