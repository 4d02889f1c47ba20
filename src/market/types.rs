//! Type definitions for the rebalance-input and pool-info APIs.
//!
//! Decimal fields accept both JSON strings and numbers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// Payload of the rebalance-input endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RebalanceInput {
    #[serde(rename = "threshold", default)]
    pub thresholds: Vec<Threshold>,
    #[serde(rename = "vaultInfoList", default)]
    pub vault_info_list: Vec<VaultInfo>,
}

/// Aggregate amount above which a currency should be rebalanced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    pub token_symbol: String,
    pub threshold_amount: Decimal,
}

/// Vault holdings of one currency.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInfo {
    pub token_symbol: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub currency: String,
    /// Chain name -> current amount and controller
    #[serde(default)]
    pub active_amount: BTreeMap<String, ControllerInfo>,
    /// Chain name -> project name -> strategies
    #[serde(default)]
    pub strategies: BTreeMap<String, BTreeMap<String, Vec<VaultStrategy>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerInfo {
    pub amount: Decimal,
    #[serde(default)]
    pub controller_address: String,
}

/// Strategy contract a vault can invest through.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStrategy {
    /// Constituent symbols joined by `-` (e.g. "USDT-ETH")
    pub token_symbol: String,
    pub strategy_address: String,
}

/// Market metrics of one yield pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    /// Constituent symbols joined by `/` (e.g. "USDT/ETH")
    pub pool_name: String,
    pub apr: Decimal,
    pub tvl: Decimal,
    #[serde(default)]
    pub reward_token_list: Vec<RewardToken>,
    #[serde(default)]
    pub deposit_token_list: Vec<DepositToken>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardToken {
    pub token_address: String,
    pub token_price: Decimal,
    pub day_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositToken {
    pub token_address: String,
    pub token_price: Decimal,
}

impl PoolInfo {
    /// Value of rewards paid out per day.
    pub fn daily_reward(&self) -> Decimal {
        self.reward_token_list
            .iter()
            .map(|t| t.token_price * t.day_amount)
            .sum()
    }

    /// Addresses and prices of every reward and deposit token, rewards first.
    pub fn token_prices(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.reward_token_list
            .iter()
            .map(|t| (t.token_address.as_str(), t.token_price))
            .chain(
                self.deposit_token_list
                    .iter()
                    .map(|t| (t.token_address.as_str(), t.token_price)),
            )
    }
}
