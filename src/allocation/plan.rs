//! Instructions produced by a rebalance run, consumed by an external executor.

use crate::allocation::allocator::ChainAllocation;
use crate::allocation::error::EngineError;
use crate::registry::{CurrencyRegistry, StrategyRegistry};
use crate::utils::decimal::{to_native_units, NativeAmount};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One cross-chain capital movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossBalance {
    pub from_chain: String,
    pub to_chain: String,
    /// Bridge port on the source chain
    pub from_addr: String,
    /// Bridge port on the destination chain
    pub to_addr: String,
    /// Bridge symbol on the source chain
    pub from_currency: String,
    /// Bridge symbol on the destination chain
    pub to_currency: String,
    pub amount: Decimal,
}

/// Source-side half of a bridge transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendToBridgeParams {
    pub chain_name: String,
    pub chain_id: u64,
    pub from: String,
    pub to: String,
    pub bridge_address: String,
    pub amount: NativeAmount,
    pub task_id: String,
}

/// Destination-side half of a bridge transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveFromBridgeParams {
    pub chain_name: String,
    pub chain_id: u64,
    pub from: String,
    pub to: String,
    /// Token contract on the destination chain
    pub erc20_contract_addr: String,
    pub amount: NativeAmount,
    pub task_id: String,
}

/// Capital to deploy into one strategy, in native token units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyInvestment {
    pub strategy_address: String,
    pub base_token_amount: NativeAmount,
    pub counter_token_amount: NativeAmount,
}

/// Investments on one active chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestParams {
    pub chain_name: String,
    pub chain_id: u64,
    pub strategies: Vec<StrategyInvestment>,
}

impl InvestParams {
    /// Resolve a chain's allocation into strategy addresses and native token
    /// amounts.
    ///
    /// The base amount is the strategy's first currency, the counter amount
    /// its second (zero for single-asset strategies). Amounts are truncated to
    /// whole native units. Allocations whose strategy or token cannot be
    /// resolved are skipped.
    pub fn from_allocation<R: StrategyRegistry>(
        chain: &str,
        chain_id: u64,
        allocation: &ChainAllocation,
        strategies: &R,
        currencies: &CurrencyRegistry,
    ) -> Result<Self, EngineError> {
        let mut investments = Vec::with_capacity(allocation.len());

        for (key, invested) in allocation {
            let Some(strategy) = strategies.find(key).into_iter().next() else {
                warn!(strategy = %key, "No deployable strategy for allocation, skipped");
                continue;
            };

            let native = |currency: &str| -> Result<Option<NativeAmount>, EngineError> {
                let amount = invested.get(currency).copied().unwrap_or_default();
                if amount.is_zero() {
                    return Ok(Some(NativeAmount::ZERO));
                }
                let Some(token) = currencies.get(currency).and_then(|c| c.token(chain)) else {
                    warn!(strategy = %key, currency, chain, "No token registered, allocation skipped");
                    return Ok(None);
                };
                to_native_units(amount, token.decimals)
                    .map(Some)
                    .ok_or_else(|| EngineError::NativeAmountOverflow {
                        currency: currency.to_string(),
                        amount,
                        decimals: token.decimals,
                    })
            };

            let Some(base_token_amount) = native(strategy.currency0.as_str())? else {
                continue;
            };
            let counter_token_amount = match strategy.currency1.as_deref() {
                Some(currency1) => match native(currency1)? {
                    Some(amount) => amount,
                    None => continue,
                },
                None => NativeAmount::ZERO,
            };

            investments.push(StrategyInvestment {
                strategy_address: strategy.address.clone(),
                base_token_amount,
                counter_token_amount,
            });
        }

        Ok(Self {
            chain_name: chain.to_string(),
            chain_id,
            strategies: investments,
        })
    }
}

/// Everything a rebalance run decided to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub cross_balances: Vec<CrossBalance>,
    pub send_to_bridge_params: Vec<SendToBridgeParams>,
    pub receive_from_bridge_params: Vec<ReceiveFromBridgeParams>,
    pub invest_params: Vec<InvestParams>,
}

impl RebalancePlan {
    /// Number of strategies receiving capital across all chains.
    pub fn investment_count(&self) -> usize {
        self.invest_params.iter().map(|p| p.strategies.len()).sum()
    }
}

/// Issues task ids tying a send instruction to its receive instruction.
///
/// Ids are derived from the nanosecond clock and are strictly increasing
/// within one generator, so two transfers emitted in the same nanosecond still
/// get distinct ids.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    last: u128,
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default().max(0) as u128;
        let id = (nanos * 100).max(self.last + 1);
        self.last = id;
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Currency, InMemoryStrategyRegistry, Strategy, StrategyKey, Token};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn currencies() -> CurrencyRegistry {
        let currency = |symbol: &str, decimals: u32| Currency {
            symbol: symbol.to_string(),
            min_transfer_amount: dec!(1),
            cross_decimal: 4,
            tokens: BTreeMap::from([(
                "bsc".to_string(),
                Token {
                    address: format!("0x{}", symbol),
                    decimals,
                    cross_symbol: symbol.to_uppercase(),
                },
            )]),
        };
        CurrencyRegistry::new(vec![currency("usdt", 18), currency("eth", 18), currency("btc", 8)])
    }

    fn strategies() -> InMemoryStrategyRegistry {
        InMemoryStrategyRegistry::new(vec![
            Strategy {
                chain: "bsc".to_string(),
                project: "pancake".to_string(),
                currency0: "usdt".to_string(),
                currency1: Some("eth".to_string()),
                address: "0xpair".to_string(),
            },
            Strategy {
                chain: "bsc".to_string(),
                project: "venus".to_string(),
                currency0: "btc".to_string(),
                currency1: None,
                address: "0xsingle".to_string(),
            },
        ])
    }

    #[test]
    fn test_invest_params_resolve_addresses_and_native_amounts() {
        let allocation = ChainAllocation::from([
            (
                StrategyKey::new("bsc", "pancake", &["eth", "usdt"]),
                BTreeMap::from([
                    ("usdt".to_string(), dec!(41_250)),
                    ("eth".to_string(), dec!(20.625)),
                ]),
            ),
            (
                StrategyKey::new("bsc", "venus", &["btc"]),
                BTreeMap::from([("btc".to_string(), dec!(0.123456789))]),
            ),
        ]);

        let params =
            InvestParams::from_allocation("bsc", 56, &allocation, &strategies(), &currencies()).unwrap();

        assert_eq!(params.chain_name, "bsc");
        assert_eq!(params.chain_id, 56);
        assert_eq!(
            params.strategies,
            vec![
                StrategyInvestment {
                    strategy_address: "0xpair".to_string(),
                    base_token_amount: NativeAmount(41_250_000_000_000_000_000_000),
                    counter_token_amount: NativeAmount(20_625_000_000_000_000_000),
                },
                StrategyInvestment {
                    strategy_address: "0xsingle".to_string(),
                    // truncated to whole satoshis
                    base_token_amount: NativeAmount(12_345_678),
                    counter_token_amount: NativeAmount::ZERO,
                },
            ]
        );
    }

    #[test]
    fn test_invest_params_skip_unresolvable_allocations() {
        let allocation = ChainAllocation::from([
            (
                StrategyKey::new("bsc", "unknown", &["usdt"]),
                BTreeMap::from([("usdt".to_string(), dec!(10))]),
            ),
            (
                StrategyKey::new("polygon", "venus", &["btc"]),
                BTreeMap::from([("btc".to_string(), dec!(1))]),
            ),
        ]);

        let params =
            InvestParams::from_allocation("bsc", 56, &allocation, &strategies(), &currencies()).unwrap();
        assert!(params.strategies.is_empty());
    }

    #[test]
    fn test_task_ids_are_unique_and_increasing() {
        let mut ids = TaskIdGenerator::new();
        let generated: Vec<u128> = (0..1000)
            .map(|_| ids.next_id().parse().unwrap())
            .collect();

        assert!(generated.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_investment_serializes_camel_case() {
        let investment = StrategyInvestment {
            strategy_address: "0xs1".to_string(),
            base_token_amount: NativeAmount(1000),
            counter_token_amount: NativeAmount::ZERO,
        };

        let json = serde_json::to_string(&investment).unwrap();
        assert!(json.contains(r#""strategyAddress":"0xs1""#));
        assert!(json.contains(r#""baseTokenAmount":"1000""#));
        assert!(json.contains(r#""counterTokenAmount":"0""#));
    }

    #[test]
    fn test_plan_round_trips_through_json() {
        let plan = RebalancePlan {
            cross_balances: vec![CrossBalance {
                from_chain: "heco".to_string(),
                to_chain: "bsc".to_string(),
                from_addr: "0xport_heco".to_string(),
                to_addr: "0xport_bsc".to_string(),
                from_currency: "HUSDT".to_string(),
                to_currency: "BUSDT".to_string(),
                amount: dec!(3000000.25),
            }],
            ..Default::default()
        };

        let json = serde_json::to_string(&plan).unwrap();
        let decoded: RebalancePlan = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, plan);
    }
}
