//! Vault balances and the strategies vaults can invest through.
//!
//! The balance snapshot is the working state of a run: the cross-chain
//! balancer and the investment allocator both mutate it in place, and it is
//! discarded when the run ends.

use crate::market::VaultInfo;
use crate::registry::{CurrencyRegistry, InMemoryStrategyRegistry, Strategy};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Amount of one currency held on one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainBalance {
    pub amount: Decimal,
    /// Source / destination of bridge transfers on this chain
    pub controller: String,
}

/// Currency -> chain -> balance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceSnapshot {
    balances: BTreeMap<String, BTreeMap<String, ChainBalance>>,
}

impl BalanceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from vault info; chain names are lowercased and vaults
    /// whose symbol is not in the registry are skipped.
    pub fn from_vaults(registry: &CurrencyRegistry, vaults: &[VaultInfo]) -> Self {
        let mut snapshot = Self::new();

        for vault in vaults {
            let Some(symbol) = registry.match_symbol(&vault.token_symbol) else {
                warn!(token_symbol = %vault.token_symbol, "Vault currency not in registry, skipping");
                continue;
            };

            for (chain, info) in &vault.active_amount {
                snapshot.set(symbol, &chain.to_lowercase(), info.amount, &info.controller_address);
            }
        }

        debug!(currencies = snapshot.balances.len(), "Balance snapshot assembled");
        snapshot
    }

    pub fn set(&mut self, currency: &str, chain: &str, amount: Decimal, controller: &str) {
        self.balances
            .entry(currency.to_string())
            .or_default()
            .insert(
                chain.to_string(),
                ChainBalance {
                    amount,
                    controller: controller.to_string(),
                },
            );
    }

    /// Balance of `currency` on `chain`; zero when unknown.
    pub fn amount(&self, currency: &str, chain: &str) -> Decimal {
        self.get(currency, chain)
            .map(|b| b.amount)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn get(&self, currency: &str, chain: &str) -> Option<&ChainBalance> {
        self.balances.get(currency)?.get(chain)
    }

    /// Add `delta` (possibly negative) to a balance, creating the entry if
    /// needed.
    pub fn adjust(&mut self, currency: &str, chain: &str, delta: Decimal) {
        self.balances
            .entry(currency.to_string())
            .or_default()
            .entry(chain.to_string())
            .or_insert_with(|| ChainBalance {
                amount: Decimal::ZERO,
                controller: String::new(),
            })
            .amount += delta;
    }

    /// Move `amount` of `currency` from one chain to another.
    pub fn transfer(&mut self, currency: &str, from: &str, to: &str, amount: Decimal) {
        self.adjust(currency, from, -amount);
        self.adjust(currency, to, amount);
    }

    /// Sum of a currency over every chain present, or `None` if the currency
    /// has no balance data at all.
    pub fn total(&self, currency: &str) -> Option<Decimal> {
        self.balances
            .get(currency)
            .map(|chains| chains.values().map(|b| b.amount).sum())
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.balances.keys().map(String::as_str)
    }
}

/// Build the strategy registry from the strategies listed in vault info.
///
/// Strategy token symbols are `-` separated; the first is the base currency
/// and the second, if present, the counter currency.
pub fn strategies_from_vaults(
    registry: &CurrencyRegistry,
    vaults: &[VaultInfo],
) -> InMemoryStrategyRegistry {
    let mut strategies = Vec::new();

    for vault in vaults {
        for (chain, projects) in &vault.strategies {
            for (project, entries) in projects {
                for entry in entries {
                    let mut symbols = entry
                        .token_symbol
                        .split('-')
                        .map(|s| registry.canonical_symbol(s.trim()));

                    let Some(currency0) = symbols.next() else {
                        continue;
                    };
                    let strategy = Strategy {
                        chain: chain.to_lowercase(),
                        project: project.to_lowercase(),
                        currency0,
                        currency1: symbols.next(),
                        address: entry.strategy_address.clone(),
                    };

                    // Several vaults may list the same strategy
                    if !strategies.contains(&strategy) {
                        strategies.push(strategy);
                    }
                }
            }
        }
    }

    debug!(strategies = strategies.len(), "Strategy registry assembled");
    InMemoryStrategyRegistry::new(strategies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ControllerInfo, VaultStrategy};
    use crate::registry::{Currency, StrategyKey, StrategyRegistry};
    use rust_decimal_macros::dec;

    fn registry() -> CurrencyRegistry {
        let currency = |symbol: &str| Currency {
            symbol: symbol.to_string(),
            min_transfer_amount: dec!(1),
            cross_decimal: 2,
            tokens: BTreeMap::new(),
        };
        CurrencyRegistry::new(vec![currency("usdt"), currency("eth")])
    }

    fn vault(symbol: &str, amounts: &[(&str, Decimal)]) -> VaultInfo {
        VaultInfo {
            token_symbol: symbol.to_string(),
            chain: String::new(),
            currency: String::new(),
            active_amount: amounts
                .iter()
                .map(|(chain, amount)| {
                    (
                        chain.to_string(),
                        ControllerInfo {
                            amount: *amount,
                            controller_address: format!("0xc_{}", chain.to_lowercase()),
                        },
                    )
                })
                .collect(),
            strategies: BTreeMap::new(),
        }
    }

    #[test]
    fn test_from_vaults_lowercases_chains() {
        let vaults = vec![
            vault("USDT", &[("BSC", dec!(5)), ("HECO", dec!(10))]),
            vault("DOGE", &[("BSC", dec!(1))]),
        ];

        let snapshot = BalanceSnapshot::from_vaults(&registry(), &vaults);
        assert_eq!(snapshot.amount("usdt", "bsc"), dec!(5));
        assert_eq!(snapshot.get("usdt", "heco").unwrap().controller, "0xc_heco");
        assert_eq!(snapshot.currencies().count(), 1);
    }

    #[test]
    fn test_total_includes_every_chain() {
        let mut snapshot = BalanceSnapshot::new();
        snapshot.set("usdt", "bsc", dec!(1.5), "");
        snapshot.set("usdt", "polygon", dec!(2.25), "");
        snapshot.set("usdt", "heco", dec!(10), "");

        assert_eq!(snapshot.total("usdt"), Some(dec!(13.75)));
        assert_eq!(snapshot.total("eth"), None);
    }

    #[test]
    fn test_transfer_moves_amount() {
        let mut snapshot = BalanceSnapshot::new();
        snapshot.set("usdt", "heco", dec!(100), "0xh");

        snapshot.transfer("usdt", "heco", "bsc", dec!(40));

        assert_eq!(snapshot.amount("usdt", "heco"), dec!(60));
        assert_eq!(snapshot.amount("usdt", "bsc"), dec!(40));
        assert_eq!(snapshot.total("usdt"), Some(dec!(100)));
    }

    #[test]
    fn test_strategies_from_vaults() {
        let mut usdt = vault("USDT", &[]);
        usdt.strategies = BTreeMap::from([(
            "BSC".to_string(),
            BTreeMap::from([(
                "Pancake".to_string(),
                vec![
                    VaultStrategy {
                        token_symbol: "USDT-ETH".to_string(),
                        strategy_address: "0xs1".to_string(),
                    },
                    VaultStrategy {
                        token_symbol: "USDT".to_string(),
                        strategy_address: "0xs2".to_string(),
                    },
                ],
            )]),
        )]);
        let eth = {
            let mut v = vault("ETH", &[]);
            v.strategies = usdt.strategies.clone();
            v
        };

        let strategies = strategies_from_vaults(&registry(), &[usdt, eth]);
        assert_eq!(strategies.len(), 2);

        let pair = strategies.find(&StrategyKey::new("bsc", "pancake", &["eth", "usdt"]));
        assert_eq!(pair.len(), 1);
        assert_eq!(pair[0].currency0, "usdt");
        assert_eq!(pair[0].currency1.as_deref(), Some("eth"));
        assert_eq!(pair[0].address, "0xs1");
    }
}
