//! Per-run market snapshot.

use crate::market::PoolInfo;
use crate::registry::{CurrencyRegistry, StrategyKey};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Market metrics of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMetrics {
    pub apr: Decimal,
    /// Total value locked, in value terms
    pub tvl: Decimal,
    /// Value of rewards paid out per day
    pub daily_reward: Decimal,
    /// Insertion order, used to break APR ties
    seq: u64,
}

/// Pools reported by one project on one chain.
#[derive(Debug, Clone)]
pub struct ProjectPools {
    pub chain: String,
    pub project: String,
    pub pools: Vec<PoolInfo>,
}

/// APR, TVL and daily reward per strategy key, plus currency prices.
///
/// Assembled fresh at the start of every run and mutated by the investment
/// allocator as it fills strategies.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pools: BTreeMap<StrategyKey, PoolMetrics>,
    prices: HashMap<String, Decimal>,
    next_seq: u64,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from project pool listings.
    ///
    /// Prices are resolved through token addresses; the first price seen for a
    /// currency wins. Tokens unknown to the registry are ignored.
    pub fn from_pools(registry: &CurrencyRegistry, projects: &[ProjectPools]) -> Self {
        let mut snapshot = Self::new();

        for project in projects {
            for pool in &project.pools {
                for (address, price) in pool.token_prices() {
                    if let Some(currency) = registry.currency_by_address(address) {
                        snapshot.set_price(&currency.symbol, price);
                    }
                }

                let names: Vec<String> = pool
                    .pool_name
                    .split('/')
                    .map(|name| registry.canonical_symbol(name.trim()))
                    .collect();
                let key = StrategyKey::new(&project.chain, &project.project, &names);

                snapshot.insert_pool(key, pool.apr, pool.tvl, pool.daily_reward());
            }
        }

        debug!(
            pools = snapshot.pools.len(),
            prices = snapshot.prices.len(),
            "Market snapshot assembled"
        );

        snapshot
    }

    /// Insert or replace a strategy's metrics. A replaced entry keeps its
    /// original position in tie-breaking order.
    pub fn insert_pool(&mut self, key: StrategyKey, apr: Decimal, tvl: Decimal, daily_reward: Decimal) {
        let seq = match self.pools.get(&key) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };

        self.pools.insert(
            key,
            PoolMetrics {
                apr,
                tvl,
                daily_reward,
                seq,
            },
        );
    }

    /// Record a price unless one is already known.
    pub fn set_price(&mut self, currency: &str, price: Decimal) {
        self.prices.entry(currency.to_string()).or_insert(price);
    }

    /// Known positive price of a currency.
    pub fn price(&self, currency: &str) -> Option<Decimal> {
        self.prices
            .get(currency)
            .copied()
            .filter(|p| *p > Decimal::ZERO)
    }

    pub fn pool(&self, key: &StrategyKey) -> Option<&PoolMetrics> {
        self.pools.get(key)
    }

    pub fn pool_mut(&mut self, key: &StrategyKey) -> Option<&mut PoolMetrics> {
        self.pools.get_mut(key)
    }

    pub fn remove(&mut self, key: &StrategyKey) -> Option<PoolMetrics> {
        self.pools.remove(key)
    }

    /// Strategy keys on `chain` ordered by APR descending; ties keep insertion
    /// order.
    pub fn ranked_on_chain(&self, chain: &str) -> Vec<(StrategyKey, Decimal)> {
        let mut ranked: Vec<(&StrategyKey, &PoolMetrics)> = self
            .pools
            .iter()
            .filter(|(key, _)| key.chain == chain)
            .collect();
        ranked.sort_by(|(_, a), (_, b)| b.apr.cmp(&a.apr).then(a.seq.cmp(&b.seq)));

        ranked
            .into_iter()
            .map(|(key, metrics)| (key.clone(), metrics.apr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{DepositToken, RewardToken};
    use crate::registry::{Currency, Token};
    use rust_decimal_macros::dec;

    fn registry() -> CurrencyRegistry {
        let currency = |symbol: &str, address: &str| Currency {
            symbol: symbol.to_string(),
            min_transfer_amount: dec!(1),
            cross_decimal: 2,
            tokens: BTreeMap::from([(
                "bsc".to_string(),
                Token {
                    address: address.to_string(),
                    decimals: 18,
                    cross_symbol: symbol.to_uppercase(),
                },
            )]),
        };
        CurrencyRegistry::new(vec![
            currency("usd", "0x0d"),
            currency("usdt", "0x0a"),
            currency("eth", "0x0b"),
        ])
    }

    fn pool(name: &str, apr: Decimal) -> PoolInfo {
        PoolInfo {
            pool_name: name.to_string(),
            apr,
            tvl: dec!(1000),
            reward_token_list: vec![RewardToken {
                token_address: "0xcake".to_string(),
                token_price: dec!(2),
                day_amount: dec!(5),
            }],
            deposit_token_list: vec![
                DepositToken {
                    token_address: "0x0A".to_string(),
                    token_price: dec!(1),
                },
                DepositToken {
                    token_address: "0x0b".to_string(),
                    token_price: dec!(2000),
                },
            ],
        }
    }

    #[test]
    fn test_from_pools_builds_keys_and_prices() {
        let projects = vec![ProjectPools {
            chain: "bsc".to_string(),
            project: "pancake".to_string(),
            pools: vec![pool("USDT/ETH", dec!(0.3))],
        }];

        let snapshot = MarketSnapshot::from_pools(&registry(), &projects);

        let key = StrategyKey::new("bsc", "pancake", &["eth", "usdt"]);
        let metrics = snapshot.pool(&key).unwrap();
        assert_eq!(metrics.apr, dec!(0.3));
        assert_eq!(metrics.daily_reward, dec!(10));
        assert_eq!(snapshot.price("usdt"), Some(dec!(1)));
        assert_eq!(snapshot.price("eth"), Some(dec!(2000)));
        assert_eq!(snapshot.price("cake"), None);
    }

    #[test]
    fn test_pool_name_prefers_longer_symbol() {
        let projects = vec![ProjectPools {
            chain: "bsc".to_string(),
            project: "pancake".to_string(),
            pools: vec![pool("hUSDT", dec!(0.1))],
        }];

        let snapshot = MarketSnapshot::from_pools(&registry(), &projects);
        assert!(snapshot
            .pool(&StrategyKey::new("bsc", "pancake", &["usdt"]))
            .is_some());
        assert!(snapshot
            .pool(&StrategyKey::new("bsc", "pancake", &["usd"]))
            .is_none());
    }

    #[test]
    fn test_first_price_wins() {
        let mut snapshot = MarketSnapshot::new();
        snapshot.set_price("eth", dec!(2000));
        snapshot.set_price("eth", dec!(1000));
        assert_eq!(snapshot.price("eth"), Some(dec!(2000)));

        snapshot.set_price("doge", Decimal::ZERO);
        assert_eq!(snapshot.price("doge"), None);
    }

    #[test]
    fn test_ranking_breaks_ties_by_insertion() {
        let mut snapshot = MarketSnapshot::new();
        let a = StrategyKey::new("bsc", "zeta", &["usdt"]);
        let b = StrategyKey::new("bsc", "alpha", &["usdt"]);
        let c = StrategyKey::new("bsc", "mid", &["eth"]);
        let other = StrategyKey::new("polygon", "alpha", &["usdt"]);

        snapshot.insert_pool(a.clone(), dec!(0.2), dec!(1), dec!(1));
        snapshot.insert_pool(b.clone(), dec!(0.2), dec!(1), dec!(1));
        snapshot.insert_pool(c.clone(), dec!(0.5), dec!(1), dec!(1));
        snapshot.insert_pool(other, dec!(0.9), dec!(1), dec!(1));

        let ranked: Vec<_> = snapshot
            .ranked_on_chain("bsc")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(ranked, vec![c, a, b]);
    }
}
