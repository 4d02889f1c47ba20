//! Strategy capacity model.
//!
//! A strategy paying `daily_reward` per day on `tvl` yields
//! `daily_reward * 365 / tvl`. Its cap at a target APR is the extra capital it
//! can absorb before its yield falls to that target.

use crate::market::MarketSnapshot;
use crate::registry::StrategyKey;
use crate::vault::BalanceSnapshot;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::debug;

pub const DAYS_PER_YEAR: Decimal = dec!(365);

/// Room to invest while the yield stays at or above `target_apr`.
///
/// `None` when `target_apr` is not positive.
pub fn cap(daily_reward: Decimal, tvl: Decimal, target_apr: Decimal) -> Option<Decimal> {
    if target_apr <= Decimal::ZERO {
        return None;
    }
    Some(daily_reward * DAYS_PER_YEAR / target_apr - tvl)
}

/// Yield implied by a reward rate and TVL.
pub fn implied_apr(daily_reward: Decimal, tvl: Decimal) -> Option<Decimal> {
    (tvl > Decimal::ZERO).then(|| daily_reward * DAYS_PER_YEAR / tvl)
}

/// Result of trying to fill a strategy toward a target APR.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    /// Nothing can be deployed: no room, unknown price, or no balance.
    Unfillable,
    Filled {
        /// The full cap was used; otherwise the fill was balance-limited.
        fully_capped: bool,
        /// Value added to the strategy's TVL.
        filled_value: Decimal,
        /// Balance change per currency; always negative.
        deltas: BTreeMap<String, Decimal>,
    },
}

/// Fill `key` on `chain` toward `target_apr` using only that chain's
/// balances.
pub fn fill_cap(
    chain: &str,
    key: &StrategyKey,
    market: &MarketSnapshot,
    balances: &BalanceSnapshot,
    target_apr: Decimal,
) -> FillOutcome {
    let Some(metrics) = market.pool(key) else {
        return FillOutcome::Unfillable;
    };

    let cap = match cap(metrics.daily_reward, metrics.tvl, target_apr) {
        Some(cap) if cap > Decimal::ZERO => cap,
        _ => {
            debug!(strategy = %key, %target_apr, "No room left at target APR");
            return FillOutcome::Unfillable;
        }
    };

    match key.currencies() {
        [currency] => fill_single(chain, currency, cap, market, balances),
        [c0, c1] => fill_pair(chain, c0, c1, cap, market, balances),
        _ => FillOutcome::Unfillable,
    }
}

fn fill_single(
    chain: &str,
    currency: &str,
    cap: Decimal,
    market: &MarketSnapshot,
    balances: &BalanceSnapshot,
) -> FillOutcome {
    let Some(price) = market.price(currency) else {
        return FillOutcome::Unfillable;
    };

    let cap_volume = cap / price;
    let volume = cap_volume.min(balances.amount(currency, chain));
    if volume <= Decimal::ZERO {
        return FillOutcome::Unfillable;
    }

    FillOutcome::Filled {
        fully_capped: volume == cap_volume,
        filled_value: volume * price,
        deltas: BTreeMap::from([(currency.to_string(), -volume)]),
    }
}

fn fill_pair(
    chain: &str,
    c0: &str,
    c1: &str,
    cap: Decimal,
    market: &MarketSnapshot,
    balances: &BalanceSnapshot,
) -> FillOutcome {
    let (Some(p0), Some(p1)) = (market.price(c0), market.price(c1)) else {
        return FillOutcome::Unfillable;
    };

    // Both sides are deposited in equal value
    let half_cap = cap / dec!(2);
    let paired = (balances.amount(c0, chain) * p0)
        .min(balances.amount(c1, chain) * p1)
        .min(half_cap);
    if paired <= Decimal::ZERO {
        return FillOutcome::Unfillable;
    }

    let amount0 = paired / p0;
    let amount1 = paired / p1;
    if amount0 <= Decimal::ZERO || amount1 <= Decimal::ZERO {
        return FillOutcome::Unfillable;
    }

    FillOutcome::Filled {
        fully_capped: paired == half_cap,
        filled_value: paired * dec!(2),
        deltas: BTreeMap::from([(c0.to_string(), -amount0), (c1.to_string(), -amount1)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market_with(key: &StrategyKey, daily_reward: Decimal, tvl: Decimal) -> MarketSnapshot {
        let mut market = MarketSnapshot::new();
        market.insert_pool(key.clone(), dec!(0.5), tvl, daily_reward);
        market.set_price("usdt", dec!(1));
        market.set_price("eth", dec!(2000));
        market
    }

    fn balances(usdt: Decimal, eth: Decimal) -> BalanceSnapshot {
        let mut balances = BalanceSnapshot::new();
        balances.set("usdt", "bsc", usdt, "0xc");
        balances.set("eth", "bsc", eth, "0xc");
        balances.set("usdt", "polygon", dec!(1_000_000), "0xc");
        balances
    }

    #[test]
    fn test_cap_formula() {
        // 100/day at 20% supports 182_500; 100_000 already locked
        assert_eq!(cap(dec!(100), dec!(100_000), dec!(0.2)), Some(dec!(82_500)));
        assert_eq!(cap(dec!(100), dec!(100_000), Decimal::ZERO), None);
    }

    #[test]
    fn test_cap_monotonicity() {
        let targets = [dec!(0.5), dec!(0.3), dec!(0.2), dec!(0.1), dec!(0.05)];
        let caps: Vec<_> = targets
            .iter()
            .map(|t| cap(dec!(100), dec!(50_000), *t).unwrap())
            .collect();
        assert!(caps.windows(2).all(|w| w[1] >= w[0]));

        let tvls = [dec!(0), dec!(1_000), dec!(50_000), dec!(500_000)];
        let caps: Vec<_> = tvls
            .iter()
            .map(|tvl| cap(dec!(100), *tvl, dec!(0.2)).unwrap())
            .collect();
        assert!(caps.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_implied_apr() {
        assert_eq!(implied_apr(dec!(100), dec!(182_500)), Some(dec!(0.2)));
        assert_eq!(implied_apr(dec!(100), Decimal::ZERO), None);
    }

    #[test]
    fn test_single_asset_capped() {
        let key = StrategyKey::new("bsc", "venus", &["usdt"]);
        // cap at 20% = 82_500
        let market = market_with(&key, dec!(100), dec!(100_000));

        let outcome = fill_cap("bsc", &key, &market, &balances(dec!(1_000_000), dec!(0)), dec!(0.2));
        assert_eq!(
            outcome,
            FillOutcome::Filled {
                fully_capped: true,
                filled_value: dec!(82_500),
                deltas: BTreeMap::from([("usdt".to_string(), dec!(-82_500))]),
            }
        );
    }

    #[test]
    fn test_single_asset_balance_limited() {
        let key = StrategyKey::new("bsc", "venus", &["usdt"]);
        let market = market_with(&key, dec!(100), dec!(100_000));

        let outcome = fill_cap("bsc", &key, &market, &balances(dec!(5_000), dec!(0)), dec!(0.2));
        match outcome {
            FillOutcome::Filled {
                fully_capped,
                filled_value,
                deltas,
            } => {
                assert!(!fully_capped);
                assert_eq!(filled_value, dec!(5_000));
                assert_eq!(deltas["usdt"], dec!(-5_000));
            }
            FillOutcome::Unfillable => panic!("expected a fill"),
        }
    }

    #[test]
    fn test_single_asset_uses_only_its_chain() {
        let key = StrategyKey::new("bsc", "venus", &["usdt"]);
        let market = market_with(&key, dec!(100), dec!(100_000));

        // Plenty of usdt on polygon, none on bsc
        let outcome = fill_cap("bsc", &key, &market, &balances(dec!(0), dec!(0)), dec!(0.2));
        assert_eq!(outcome, FillOutcome::Unfillable);
    }

    #[test]
    fn test_unknown_price_is_unfillable() {
        let key = StrategyKey::new("bsc", "venus", &["btc"]);
        let market = market_with(&key, dec!(100), dec!(100_000));
        let mut balances = balances(dec!(0), dec!(0));
        balances.set("btc", "bsc", dec!(10), "0xc");

        let outcome = fill_cap("bsc", &key, &market, &balances, dec!(0.2));
        assert_eq!(outcome, FillOutcome::Unfillable);
    }

    #[test]
    fn test_non_positive_cap_is_unfillable() {
        let key = StrategyKey::new("bsc", "venus", &["usdt"]);
        // Already yielding exactly 20%
        let market = market_with(&key, dec!(100), dec!(182_500));

        let outcome = fill_cap("bsc", &key, &market, &balances(dec!(1_000), dec!(0)), dec!(0.2));
        assert_eq!(outcome, FillOutcome::Unfillable);
    }

    #[test]
    fn test_pair_deposits_equal_value() {
        let key = StrategyKey::new("bsc", "pancake", &["usdt", "eth"]);
        let market = market_with(&key, dec!(100), dec!(100_000));

        // usdt side worth 10_000, eth side worth 4_000 -> eth limits
        let outcome = fill_cap("bsc", &key, &market, &balances(dec!(10_000), dec!(2)), dec!(0.2));
        let FillOutcome::Filled {
            fully_capped,
            filled_value,
            deltas,
        } = outcome
        else {
            panic!("expected a fill");
        };

        assert!(!fully_capped);
        assert_eq!(filled_value, dec!(8_000));
        assert!(deltas.values().all(|d| *d < Decimal::ZERO));

        let usdt_value = -deltas["usdt"] * dec!(1);
        let eth_value = -deltas["eth"] * dec!(2000);
        assert!((usdt_value - eth_value).abs() < dec!(0.000001));
    }

    #[test]
    fn test_pair_fully_capped() {
        let key = StrategyKey::new("bsc", "pancake", &["usdt", "eth"]);
        // cap at 20% = 82_500, half = 41_250 per side
        let market = market_with(&key, dec!(100), dec!(100_000));

        let outcome = fill_cap("bsc", &key, &market, &balances(dec!(1_000_000), dec!(100)), dec!(0.2));
        let FillOutcome::Filled {
            fully_capped,
            filled_value,
            deltas,
        } = outcome
        else {
            panic!("expected a fill");
        };

        assert!(fully_capped);
        assert_eq!(filled_value, dec!(82_500));
        assert_eq!(deltas["usdt"], dec!(-41_250));
        assert_eq!(deltas["eth"], dec!(-20.625));
    }

    #[test]
    fn test_pair_missing_one_side_is_unfillable() {
        let key = StrategyKey::new("bsc", "pancake", &["usdt", "eth"]);
        let market = market_with(&key, dec!(100), dec!(100_000));

        let outcome = fill_cap("bsc", &key, &market, &balances(dec!(1_000), dec!(0)), dec!(0.2));
        assert_eq!(outcome, FillOutcome::Unfillable);
    }
}
