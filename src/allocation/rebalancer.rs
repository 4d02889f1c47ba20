//! Cross-chain balancing between the two active chains.
//!
//! Each currency's total holdings are split across the active chains in
//! proportion to how much capital their paired strategies can absorb at the
//! capacity APR floor. Shortfalls are filled from the reserve chain first and
//! from the other active chain second.

use crate::allocation::capacity;
use crate::allocation::error::EngineError;
use crate::allocation::plan::{
    CrossBalance, RebalancePlan, ReceiveFromBridgeParams, SendToBridgeParams, TaskIdGenerator,
};
use crate::config::ChainsConfig;
use crate::market::MarketSnapshot;
use crate::registry::{Currency, CurrencyRegistry, StrategyRegistry};
use crate::utils::decimal::{safe_div, to_native_units, truncate};
use crate::vault::BalanceSnapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Computes and emits bridge transfers for every currency in the snapshot.
pub struct CrossChainBalancer<'a, R: StrategyRegistry> {
    currencies: &'a CurrencyRegistry,
    strategies: &'a R,
    chains: &'a ChainsConfig,
    capacity_apr_floor: Decimal,
}

impl<'a, R: StrategyRegistry> CrossChainBalancer<'a, R> {
    pub fn new(
        currencies: &'a CurrencyRegistry,
        strategies: &'a R,
        chains: &'a ChainsConfig,
        capacity_apr_floor: Decimal,
    ) -> Self {
        Self {
            currencies,
            strategies,
            chains,
            capacity_apr_floor,
        }
    }

    /// Capital `chain` can absorb in `currency`: the summed cap, at the floor
    /// APR, of that chain's paired strategies whose APR reaches the floor.
    pub fn chain_capacity(&self, currency: &str, chain: &str, market: &MarketSnapshot) -> Decimal {
        let floor = self.capacity_apr_floor;

        self.strategies
            .find_by_chain_and_currency(chain, currency)
            .into_iter()
            .filter(|s| s.is_dual())
            .filter_map(|s| market.pool(&s.key()))
            .filter(|m| m.apr >= floor)
            .filter_map(|m| capacity::cap(m.daily_reward, m.tvl, floor))
            .sum()
    }

    /// Ideal balance of `currency` on each active chain.
    ///
    /// Chains with positive capacity share the currency's total (reserve
    /// included) pro rata; the others get zero. `None` when no active chain
    /// has positive capacity, in which case the currency is left where it is.
    pub fn target_distribution(
        &self,
        currency: &str,
        balances: &BalanceSnapshot,
        market: &MarketSnapshot,
    ) -> Option<BTreeMap<String, Decimal>> {
        let total = balances.total(currency)?;

        let capacities: Vec<(&str, Decimal)> = self
            .chains
            .active
            .iter()
            .map(|chain| (chain.as_str(), self.chain_capacity(currency, chain, market)))
            .collect();

        let positive_total: Decimal = capacities
            .iter()
            .map(|(_, c)| *c)
            .filter(|c| *c > Decimal::ZERO)
            .sum();
        if positive_total <= Decimal::ZERO {
            debug!(currency, "No active chain can absorb capital");
            return None;
        }

        let targets = capacities
            .into_iter()
            .map(|(chain, cap)| {
                let target = if cap > Decimal::ZERO {
                    total * safe_div(cap, positive_total)
                } else {
                    Decimal::ZERO
                };
                (chain.to_string(), target)
            })
            .collect();

        debug!(currency, %total, ?targets, "Target distribution");
        Some(targets)
    }

    /// Emit bridge transfers for every currency, updating `balances` as each
    /// transfer is emitted.
    pub fn rebalance(
        &self,
        balances: &mut BalanceSnapshot,
        market: &MarketSnapshot,
        task_ids: &mut TaskIdGenerator,
        plan: &mut RebalancePlan,
    ) -> Result<(), EngineError> {
        let symbols: Vec<String> = balances.currencies().map(str::to_string).collect();

        for symbol in symbols {
            let Some(currency) = self.currencies.get(&symbol) else {
                warn!(currency = %symbol, "Currency not in registry, skipping cross-chain balance");
                continue;
            };

            let Some(targets) = self.target_distribution(&symbol, balances, market) else {
                continue;
            };

            // Targets are fixed per currency; each chain's diff is taken
            // against the balances left by the transfers already emitted.
            for chain in &self.chains.active {
                let Some(target) = targets.get(chain) else {
                    continue;
                };
                let current = balances.amount(&symbol, chain);
                let Some(diff) = actionable_diff(currency, *target, current) else {
                    continue;
                };
                let Some(other) = self.chains.other_active(chain) else {
                    continue;
                };

                debug!(currency = %symbol, chain = %chain, %target, %current, %diff, "Balance diff");

                if diff < Decimal::ZERO {
                    self.bridge(currency, chain, other, -diff, balances, task_ids, plan)?;
                } else {
                    let other_target = targets.get(other).copied().unwrap_or_default();
                    let deficit = Deficit {
                        chain: chain.as_str(),
                        amount: diff,
                        other,
                        other_target,
                    };
                    self.fill_deficit(currency, &deficit, balances, task_ids, plan)?;
                }
            }
        }

        Ok(())
    }

    /// Cover a deficit, drawing on the reserve chain before the other active
    /// chain.
    ///
    /// Whatever the reserve leg does not deliver (reserve too small, leg below
    /// the minimum, or no token registered) is drawn from the other active
    /// chain, which never gives more than it holds above its own target.
    fn fill_deficit(
        &self,
        currency: &Currency,
        deficit: &Deficit<'_>,
        balances: &mut BalanceSnapshot,
        task_ids: &mut TaskIdGenerator,
        plan: &mut RebalancePlan,
    ) -> Result<(), EngineError> {
        let reserve = self.chains.reserve.as_str();
        let available = balances.amount(&currency.symbol, reserve);

        // A partial reserve leg is put on the precision grid before it is
        // deducted, so the remaining shortfall is on the grid too.
        let reserve_leg = if available >= deficit.amount {
            deficit.amount
        } else {
            truncate(available, currency.cross_decimal)
        };
        let drawn = if self.bridge(currency, reserve, deficit.chain, reserve_leg, balances, task_ids, plan)? {
            reserve_leg
        } else {
            Decimal::ZERO
        };

        let shortfall = deficit.amount - drawn;
        if shortfall <= Decimal::ZERO {
            return Ok(());
        }

        let spare = balances.amount(&currency.symbol, deficit.other) - deficit.other_target;
        let leg = truncate(shortfall.min(spare), currency.cross_decimal);
        if leg <= Decimal::ZERO {
            debug!(
                currency = %currency.symbol,
                chain = deficit.chain,
                other = deficit.other,
                %shortfall,
                "Other active chain has nothing to spare"
            );
            return Ok(());
        }

        self.bridge(currency, deficit.other, deficit.chain, leg, balances, task_ids, plan)?;
        Ok(())
    }

    /// Emit one bridge transfer if it clears the minimum transfer amount.
    ///
    /// Returns whether a transfer was emitted.
    #[allow(clippy::too_many_arguments)]
    fn bridge(
        &self,
        currency: &Currency,
        from: &str,
        to: &str,
        amount: Decimal,
        balances: &mut BalanceSnapshot,
        task_ids: &mut TaskIdGenerator,
        plan: &mut RebalancePlan,
    ) -> Result<bool, EngineError> {
        if amount <= currency.min_transfer_amount {
            debug!(
                currency = %currency.symbol,
                from,
                to,
                %amount,
                min = %currency.min_transfer_amount,
                "Transfer below minimum, suppressed"
            );
            return Ok(false);
        }

        let (Some(from_token), Some(to_token)) = (currency.token(from), currency.token(to)) else {
            warn!(currency = %currency.symbol, from, to, "No token registered on one side, transfer skipped");
            return Ok(false);
        };

        let from_port = self.bridge_port(from)?;
        let to_port = self.bridge_port(to)?;
        let from_chain_id = self.chain_id(from)?;
        let to_chain_id = self.chain_id(to)?;

        let native = |decimals: u32| {
            to_native_units(amount, decimals).ok_or_else(|| EngineError::NativeAmountOverflow {
                currency: currency.symbol.clone(),
                amount,
                decimals,
            })
        };
        let send_amount = native(from_token.decimals)?;
        let receive_amount = native(to_token.decimals)?;

        balances.transfer(&currency.symbol, from, to, amount);

        let controller = |chain: &str| {
            balances
                .get(&currency.symbol, chain)
                .map(|b| b.controller.clone())
                .unwrap_or_default()
        };
        let task_id = task_ids.next_id();

        plan.cross_balances.push(CrossBalance {
            from_chain: from.to_string(),
            to_chain: to.to_string(),
            from_addr: from_port.to_string(),
            to_addr: to_port.to_string(),
            from_currency: from_token.cross_symbol.clone(),
            to_currency: to_token.cross_symbol.clone(),
            amount,
        });
        plan.send_to_bridge_params.push(SendToBridgeParams {
            chain_name: from.to_string(),
            chain_id: from_chain_id,
            from: from_port.to_string(),
            to: controller(from),
            bridge_address: from_port.to_string(),
            amount: send_amount,
            task_id: task_id.clone(),
        });
        plan.receive_from_bridge_params.push(ReceiveFromBridgeParams {
            chain_name: to.to_string(),
            chain_id: to_chain_id,
            from: to_port.to_string(),
            to: controller(to),
            erc20_contract_addr: to_token.address.clone(),
            amount: receive_amount,
            task_id: task_id.clone(),
        });

        info!(
            currency = %currency.symbol,
            from,
            to,
            %amount,
            task_id = %task_id,
            "Bridge transfer planned"
        );

        Ok(true)
    }

    fn bridge_port(&self, chain: &str) -> Result<&'a str, EngineError> {
        self.chains
            .bridge_port(chain)
            .ok_or_else(|| EngineError::MissingBridgePort(chain.to_string()))
    }

    fn chain_id(&self, chain: &str) -> Result<u64, EngineError> {
        self.chains
            .chain_id(chain)
            .ok_or_else(|| EngineError::MissingChainId(chain.to_string()))
    }
}

/// A shortfall on one active chain.
struct Deficit<'c> {
    chain: &'c str,
    amount: Decimal,
    other: &'c str,
    other_target: Decimal,
}

/// `target - current` truncated to the currency's cross-chain precision, if
/// its magnitude exceeds the minimum transfer amount.
fn actionable_diff(currency: &Currency, target: Decimal, current: Decimal) -> Option<Decimal> {
    let diff = target - current;
    (diff.abs() > currency.min_transfer_amount).then(|| truncate(diff, currency.cross_decimal))
}
