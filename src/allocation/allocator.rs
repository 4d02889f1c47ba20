//! Greedy investment allocation on one active chain.
//!
//! Each round fills the leading APR cluster down to the next tier, then
//! re-ranks. Filled strategies see their TVL grow and their APR drop, so the
//! cluster widens round by round until the chain's balances run out or no
//! strategy has room left.

use crate::allocation::capacity::{self, FillOutcome};
use crate::allocation::error::EngineError;
use crate::market::MarketSnapshot;
use crate::registry::{StrategyKey, StrategyRegistry};
use crate::vault::BalanceSnapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Invested amount per currency, per strategy.
pub type ChainAllocation = BTreeMap<StrategyKey, BTreeMap<String, Decimal>>;

pub struct InvestmentAllocator<'a, R: StrategyRegistry> {
    strategies: &'a R,
    apr_tolerance: Decimal,
    max_rounds: u32,
}

impl<'a, R: StrategyRegistry> InvestmentAllocator<'a, R> {
    pub fn new(strategies: &'a R, apr_tolerance: Decimal, max_rounds: u32) -> Self {
        Self {
            strategies,
            apr_tolerance,
            max_rounds,
        }
    }

    /// Allocate `chain`'s balances across its strategies.
    ///
    /// Mutates `market` (TVL and APR of filled strategies; exhausted ones are
    /// removed) and `balances` (invested amounts are deducted).
    pub fn allocate(
        &self,
        chain: &str,
        market: &mut MarketSnapshot,
        balances: &mut BalanceSnapshot,
    ) -> Result<ChainAllocation, EngineError> {
        let mut allocation = ChainAllocation::new();

        for _ in 0..self.max_rounds {
            if !self.fill_round(chain, market, balances, &mut allocation) {
                return Ok(finish(chain, allocation));
            }
        }

        if self.candidates(chain, market).is_empty() {
            return Ok(finish(chain, allocation));
        }

        Err(EngineError::AllocationDidNotConverge {
            chain: chain.to_string(),
            rounds: self.max_rounds,
        })
    }

    /// Strategies on `chain` with a positive APR that the registry can deploy
    /// into, best first.
    fn candidates(&self, chain: &str, market: &MarketSnapshot) -> Vec<(StrategyKey, Decimal)> {
        market
            .ranked_on_chain(chain)
            .into_iter()
            .filter(|(_, apr)| *apr > Decimal::ZERO)
            .filter(|(key, _)| self.strategies.contains(key))
            .collect()
    }

    /// Fill the leading cluster once. Returns false when there was nothing
    /// left to fill.
    fn fill_round(
        &self,
        chain: &str,
        market: &mut MarketSnapshot,
        balances: &mut BalanceSnapshot,
        allocation: &mut ChainAllocation,
    ) -> bool {
        let candidates = self.candidates(chain, market);
        let Some((_, apr1)) = candidates.first() else {
            return false;
        };
        let apr1 = *apr1;
        let floor = apr1 - self.apr_tolerance;

        let cluster_len = candidates
            .iter()
            .position(|(_, apr)| (apr1 - *apr).abs() >= self.apr_tolerance)
            .unwrap_or(candidates.len());
        let (top, rest) = candidates.split_at(cluster_len);

        let target_apr = rest.first().map(|(_, apr)| *apr).unwrap_or(floor);
        let fill_apr = target_apr.max(floor);

        debug!(
            chain,
            %apr1,
            %target_apr,
            %fill_apr,
            cluster = top.len(),
            "Allocation round"
        );

        for (key, _) in top {
            match capacity::fill_cap(chain, key, market, balances, fill_apr) {
                FillOutcome::Unfillable => {
                    debug!(strategy = %key, "Strategy unfillable, dropped");
                    market.remove(key);
                }
                FillOutcome::Filled {
                    fully_capped,
                    filled_value,
                    deltas,
                } => {
                    let invested = allocation.entry(key.clone()).or_default();
                    for (currency, delta) in &deltas {
                        balances.adjust(currency, chain, *delta);
                        *invested.entry(currency.clone()).or_default() -= *delta;
                    }

                    if let Some(metrics) = market.pool_mut(key) {
                        metrics.tvl += filled_value;
                        if let Some(apr) = capacity::implied_apr(metrics.daily_reward, metrics.tvl) {
                            metrics.apr = apr;
                        }
                    }

                    debug!(strategy = %key, %filled_value, fully_capped, "Strategy filled");

                    if !fully_capped {
                        market.remove(key);
                    }
                }
            }
        }

        true
    }
}

fn finish(chain: &str, mut allocation: ChainAllocation) -> ChainAllocation {
    allocation.retain(|_, invested| {
        invested.retain(|_, amount| !amount.is_zero());
        !invested.is_empty()
    });

    info!(chain, strategies = allocation.len(), "Allocation complete");
    allocation
}
