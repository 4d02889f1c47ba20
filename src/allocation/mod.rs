//! Rebalance computation.
//!
//! Pure and synchronous: given thresholds, a balance snapshot and a market
//! snapshot, decide whether to act and produce the instruction plan.
//!
//! - `threshold`: gate deciding whether the run proceeds
//! - `rebalancer`: cross-chain bridge transfers toward capacity-weighted targets
//! - `allocator`: greedy investment of each active chain's balances
//! - `capacity`: how much a strategy can absorb at a target APR
//! - `plan`: the instruction types handed to the executor

pub mod allocator;
pub mod capacity;
mod error;
pub mod plan;
pub mod rebalancer;
pub mod threshold;

pub use allocator::{ChainAllocation, InvestmentAllocator};
pub use error::EngineError;
pub use plan::{
    CrossBalance, InvestParams, RebalancePlan, ReceiveFromBridgeParams, SendToBridgeParams,
    StrategyInvestment, TaskIdGenerator,
};
pub use rebalancer::CrossChainBalancer;
pub use threshold::ThresholdBreach;

use crate::config::{AllocationConfig, ChainsConfig};
use crate::market::{MarketSnapshot, Threshold};
use crate::registry::{CurrencyRegistry, StrategyRegistry};
use crate::vault::BalanceSnapshot;
use tracing::info;

/// Runs the threshold gate, the cross-chain balancer and the investment
/// allocator over one set of inputs.
pub struct RebalanceEngine<'a, R: StrategyRegistry> {
    currencies: &'a CurrencyRegistry,
    strategies: &'a R,
    chains: &'a ChainsConfig,
    allocation: &'a AllocationConfig,
}

impl<'a, R: StrategyRegistry> RebalanceEngine<'a, R> {
    pub fn new(
        currencies: &'a CurrencyRegistry,
        strategies: &'a R,
        chains: &'a ChainsConfig,
        allocation: &'a AllocationConfig,
    ) -> Self {
        Self {
            currencies,
            strategies,
            chains,
            allocation,
        }
    }

    /// Compute a rebalance plan.
    ///
    /// Returns `Ok(None)` when no currency exceeds its threshold. The snapshots
    /// are consumed: both passes mutate them and they must not outlive the run.
    pub fn run(
        &self,
        thresholds: &[Threshold],
        mut balances: BalanceSnapshot,
        mut market: MarketSnapshot,
    ) -> Result<Option<RebalancePlan>, EngineError> {
        let Some(breach) = threshold::evaluate(self.currencies, thresholds, &balances) else {
            info!("No currency above its threshold, nothing to do");
            return Ok(None);
        };

        info!(
            currency = %breach.currency,
            total = %breach.total,
            threshold = %breach.threshold,
            "Threshold exceeded, rebalancing"
        );

        let mut plan = RebalancePlan::default();
        let mut task_ids = TaskIdGenerator::new();

        CrossChainBalancer::new(
            self.currencies,
            self.strategies,
            self.chains,
            self.allocation.capacity_apr_floor,
        )
        .rebalance(&mut balances, &market, &mut task_ids, &mut plan)?;

        let allocator = InvestmentAllocator::new(
            self.strategies,
            self.allocation.apr_tolerance,
            self.allocation.max_rounds,
        );

        for chain in &self.chains.active {
            let chain_id = self
                .chains
                .chain_id(chain)
                .ok_or_else(|| EngineError::MissingChainId(chain.clone()))?;

            let allocation = allocator.allocate(chain, &mut market, &mut balances)?;
            plan.invest_params.push(InvestParams::from_allocation(
                chain,
                chain_id,
                &allocation,
                self.strategies,
                self.currencies,
            )?);
        }

        info!(
            transfers = plan.cross_balances.len(),
            investments = plan.investment_count(),
            "Rebalance plan computed"
        );

        Ok(Some(plan))
    }
}
