//! One rebalance run: fetch inputs, compute the plan, persist it.

use crate::allocation::{RebalanceEngine, RebalancePlan};
use crate::config::Config;
use crate::market::{InputSource, MarketSnapshot, ProjectPools};
use crate::persistence::TaskStore;
use crate::registry::CurrencyRegistry;
use crate::vault::{strategies_from_vaults, BalanceSnapshot};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A previously planned task is still in flight.
    Skipped { open_task: i64 },
    /// No currency exceeded its threshold.
    NothingToDo,
    /// A plan was computed; `task_id` is set when it was persisted.
    Planned {
        task_id: Option<i64>,
        plan: RebalancePlan,
    },
}

/// Ties the input source, the engine and the task store together.
pub struct RebalanceService<S: InputSource> {
    config: Config,
    currencies: CurrencyRegistry,
    source: S,
    store: Option<TaskStore>,
}

impl<S: InputSource> RebalanceService<S> {
    /// Create a service. Without a store, runs neither check for open tasks
    /// nor persist their plans.
    pub fn new(config: Config, source: S, store: Option<TaskStore>) -> Self {
        let currencies = CurrencyRegistry::from_config(&config.currencies);
        Self {
            config,
            currencies,
            source,
            store,
        }
    }

    pub fn store(&self) -> Option<&TaskStore> {
        self.store.as_ref()
    }

    /// Fetch inputs and compute a plan without touching the task store.
    ///
    /// `None` means no currency exceeded its threshold.
    pub async fn compute_plan(&self) -> Result<Option<RebalancePlan>> {
        let input = self.source.fetch_rebalance_input().await?;

        let balances = BalanceSnapshot::from_vaults(&self.currencies, &input.vault_info_list);
        let strategies = strategies_from_vaults(&self.currencies, &input.vault_info_list);

        let mut projects = Vec::with_capacity(self.config.projects.len());
        for project in &self.config.projects {
            let pools = self.source.fetch_project_pools(project).await?;
            debug!(chain = %project.chain, project = %project.name, pools = pools.len(), "Pools fetched");
            projects.push(ProjectPools {
                chain: project.chain.to_lowercase(),
                project: project.name.to_lowercase(),
                pools,
            });
        }
        let market = MarketSnapshot::from_pools(&self.currencies, &projects);

        let engine = RebalanceEngine::new(
            &self.currencies,
            &strategies,
            &self.config.chains,
            &self.config.allocation,
        );

        engine
            .run(&input.thresholds, balances, market)
            .context("Rebalance computation failed")
    }

    /// Run once: skip while a task is open, otherwise compute and persist a
    /// plan.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        if let Some(store) = &self.store {
            if self.config.persistence.skip_when_task_open {
                if let Some(task) = store.open_tasks()?.first() {
                    info!(task_id = task.id, state = %task.state, "Task still open, skipping run");
                    return Ok(RunOutcome::Skipped { open_task: task.id });
                }
            }
        }

        let Some(plan) = self.compute_plan().await? else {
            return Ok(RunOutcome::NothingToDo);
        };

        let task_id = match &self.store {
            Some(store) => Some(store.create_part_rebalance_task(&plan)?),
            None => None,
        };

        Ok(RunOutcome::Planned { task_id, plan })
    }
}
