//! Strategy records and composite strategy keys.

use std::fmt;

/// Composite identifier of a strategy: chain, project and constituent
/// currencies.
///
/// Currencies are sorted on construction, so `["usdt", "eth"]` and
/// `["eth", "usdt"]` produce the same key regardless of quote order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrategyKey {
    pub chain: String,
    pub project: String,
    currencies: Vec<String>,
}

impl StrategyKey {
    pub fn new<S: AsRef<str>>(chain: &str, project: &str, currencies: &[S]) -> Self {
        let mut currencies: Vec<String> = currencies
            .iter()
            .map(|c| c.as_ref().to_lowercase())
            .collect();
        currencies.sort();

        Self {
            chain: chain.to_lowercase(),
            project: project.to_lowercase(),
            currencies,
        }
    }

    /// Constituent currencies in key order.
    pub fn currencies(&self) -> &[String] {
        &self.currencies
    }

    /// Whether the strategy pairs two currencies.
    pub fn is_dual(&self) -> bool {
        self.currencies.len() == 2
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.chain, self.project)?;
        for currency in &self.currencies {
            write!(f, "_{}", currency)?;
        }
        Ok(())
    }
}

/// A deployable strategy contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub chain: String,
    pub project: String,
    /// Base currency
    pub currency0: String,
    /// Counter currency, absent for single-asset strategies
    pub currency1: Option<String>,
    pub address: String,
}

impl Strategy {
    pub fn key(&self) -> StrategyKey {
        let mut currencies = vec![self.currency0.as_str()];
        currencies.extend(self.currency1.as_deref());
        StrategyKey::new(&self.chain, &self.project, &currencies)
    }

    pub fn is_dual(&self) -> bool {
        self.currency1.is_some()
    }
}

/// Source of truth for which strategies exist on which chain.
pub trait StrategyRegistry {
    /// Strategies matching a chain, project and set of currencies.
    fn find(&self, key: &StrategyKey) -> Vec<&Strategy>;

    /// Strategies on `chain` that involve `currency`.
    fn find_by_chain_and_currency(&self, chain: &str, currency: &str) -> Vec<&Strategy>;

    fn contains(&self, key: &StrategyKey) -> bool {
        !self.find(key).is_empty()
    }
}

/// Registry backed by a list of strategy records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStrategyRegistry {
    strategies: Vec<Strategy>,
}

impl InMemoryStrategyRegistry {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl StrategyRegistry for InMemoryStrategyRegistry {
    fn find(&self, key: &StrategyKey) -> Vec<&Strategy> {
        self.strategies.iter().filter(|s| s.key() == *key).collect()
    }

    fn find_by_chain_and_currency(&self, chain: &str, currency: &str) -> Vec<&Strategy> {
        self.strategies
            .iter()
            .filter(|s| {
                s.chain == chain
                    && (s.currency0 == currency || s.currency1.as_deref() == Some(currency))
            })
            .collect()
    }
}
