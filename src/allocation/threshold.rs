//! Threshold gate deciding whether a run should rebalance at all.

use crate::market::Threshold;
use crate::registry::CurrencyRegistry;
use crate::vault::BalanceSnapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// The currency whose aggregate balance tripped its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdBreach {
    pub currency: String,
    pub total: Decimal,
    pub threshold: Decimal,
}

/// Compare each thresholded currency's balance summed over every chain,
/// reserve included, against its threshold.
///
/// Returns the first breach found, or `None` when no currency exceeds its
/// threshold. Threshold symbols are resolved through the registry; when two
/// entries resolve to the same currency the later one wins. Currencies without
/// balance data are skipped.
pub fn evaluate(
    registry: &CurrencyRegistry,
    thresholds: &[Threshold],
    balances: &BalanceSnapshot,
) -> Option<ThresholdBreach> {
    let mut by_currency: BTreeMap<&str, Decimal> = BTreeMap::new();
    for threshold in thresholds {
        match registry.match_symbol(&threshold.token_symbol) {
            Some(symbol) => {
                by_currency.insert(symbol, threshold.threshold_amount);
            }
            None => debug!(token_symbol = %threshold.token_symbol, "Threshold for unknown currency"),
        }
    }

    for (currency, threshold) in by_currency {
        let Some(total) = balances.total(currency) else {
            debug!(currency, "No balance data for thresholded currency");
            continue;
        };

        debug!(currency, %total, %threshold, "Threshold check");

        if total > threshold {
            return Some(ThresholdBreach {
                currency: currency.to_string(),
                total,
                threshold,
            });
        }
    }

    None
}
