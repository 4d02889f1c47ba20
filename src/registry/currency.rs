//! Currency and token reference data.

use crate::config::CurrencyConfig;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// On-chain representation of a currency on one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Normalised (lowercase, `0x`-prefixed) contract address
    pub address: String,
    /// Native decimal precision
    pub decimals: u32,
    /// Symbol the bridge knows this token by
    pub cross_symbol: String,
}

/// A currency tracked across chains.
#[derive(Debug, Clone, PartialEq)]
pub struct Currency {
    /// Canonical lowercase symbol (e.g. "usdt")
    pub symbol: String,
    /// Smallest amount worth bridging
    pub min_transfer_amount: Decimal,
    /// Decimal places cross-chain amounts are truncated to
    pub cross_decimal: u32,
    /// Token per chain name
    pub tokens: BTreeMap<String, Token>,
}

impl Currency {
    /// Token deployed on `chain`, if any.
    pub fn token(&self, chain: &str) -> Option<&Token> {
        self.tokens.get(chain)
    }
}

/// Immutable currency registry.
///
/// Currencies are kept ordered by decreasing symbol length so that a longer,
/// more specific symbol ("usdt") is matched before a shorter one that is a
/// substring of it ("usd"). The sort is stable: equal lengths keep the order
/// in which they were supplied.
#[derive(Debug, Clone, Default)]
pub struct CurrencyRegistry {
    currencies: Vec<Currency>,
    by_address: HashMap<String, usize>,
}

impl CurrencyRegistry {
    /// Build a registry from currency definitions.
    pub fn new(mut currencies: Vec<Currency>) -> Self {
        currencies.sort_by(|a, b| b.symbol.len().cmp(&a.symbol.len()));

        let mut by_address = HashMap::new();
        for (idx, currency) in currencies.iter().enumerate() {
            for token in currency.tokens.values() {
                by_address.entry(token.address.clone()).or_insert(idx);
            }
        }

        Self {
            currencies,
            by_address,
        }
    }

    /// Build a registry from the configured currencies.
    pub fn from_config(configs: &[CurrencyConfig]) -> Self {
        let currencies = configs
            .iter()
            .map(|c| Currency {
                symbol: c.symbol.to_lowercase(),
                min_transfer_amount: c.min_transfer_amount,
                cross_decimal: c.cross_decimal,
                tokens: c
                    .tokens
                    .iter()
                    .map(|(chain, t)| {
                        (
                            chain.to_lowercase(),
                            Token {
                                address: format_addr(&t.address),
                                decimals: t.decimals,
                                cross_symbol: t.cross_symbol.clone(),
                            },
                        )
                    })
                    .collect(),
            })
            .collect();

        Self::new(currencies)
    }

    /// Resolve a free-form token name to a registry symbol.
    ///
    /// Returns the first symbol (longest first) contained in the lowercased
    /// name.
    pub fn match_symbol(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.currencies
            .iter()
            .find(|c| name.contains(c.symbol.as_str()))
            .map(|c| c.symbol.as_str())
    }

    /// Like [`match_symbol`](Self::match_symbol), but falls back to the
    /// lowercased name itself when nothing matches.
    pub fn canonical_symbol(&self, name: &str) -> String {
        self.match_symbol(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_lowercase())
    }

    pub fn get(&self, symbol: &str) -> Option<&Currency> {
        self.currencies.iter().find(|c| c.symbol == symbol)
    }

    /// Currency whose token on any chain has this address.
    pub fn currency_by_address(&self, address: &str) -> Option<&Currency> {
        self.by_address
            .get(&format_addr(address))
            .map(|&idx| &self.currencies[idx])
    }

    /// Symbols in matching order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.currencies.iter().map(|c| c.symbol.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

/// Normalise an address to lowercase with a `0x` prefix.
pub fn format_addr(addr: &str) -> String {
    let lower = addr.to_lowercase();
    if lower.starts_with("0x") {
        lower
    } else {
        format!("0x{}", lower)
    }
}
