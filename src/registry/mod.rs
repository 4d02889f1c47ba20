//! Reference data the engine reads but never mutates.
//!
//! - `currency`: currencies, their per-chain tokens, and symbol matching
//! - `strategy`: strategy records, composite strategy keys, and lookups

mod currency;
mod strategy;

pub use currency::{format_addr, Currency, CurrencyRegistry, Token};
pub use strategy::{InMemoryStrategyRegistry, Strategy, StrategyKey, StrategyRegistry};
