//! # Cross-Chain Rebalancer
//!
//! Decides when idle vault capital spread over several chains should be
//! rebalanced, and plans the bridge transfers and strategy investments that do
//! it. Execution of the plan is left to an external executor.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `registry`: Currency, token and strategy reference data
//! - `market`: Input API client and the per-run market snapshot
//! - `vault`: Per-run balance snapshot and vault strategy lookup
//! - `allocation`: Threshold gate, cross-chain balancer and investment allocator
//! - `persistence`: SQLite task store for computed plans
//! - `service`: One fetch-compute-persist run
//! - `utils`: Shared utilities and decimal arithmetic

pub mod allocation;
pub mod config;
pub mod market;
pub mod persistence;
pub mod registry;
pub mod service;
pub mod utils;
pub mod vault;

pub use config::Config;
