//! Market and vault inputs for a rebalance run.
//!
//! - `types`: wire types of the rebalance-input and pool-info endpoints
//! - `snapshot`: per-run APR / TVL / reward / price snapshot keyed by strategy
//! - `client`: HTTP client fetching the inputs

mod client;
mod snapshot;
mod types;

pub use client::{InputClient, InputSource};
#[cfg(test)]
pub use client::MockInputSource;
pub use snapshot::{MarketSnapshot, PoolMetrics, ProjectPools};
pub use types::*;
