//! Errors that abort a rebalance computation.
//!
//! Gaps in market or registry data are not errors; the affected strategy or
//! transfer is skipped. These variants cover inputs without which no correct
//! instruction can be produced.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no chain id configured for chain {0}")]
    MissingChainId(String),

    #[error("no bridge port configured for chain {0}")]
    MissingBridgePort(String),

    #[error("{amount} {currency} cannot be expressed in native units with {decimals} decimals")]
    NativeAmountOverflow {
        currency: String,
        amount: Decimal,
        decimals: u32,
    },

    #[error("allocation on {chain} did not converge within {rounds} rounds")]
    AllocationDidNotConverge { chain: String, rounds: u32 },
}
