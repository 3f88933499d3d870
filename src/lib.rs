//! Airdrop distributor
//!
//! Reads a snapshot of `address → amount`, checks what every address already
//! holds on an ERC-1155 airdrop contract, and mints the difference in
//! nonce-ordered batches. Runs are idempotent: a re-run after any failure only
//! mints to recipients that are still short.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod nonce;
pub mod oracle;
pub mod planner;
pub mod reporter;
pub mod retry;
pub mod runner;
pub mod snapshot;
pub mod submitter;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chain::{AirdropContract, AlloyAirdropContract, MintReceipt, MintRequest};
pub use config::Config;
pub use error::{AddressRange, AirdropError, AirdropResult, ChainError};
pub use planner::{Decision, MintPolicy, Plan, WorkItem};
pub use reporter::{ProgressReporter, RecipientStatus, RunSummary};
pub use runner::{AirdropRunner, RunOutcome, RunSettings, RunStatus};
pub use snapshot::{Allocation, Snapshot};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chain::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::planner::*;
    pub use crate::reporter::*;
    pub use crate::runner::*;
    pub use crate::snapshot::*;
}
