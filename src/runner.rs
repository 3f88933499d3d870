//! Distribution pipeline: snapshot → balances → plan → batches

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use tracing::{info, warn};

use crate::chain::AirdropContract;
use crate::config::Config;
use crate::error::{AirdropError, AirdropResult};
use crate::nonce::NonceCounter;
use crate::oracle::{BalanceOracle, DEFAULT_CHUNK_SIZE};
use crate::planner::{self, Decision, MintPolicy};
use crate::reporter::{ProgressReporter, RunSummary};
use crate::retry::RetryPolicy;
use crate::snapshot::Snapshot;
use crate::submitter::{partition, BatchSubmitter, SubmitterSettings};

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub token_id: U256,
    pub policy: MintPolicy,
    pub batch_size: usize,
    pub oracle_chunk_size: usize,
    pub oracle_concurrency: usize,
    pub read_retry: RetryPolicy,
    pub gas_limit: u64,
    pub price_multiplier_permille: u128,
    pub confirmation_timeout: Duration,
    pub required_confirmations: u64,
    pub dry_run: bool,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> AirdropResult<Self> {
        Ok(Self {
            token_id: config.token_id()?,
            policy: config.distribution.policy,
            batch_size: config.distribution.batch_size,
            oracle_chunk_size: DEFAULT_CHUNK_SIZE,
            oracle_concurrency: config.oracle.concurrency,
            read_retry: RetryPolicy::new(config.oracle.max_retries, config.retry_delay()),
            gas_limit: config.gas.limit,
            price_multiplier_permille: config.price_multiplier_permille(),
            confirmation_timeout: config.confirmation_timeout(),
            required_confirmations: config.submission.required_confirmations,
            dry_run: config.submission.dry_run,
        })
    }

    fn submitter_settings(&self) -> SubmitterSettings {
        SubmitterSettings {
            batch_size: self.batch_size,
            gas_limit: self.gas_limit,
            price_multiplier_permille: self.price_multiplier_permille,
            confirmation_timeout: self.confirmation_timeout,
            required_confirmations: self.required_confirmations,
            read_retry: self.read_retry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every recipient is satisfied or was sent its tokens
    Complete,
    /// Some recipients are still owed tokens; a re-run will pick them up
    Incomplete,
    /// Nothing was sent
    DryRun,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub summary: RunSummary,
    pub batches_sent: usize,
    /// First nonce this run would use or used
    pub start_nonce: Option<u64>,
}

pub struct AirdropRunner<C: ?Sized> {
    client: Arc<C>,
    settings: RunSettings,
}

impl<C: AirdropContract + ?Sized> AirdropRunner<C> {
    pub fn new(client: Arc<C>, settings: RunSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Load and validate the snapshot at `path`, then run. A malformed
    /// snapshot fails here before the chain is touched.
    pub async fn run_from_path<P: AsRef<Path>>(
        &self,
        path: P,
        reporter: &mut ProgressReporter,
    ) -> AirdropResult<RunOutcome> {
        let snapshot = Snapshot::load(path)?;
        self.run(&snapshot, reporter).await
    }

    /// Drive one distribution run. Safe to repeat: recipients already holding
    /// their threshold are never minted to again.
    ///
    /// Per-recipient outcomes go to `reporter`, which still holds a complete
    /// account when this returns an error.
    pub async fn run(&self, snapshot: &Snapshot, reporter: &mut ProgressReporter) -> AirdropResult<RunOutcome> {
        info!(
            "Starting distribution of token {} to {} recipients ({} units allocated, policy {})",
            self.settings.token_id,
            snapshot.len(),
            snapshot.total_amount(),
            self.settings.policy
        );

        let start_nonce = self.preflight().await?;

        let oracle = BalanceOracle::new(
            Arc::clone(&self.client),
            self.settings.oracle_chunk_size,
            self.settings.oracle_concurrency,
            self.settings.read_retry,
        );
        let chunks = oracle.query_chunks(&snapshot.addresses(), self.settings.token_id).await;
        for chunk in &chunks {
            if let Err(e) = &chunk.balances {
                reporter.record_error(e.to_string());
            }
        }

        let plan = planner::plan(snapshot.allocations(), &chunks, self.settings.token_id, self.settings.policy);

        let batch_size = self.settings.batch_size.max(1);
        let mut queued = 0usize;
        for decision in &plan.decisions {
            match decision {
                Decision::Satisfied { index, address, current_balance, target_amount } => {
                    reporter.satisfied(*index, *address, self.settings.token_id, *target_amount, *current_balance);
                }
                Decision::Mint(item) => {
                    reporter.queued(item, queued / batch_size);
                    queued += 1;
                }
                Decision::Unknown { index, address, target_amount, reason } => {
                    reporter.unknown(*index, *address, self.settings.token_id, *target_amount, reason);
                }
            }
        }

        let work = plan.work_items();
        let unknown = plan.unknown_count();

        if self.settings.dry_run {
            let batches = partition(&work, batch_size);
            for batch in &batches {
                info!(
                    "Dry run: batch {} would mint {} units to {} recipients, {}",
                    batch.index,
                    batch.total_amount(),
                    batch.items.len(),
                    batch.range()
                );
            }
            return Ok(RunOutcome {
                status: RunStatus::DryRun,
                summary: reporter.summary().clone(),
                batches_sent: 0,
                start_nonce,
            });
        }

        if work.is_empty() {
            info!("Nothing to mint");
        }

        let nonces = NonceCounter::new(start_nonce.unwrap_or_default());
        let mut submitter = BatchSubmitter::new(Arc::clone(&self.client), nonces, self.settings.submitter_settings());
        let report = submitter.submit_all(&work, reporter).await?;

        let status = if report.is_clean() && unknown == 0 {
            RunStatus::Complete
        } else {
            warn!(
                "Run incomplete: {} reverted batches, {} recipients with unknown balance",
                report.reverted.len(),
                unknown
            );
            RunStatus::Incomplete
        };

        Ok(RunOutcome {
            status,
            summary: reporter.summary().clone(),
            batches_sent: report.batches.len(),
            start_nonce,
        })
    }

    /// Log the signer's standing and read the nonce the first batch will use.
    /// The nonce read is skipped on a dry run since there may be no signer.
    async fn preflight(&self) -> AirdropResult<Option<u64>> {
        let signer = self.client.signer_address();

        if self.settings.dry_run {
            info!("Dry run: no transactions will be sent");
            return Ok(None);
        }

        info!("Signer: {}", signer);

        match self.client.native_balance(signer).await {
            Ok(balance) if balance.is_zero() => warn!("Signer {} has no native balance to pay for gas", signer),
            Ok(balance) => info!("Signer balance: {} wei", balance),
            Err(e) => warn!("Could not read signer balance: {}", e),
        }

        let nonce = self.client.pending_nonce().await.map_err(AirdropError::Chain)?;
        info!("Starting nonce: {}", nonce);
        Ok(Some(nonce))
    }
}
