//! Batch Submitter: sequential, nonce-ordered mint batches

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, TxHash, U256};
use tracing::{error, info, warn};

use crate::chain::{AirdropContract, MintRequest};
use crate::error::{AddressRange, AirdropError, AirdropResult, ChainError};
use crate::nonce::NonceCounter;
use crate::oracle::address_range;
use crate::planner::WorkItem;
use crate::reporter::{FailureContext, ProgressReporter};
use crate::retry::RetryPolicy;

/// Reason attached to recipients whose batch was never sent
pub const ABORTED_BEFORE_SUBMISSION: &str = "run aborted before submission";

/// Consecutive work items sent as one `mintManyUpTo` call
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    pub index: usize,
    pub items: &'a [WorkItem],
}

impl Batch<'_> {
    pub fn addresses(&self) -> Vec<Address> {
        self.items.iter().map(|i| i.address).collect()
    }

    pub fn token_ids(&self) -> Vec<U256> {
        self.items.iter().map(|i| i.token_id).collect()
    }

    pub fn amounts(&self) -> Vec<U256> {
        self.items.iter().map(|i| i.shortfall).collect()
    }

    pub fn total_amount(&self) -> U256 {
        self.items.iter().fold(U256::ZERO, |acc, i| acc.saturating_add(i.shortfall))
    }

    /// Snapshot positions and addresses covered by this batch
    pub fn range(&self) -> AddressRange {
        let start = self.items.first().map(|i| i.index).unwrap_or_default();
        let mut range = address_range(start, &self.addresses());
        range.end = self.items.last().map(|i| i.index).unwrap_or(start);
        range
    }
}

/// Split the work list into batches of at most `batch_size`, preserving order.
/// Every item lands in exactly one batch.
pub fn partition(items: &[WorkItem], batch_size: usize) -> Vec<Batch<'_>> {
    items
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, items)| Batch { index, items })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SubmitterSettings {
    pub batch_size: usize,
    pub gas_limit: u64,
    /// Multiplier on the node's gas price, in thousandths
    pub price_multiplier_permille: u128,
    pub confirmation_timeout: Duration,
    pub required_confirmations: u64,
    /// Applied to gas price quotes only
    pub read_retry: RetryPolicy,
}

/// How a dispatched batch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Confirmed { block_number: Option<u64>, gas_used: u64 },
    Reverted { gas_used: u64 },
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub index: usize,
    pub nonce: u64,
    pub tx_hash: TxHash,
    pub recipients: usize,
    pub status: BatchStatus,
}

/// Outcome of a submission run that was not aborted
#[derive(Debug, Default)]
pub struct SubmissionReport {
    pub batches: Vec<BatchResult>,
    /// One `ConfirmationReverted` per reverted batch
    pub reverted: Vec<AirdropError>,
}

impl SubmissionReport {
    pub fn confirmed_count(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b.status, BatchStatus::Confirmed { .. }))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.reverted.is_empty()
    }
}

pub struct BatchSubmitter<C: ?Sized> {
    client: Arc<C>,
    nonces: NonceCounter,
    settings: SubmitterSettings,
}

impl<C: AirdropContract + ?Sized> BatchSubmitter<C> {
    pub fn new(client: Arc<C>, nonces: NonceCounter, settings: SubmitterSettings) -> Self {
        Self {
            client,
            nonces,
            settings,
        }
    }

    pub fn nonces(&self) -> &NonceCounter {
        &self.nonces
    }

    /// Send every batch in order, waiting for each receipt before the next
    /// send. A reverted batch is recorded and the run goes on. A batch that
    /// could not be sent, or whose receipt never arrived, stops the run: it
    /// and every later batch are reported failed and `SubmissionFailed` is
    /// returned.
    pub async fn submit_all(
        &mut self,
        items: &[WorkItem],
        reporter: &mut ProgressReporter,
    ) -> AirdropResult<SubmissionReport> {
        let batches = partition(items, self.settings.batch_size);
        let mut report = SubmissionReport::default();

        info!(
            "Submitting {} recipients in {} batches starting at nonce {}",
            items.len(),
            batches.len(),
            self.nonces.peek()
        );

        for (position, batch) in batches.iter().enumerate() {
            match self.submit_batch(batch, reporter).await {
                Ok((result, reverted)) => {
                    report.batches.push(result);
                    report.reverted.extend(reverted);
                }
                Err(e) => {
                    reporter.record_error(e.to_string());
                    let remaining = &batches[position + 1..];
                    if !remaining.is_empty() {
                        warn!(
                            "Aborting: {} batches ({} recipients) left unsent",
                            remaining.len(),
                            remaining.iter().map(|b| b.items.len()).sum::<usize>()
                        );
                    }
                    for later in remaining {
                        let context = FailureContext {
                            batch: Some(later.index),
                            ..Default::default()
                        };
                        for item in later.items {
                            reporter.failed(item, context, ABORTED_BEFORE_SUBMISSION);
                        }
                    }
                    return Err(e);
                }
            }
        }

        info!(
            "Submission finished: {} batches confirmed, {} reverted, {} nonces used",
            report.confirmed_count(),
            report.reverted.len(),
            self.nonces.consumed()
        );
        Ok(report)
    }

    async fn submit_batch(
        &mut self,
        batch: &Batch<'_>,
        reporter: &mut ProgressReporter,
    ) -> AirdropResult<(BatchResult, Option<AirdropError>)> {
        let nonce = self.nonces.peek();

        let gas_price = match self.quote_gas_price().await {
            Ok(price) => price,
            Err(source) => return Err(self.abort(batch, nonce, None, source, reporter)),
        };

        let request = MintRequest {
            to: batch.addresses(),
            ids: batch.token_ids(),
            amounts: batch.amounts(),
            nonce,
            gas_limit: self.settings.gas_limit,
            gas_price,
        };

        info!(
            "Sending batch {} with nonce {}: {} recipients, {} units, {}",
            batch.index,
            nonce,
            batch.items.len(),
            batch.total_amount(),
            batch.range()
        );

        let tx_hash = match self.client.send_mint_many(&request).await {
            Ok(hash) => hash,
            Err(source) => return Err(self.abort(batch, nonce, None, source, reporter)),
        };
        self.nonces.commit(nonce);
        info!("Batch {} sent: {}", batch.index, tx_hash);

        let receipt = match self
            .client
            .wait_for_receipt(
                tx_hash,
                self.settings.confirmation_timeout,
                self.settings.required_confirmations,
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(source) => return Err(self.abort(batch, nonce, Some(tx_hash), source, reporter)),
        };

        if receipt.success {
            for item in batch.items {
                reporter.sent(item, batch.index, nonce, tx_hash);
            }
            reporter.batch_confirmed(batch.index, receipt.gas_used);

            return Ok((
                BatchResult {
                    index: batch.index,
                    nonce,
                    tx_hash,
                    recipients: batch.items.len(),
                    status: BatchStatus::Confirmed {
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                    },
                },
                None,
            ));
        }

        let reverted = AirdropError::ConfirmationReverted {
            batch: batch.index,
            nonce,
            tx_hash,
            range: batch.range(),
        };
        let context = FailureContext {
            batch: Some(batch.index),
            nonce: Some(nonce),
            tx_hash: Some(tx_hash),
        };
        let reason = reverted.to_string();
        for item in batch.items {
            reporter.failed(item, context, &reason);
        }
        reporter.batch_reverted(batch.index, receipt.gas_used, reason);

        Ok((
            BatchResult {
                index: batch.index,
                nonce,
                tx_hash,
                recipients: batch.items.len(),
                status: BatchStatus::Reverted {
                    gas_used: receipt.gas_used,
                },
            },
            Some(reverted),
        ))
    }

    async fn quote_gas_price(&self) -> Result<u128, ChainError> {
        let quoted = self
            .settings
            .read_retry
            .run("gas price", || {
                let client = Arc::clone(&self.client);
                async move { client.gas_price().await }
            })
            .await?;

        let price = quoted.saturating_mul(self.settings.price_multiplier_permille) / 1000;
        if price != quoted {
            info!("Gas price {} scaled to {}", quoted, price);
        }
        Ok(price)
    }

    /// Report the batch failed and build the error that stops the run
    fn abort(
        &self,
        batch: &Batch<'_>,
        nonce: u64,
        tx_hash: Option<TxHash>,
        source: ChainError,
        reporter: &mut ProgressReporter,
    ) -> AirdropError {
        let err = AirdropError::SubmissionFailed {
            batch: batch.index,
            nonce,
            range: batch.range(),
            source,
        };
        error!("{}", err);

        let context = FailureContext {
            batch: Some(batch.index),
            nonce: Some(nonce),
            tx_hash,
        };
        let reason = err.to_string();
        for item in batch.items {
            reporter.failed(item, context, &reason);
        }
        err
    }
}
