//! Balance Oracle: batched, order-preserving on-chain balance reads

use std::ops::Range;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};

use crate::chain::AirdropContract;
use crate::error::{AddressRange, AirdropError, AirdropResult, ChainError};
use crate::retry::RetryPolicy;

/// Default number of addresses per `balanceOfBatch` call
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Result of one chunk query, tagged with the slice of the input it covers
#[derive(Debug)]
pub struct ChunkBalances {
    pub range: Range<usize>,
    pub balances: AirdropResult<Vec<U256>>,
}

pub struct BalanceOracle<C: ?Sized> {
    client: Arc<C>,
    chunk_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
}

impl<C: AirdropContract + ?Sized> BalanceOracle<C> {
    pub fn new(client: Arc<C>, chunk_size: usize, concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
            concurrency: concurrency.max(1),
            retry,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Balances for every address, in input order. Fails if any chunk fails.
    pub async fn query_balances(&self, addresses: &[Address], token_id: U256) -> AirdropResult<Vec<U256>> {
        let mut balances = Vec::with_capacity(addresses.len());
        for chunk in self.query_chunks(addresses, token_id).await {
            balances.extend(chunk.balances?);
        }
        Ok(balances)
    }

    /// Query every chunk, up to `concurrency` at a time. A failed chunk does
    /// not affect the others; results come back in input order.
    pub async fn query_chunks(&self, addresses: &[Address], token_id: U256) -> Vec<ChunkBalances> {
        let chunks: Vec<(usize, &[Address])> = addresses
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(i, chunk)| (i * self.chunk_size, chunk))
            .collect();

        info!(
            "Querying balances of token {} for {} addresses in {} chunks",
            token_id,
            addresses.len(),
            chunks.len()
        );

        stream::iter(chunks)
            .map(|(start, accounts)| self.query_chunk(start, accounts, token_id))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn query_chunk(&self, start: usize, accounts: &[Address], token_id: U256) -> ChunkBalances {
        let range = start..start + accounts.len();
        let ids = vec![token_id; accounts.len()];

        let result = self
            .retry
            .run("balanceOfBatch", || {
                let client = Arc::clone(&self.client);
                let accounts = accounts.to_vec();
                let ids = ids.clone();
                async move { client.balance_of_batch(accounts, ids).await }
            })
            .await
            .and_then(|balances| {
                if balances.len() == accounts.len() {
                    Ok(balances)
                } else {
                    Err(ChainError::InvalidResponse(format!(
                        "expected {} balances, got {}",
                        accounts.len(),
                        balances.len()
                    )))
                }
            });

        let balances = match result {
            Ok(balances) => {
                debug!("Balance chunk {:?} queried", range);
                Ok(balances)
            }
            Err(source) => {
                let range = address_range(start, accounts);
                error!("Balance query failed for {}: {}", range, source);
                Err(AirdropError::OracleQueryFailed { range, source })
            }
        };

        ChunkBalances { range, balances }
    }
}

/// Diagnostic range for a non-empty slice starting at snapshot index `start`
pub(crate) fn address_range(start: usize, addresses: &[Address]) -> AddressRange {
    AddressRange {
        start,
        end: start + addresses.len().saturating_sub(1),
        first: addresses.first().copied().unwrap_or_default(),
        last: addresses.last().copied().unwrap_or_default(),
    }
}
