//! Delta Planner: allocation vs. on-chain balance → minimal mint work list

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::oracle::ChunkBalances;
use crate::snapshot::Allocation;

/// How much a recipient must hold before it counts as served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MintPolicy {
    /// Holding any unit satisfies the recipient; one unit is minted otherwise
    #[default]
    HasAny,
    /// Balance is topped up to the full allocated amount
    Exact,
}

impl MintPolicy {
    /// Balance at or above which a recipient is satisfied. A zero allocation
    /// is satisfied by any balance.
    pub fn threshold(&self, allocated: U256) -> U256 {
        match self {
            MintPolicy::HasAny => allocated.min(U256::from(1)),
            MintPolicy::Exact => allocated,
        }
    }

    /// Amount to mint so the recipient reaches its threshold
    pub fn shortfall(&self, allocated: U256, current: U256) -> U256 {
        self.threshold(allocated).saturating_sub(current)
    }
}

impl std::fmt::Display for MintPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MintPolicy::HasAny => f.write_str("has-any"),
            MintPolicy::Exact => f.write_str("exact"),
        }
    }
}

/// A recipient still owed tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    /// Position in the snapshot
    pub index: usize,
    pub address: Address,
    pub token_id: U256,
    pub current_balance: U256,
    pub target_amount: U256,
    pub shortfall: U256,
}

/// Per-recipient planning outcome, in snapshot order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Satisfied {
        index: usize,
        address: Address,
        current_balance: U256,
        target_amount: U256,
    },
    Mint(WorkItem),
    /// Balance could not be read; nothing is queued for this recipient
    Unknown {
        index: usize,
        address: Address,
        target_amount: U256,
        reason: String,
    },
}

impl Decision {
    pub fn address(&self) -> Address {
        match self {
            Decision::Satisfied { address, .. } | Decision::Unknown { address, .. } => *address,
            Decision::Mint(item) => item.address,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub decisions: Vec<Decision>,
}

impl Plan {
    /// Work items in snapshot order
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.decisions
            .iter()
            .filter_map(|d| match d {
                Decision::Mint(item) => Some(*item),
                _ => None,
            })
            .collect()
    }

    pub fn satisfied_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d, Decision::Satisfied { .. }))
            .count()
    }

    pub fn unknown_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d, Decision::Unknown { .. }))
            .count()
    }

    pub fn total_shortfall(&self) -> U256 {
        self.work_items()
            .iter()
            .fold(U256::ZERO, |acc, item| acc.saturating_add(item.shortfall))
    }
}

/// Compare allocations with the oracle's chunked balances. `chunks` must cover
/// `allocations` in order, as `BalanceOracle::query_chunks` returns them.
pub fn plan(
    allocations: &[Allocation],
    chunks: &[ChunkBalances],
    token_id: U256,
    policy: MintPolicy,
) -> Plan {
    let mut decisions = Vec::with_capacity(allocations.len());

    for chunk in chunks {
        let slice = &allocations[chunk.range.clone()];

        match &chunk.balances {
            Ok(balances) => {
                for ((offset, allocation), balance) in slice.iter().enumerate().zip(balances) {
                    let index = chunk.range.start + offset;
                    let shortfall = policy.shortfall(allocation.amount, *balance);

                    if shortfall.is_zero() {
                        decisions.push(Decision::Satisfied {
                            index,
                            address: allocation.address,
                            current_balance: *balance,
                            target_amount: allocation.amount,
                        });
                    } else {
                        decisions.push(Decision::Mint(WorkItem {
                            index,
                            address: allocation.address,
                            token_id,
                            current_balance: *balance,
                            target_amount: allocation.amount,
                            shortfall,
                        }));
                    }
                }
            }
            Err(e) => {
                let reason = e.to_string();
                for (offset, allocation) in slice.iter().enumerate() {
                    decisions.push(Decision::Unknown {
                        index: chunk.range.start + offset,
                        address: allocation.address,
                        target_amount: allocation.amount,
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    let plan = Plan { decisions };
    info!(
        "Planned {} recipients: {} need minting ({} units), {} already satisfied, {} unknown",
        allocations.len(),
        plan.work_items().len(),
        plan.total_shortfall(),
        plan.satisfied_count(),
        plan.unknown_count()
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AddressRange, AirdropError, ChainError};

    fn alloc(byte: u8, amount: u64) -> Allocation {
        Allocation {
            address: Address::repeat_byte(byte),
            amount: U256::from(amount),
        }
    }

    fn ok_chunk(range: std::ops::Range<usize>, balances: &[u64]) -> ChunkBalances {
        ChunkBalances {
            range,
            balances: Ok(balances.iter().map(|b| U256::from(*b)).collect()),
        }
    }

    #[test]
    fn test_policy_thresholds() {
        let has_any = MintPolicy::HasAny;
        assert_eq!(has_any.shortfall(U256::from(5), U256::ZERO), U256::from(1));
        assert_eq!(has_any.shortfall(U256::from(5), U256::from(1)), U256::ZERO);
        assert_eq!(has_any.shortfall(U256::ZERO, U256::ZERO), U256::ZERO);

        let exact = MintPolicy::Exact;
        assert_eq!(exact.shortfall(U256::from(5), U256::from(2)), U256::from(3));
        assert_eq!(exact.shortfall(U256::from(5), U256::from(9)), U256::ZERO);
    }

    #[test]
    fn test_work_item_iff_below_threshold() {
        let allocations = vec![alloc(0xa, 1), alloc(0xb, 1), alloc(0xc, 1), alloc(0xd, 3)];
        let chunks = vec![ok_chunk(0..2, &[1, 0]), ok_chunk(2..4, &[0, 7])];

        let plan = plan(&allocations, &chunks, U256::from(4), MintPolicy::HasAny);
        let items = plan.work_items();

        let addresses: Vec<Address> = items.iter().map(|i| i.address).collect();
        assert_eq!(addresses, vec![Address::repeat_byte(0xb), Address::repeat_byte(0xc)]);
        assert!(items.iter().all(|i| i.shortfall == U256::from(1) && i.token_id == U256::from(4)));
        assert_eq!(plan.satisfied_count(), 2);
        assert_eq!(items[0].index, 1);
        assert_eq!(items[1].index, 2);
    }

    #[test]
    fn test_exact_policy_tops_up() {
        let allocations = vec![alloc(0xa, 10), alloc(0xb, 10)];
        let chunks = vec![ok_chunk(0..2, &[4, 10])];

        let plan = plan(&allocations, &chunks, U256::from(1), MintPolicy::Exact);
        let items = plan.work_items();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].shortfall, U256::from(6));
        assert_eq!(items[0].current_balance, U256::from(4));
        assert_eq!(items[0].target_amount, U256::from(10));
    }

    #[test]
    fn test_failed_chunk_marks_unknown() {
        let allocations = vec![alloc(0xa, 1), alloc(0xb, 1), alloc(0xc, 1)];
        let chunks = vec![
            ok_chunk(0..1, &[0]),
            ChunkBalances {
                range: 1..3,
                balances: Err(AirdropError::OracleQueryFailed {
                    range: AddressRange {
                        start: 1,
                        end: 2,
                        first: Address::repeat_byte(0xb),
                        last: Address::repeat_byte(0xc),
                    },
                    source: ChainError::Rpc("timeout".into()),
                }),
            },
        ];

        let plan = plan(&allocations, &chunks, U256::from(1), MintPolicy::HasAny);

        assert_eq!(plan.decisions.len(), 3);
        assert_eq!(plan.work_items().len(), 1);
        assert_eq!(plan.unknown_count(), 2);
        assert!(matches!(&plan.decisions[2], Decision::Unknown { index: 2, reason, .. } if reason.contains("timeout")));
    }

    #[test]
    fn test_order_is_stable() {
        let allocations: Vec<Allocation> = (1..=20).map(|b| alloc(b, 1)).collect();
        let balances: Vec<u64> = (0..20).map(|i| (i % 3 == 0) as u64).collect();
        let chunks = vec![ok_chunk(0..20, &balances)];

        let first = plan(&allocations, &chunks, U256::from(1), MintPolicy::HasAny);
        let second = plan(&allocations, &chunks, U256::from(1), MintPolicy::HasAny);

        assert_eq!(first.work_items(), second.work_items());
        let indices: Vec<usize> = first.work_items().iter().map(|i| i.index).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted);
    }
}
