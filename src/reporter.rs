//! Progress Reporter: the operator's per-recipient audit trail

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use alloy_primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::AirdropResult;
use crate::planner::WorkItem;

/// Keep at most this many error messages in the summary
const MAX_SUMMARY_ERRORS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    /// Balance already at or above threshold
    Satisfied,
    /// Included in a batch
    Queued,
    /// Batch confirmed
    Sent,
    /// Balance unknown, batch reverted, or batch never confirmed
    Failed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Satisfied => "satisfied",
            RecipientStatus::Queued => "queued",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Failed => "failed",
        }
    }
}

/// One audit log line
#[derive(Debug, Clone, Serialize)]
pub struct RecipientEvent {
    pub timestamp: DateTime<Utc>,
    pub status: RecipientStatus,
    /// Position in the snapshot
    pub index: usize,
    pub address: Address,
    pub token_id: String,
    /// Units to mint for queued, sent and failed recipients; the allocation
    /// for satisfied ones and for those whose balance is unknown
    pub amount: String,
    /// On-chain holding when it was read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Where a failed recipient's batch stood when it failed
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureContext {
    pub batch: Option<usize>,
    pub nonce: Option<u64>,
    pub tx_hash: Option<TxHash>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub satisfied: u64,
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
    pub batches_confirmed: u64,
    pub batches_reverted: u64,
    pub total_gas_used: u64,
    /// Units confirmed on chain by this run
    pub minted_units: U256,
    pub errors: Vec<String>,
}

impl RunSummary {
    fn record_error(&mut self, error: String) {
        if self.errors.len() < MAX_SUMMARY_ERRORS {
            self.errors.push(error);
        }
    }

    /// Recipients with a terminal outcome: satisfied, sent or failed
    pub fn accounted(&self) -> u64 {
        self.satisfied + self.sent + self.failed
    }

    pub fn print(&self) {
        println!("{}", "═══════════════════════════════════════".bright_cyan());
        println!("{}", "Airdrop Run Summary".bright_green().bold());
        println!("{}", "═══════════════════════════════════════".bright_cyan());
        println!();

        println!("{}", "Recipients:".bright_yellow());
        println!("  Already satisfied: {}", self.satisfied);
        println!("  Queued: {}", self.queued);
        println!("  Sent: {}", self.sent);
        println!("  Failed: {}", self.failed);
        println!();

        println!("{}", "Batches:".bright_yellow());
        println!("  Confirmed: {}", self.batches_confirmed);
        println!("  Reverted: {}", self.batches_reverted);
        println!("  Total Gas: {}", self.total_gas_used);
        println!("  Units Minted: {}", self.minted_units);
        println!();

        if !self.errors.is_empty() {
            println!("{}", "Errors:".bright_red());
            for (i, error) in self.errors.iter().take(10).enumerate() {
                println!("  {}. {}", i + 1, error);
            }
            if self.errors.len() > 10 {
                println!("  ... and {} more", self.errors.len() - 10);
            }
            println!();
        }

        println!("{}", "═══════════════════════════════════════".bright_cyan());
    }
}

/// Emits exactly one terminal line (satisfied, sent or failed) per recipient,
/// plus a `queued` line for every recipient put in a batch. Each line goes to
/// `tracing` and, when configured, to a JSON-lines audit file.
pub struct ProgressReporter {
    audit: Option<BufWriter<File>>,
    summary: RunSummary,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            audit: None,
            summary: RunSummary::default(),
        }
    }

    /// Append events to `path`; earlier runs' lines are kept
    pub fn with_audit_log<P: AsRef<Path>>(path: P) -> AirdropResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        info!("Writing audit log to {}", path.as_ref().display());
        Ok(Self {
            audit: Some(BufWriter::new(file)),
            summary: RunSummary::default(),
        })
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn satisfied(
        &mut self,
        index: usize,
        address: Address,
        token_id: U256,
        allocated: U256,
        current_balance: U256,
    ) {
        self.summary.satisfied += 1;
        info!(
            status = "satisfied",
            index,
            %address,
            allocated = %allocated,
            balance = %current_balance,
            "Recipient already satisfied"
        );
        self.write(RecipientEvent {
            timestamp: Utc::now(),
            status: RecipientStatus::Satisfied,
            index,
            address,
            token_id: token_id.to_string(),
            amount: allocated.to_string(),
            balance: Some(current_balance.to_string()),
            batch: None,
            nonce: None,
            tx_hash: None,
            reason: None,
        });
    }

    pub fn queued(&mut self, item: &WorkItem, batch: usize) {
        self.summary.queued += 1;
        info!(
            status = "queued",
            index = item.index,
            address = %item.address,
            amount = %item.shortfall,
            balance = %item.current_balance,
            allocated = %item.target_amount,
            batch,
            "Recipient queued for minting"
        );
        self.write(RecipientEvent {
            timestamp: Utc::now(),
            status: RecipientStatus::Queued,
            index: item.index,
            address: item.address,
            token_id: item.token_id.to_string(),
            amount: item.shortfall.to_string(),
            balance: Some(item.current_balance.to_string()),
            batch: Some(batch),
            nonce: None,
            tx_hash: None,
            reason: None,
        });
    }

    pub fn sent(&mut self, item: &WorkItem, batch: usize, nonce: u64, tx_hash: TxHash) {
        self.summary.sent += 1;
        self.summary.minted_units = self.summary.minted_units.saturating_add(item.shortfall);
        info!(
            status = "sent",
            index = item.index,
            address = %item.address,
            amount = %item.shortfall,
            batch,
            nonce,
            %tx_hash,
            "Recipient minted"
        );
        self.write(RecipientEvent {
            timestamp: Utc::now(),
            status: RecipientStatus::Sent,
            index: item.index,
            address: item.address,
            token_id: item.token_id.to_string(),
            amount: item.shortfall.to_string(),
            balance: None,
            batch: Some(batch),
            nonce: Some(nonce),
            tx_hash: Some(tx_hash),
            reason: None,
        });
    }

    /// Failure of a recipient whose balance could not be read
    pub fn unknown(&mut self, index: usize, address: Address, token_id: U256, allocated: U256, reason: &str) {
        self.failed_with(index, address, token_id, allocated, FailureContext::default(), reason);
    }

    /// Failure of a queued recipient
    pub fn failed(&mut self, item: &WorkItem, context: FailureContext, reason: &str) {
        self.failed_with(item.index, item.address, item.token_id, item.shortfall, context, reason);
    }

    fn failed_with(
        &mut self,
        index: usize,
        address: Address,
        token_id: U256,
        amount: U256,
        context: FailureContext,
        reason: &str,
    ) {
        self.summary.failed += 1;
        warn!(
            status = "failed",
            index,
            %address,
            %amount,
            batch = ?context.batch,
            nonce = ?context.nonce,
            tx_hash = ?context.tx_hash,
            reason,
            "Recipient not served"
        );
        self.write(RecipientEvent {
            timestamp: Utc::now(),
            status: RecipientStatus::Failed,
            index,
            address,
            token_id: token_id.to_string(),
            amount: amount.to_string(),
            balance: None,
            batch: context.batch,
            nonce: context.nonce,
            tx_hash: context.tx_hash,
            reason: Some(reason.to_string()),
        });
    }

    pub fn batch_confirmed(&mut self, batch: usize, gas_used: u64) {
        self.summary.batches_confirmed += 1;
        self.summary.total_gas_used += gas_used;
        info!(batch, gas_used, "Batch confirmed");
    }

    pub fn batch_reverted(&mut self, batch: usize, gas_used: u64, error: String) {
        self.summary.batches_reverted += 1;
        self.summary.total_gas_used += gas_used;
        error!(batch, gas_used, "{}", error);
        self.summary.record_error(error);
    }

    /// Errors that are not tied to a single batch outcome (oracle chunks, aborts)
    pub fn record_error(&mut self, error: String) {
        self.summary.record_error(error);
    }

    fn write(&mut self, event: RecipientEvent) {
        let Some(audit) = self.audit.as_mut() else {
            return;
        };

        let result = serde_json::to_writer(&mut *audit, &event)
            .map_err(std::io::Error::from)
            .and_then(|_| audit.write_all(b"\n"));

        if let Err(e) = result {
            error!("Failed to write audit log entry for {}: {}", event.address, e);
        }
    }

    /// Flush the audit log and hand back the totals
    pub fn finish(&mut self) -> AirdropResult<RunSummary> {
        if let Some(audit) = self.audit.as_mut() {
            audit.flush()?;
        }
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(byte: u8, index: usize) -> WorkItem {
        WorkItem {
            index,
            address: Address::repeat_byte(byte),
            token_id: U256::from(4),
            current_balance: U256::ZERO,
            target_amount: U256::from(1),
            shortfall: U256::from(1),
        }
    }

    #[test]
    fn test_counts_follow_events() {
        let mut reporter = ProgressReporter::new();
        let a = item(0xa, 0);
        let b = item(0xb, 1);

        reporter.satisfied(2, Address::repeat_byte(0xc), U256::from(4), U256::from(1), U256::from(1));
        reporter.queued(&a, 0);
        reporter.queued(&b, 0);
        reporter.sent(&a, 0, 7, TxHash::ZERO);
        reporter.failed(&b, FailureContext { batch: Some(0), nonce: Some(7), tx_hash: None }, "reverted");
        reporter.batch_confirmed(0, 21_000);

        let summary = reporter.finish().unwrap();
        assert_eq!(summary.satisfied, 1);
        assert_eq!(summary.queued, 2);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.accounted(), 3);
        assert_eq!(summary.total_gas_used, 21_000);
        assert_eq!(summary.minted_units, U256::from(1));
    }

    #[test]
    fn test_audit_log_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut reporter = ProgressReporter::with_audit_log(&path).unwrap();
        reporter.queued(&item(0xa, 3), 1);
        reporter.unknown(4, Address::repeat_byte(0xb), U256::from(4), U256::from(1), "rpc down");
        reporter.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "queued");
        assert_eq!(lines[0]["index"], 3);
        assert_eq!(lines[0]["batch"], 1);
        assert_eq!(lines[0]["amount"], "1");
        assert!(lines[0].get("reason").is_none());
        assert_eq!(lines[1]["status"], "failed");
        assert_eq!(lines[1]["reason"], "rpc down");
    }

    #[test]
    fn test_satisfied_line_separates_allocation_from_balance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut reporter = ProgressReporter::with_audit_log(&path).unwrap();
        reporter.satisfied(0, Address::repeat_byte(0xa), U256::from(4), U256::from(5), U256::from(9));
        reporter.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line["status"], "satisfied");
        assert_eq!(line["amount"], "5");
        assert_eq!(line["balance"], "9");
    }

    #[test]
    fn test_audit_log_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for _ in 0..2 {
            let mut reporter = ProgressReporter::with_audit_log(&path).unwrap();
            reporter.satisfied(0, Address::repeat_byte(0xa), U256::from(1), U256::from(1), U256::from(1));
            reporter.finish().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
