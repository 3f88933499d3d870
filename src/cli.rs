//! CLI argument parsing

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{Config, LogFormat, DEFAULT_CONFIG_PATH};
use crate::planner::MintPolicy;

#[derive(Parser, Debug)]
#[command(name = "airdrop-distributor")]
#[command(about = "Mint ERC-1155 airdrop allocations to every snapshot address still missing them", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, env = "AIRDROP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Snapshot JSON file mapping addresses to allocated amounts
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// RPC endpoint URL
    #[arg(short, long)]
    pub rpc_url: Option<String>,

    /// Airdrop contract address
    #[arg(long)]
    pub contract: Option<String>,

    /// Token id to distribute (decimal or 0x hex)
    #[arg(short, long)]
    pub token_id: Option<String>,

    /// Recipients per mint transaction
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// When a recipient counts as served
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Plan and report without sending transactions
    #[arg(long)]
    pub dry_run: bool,

    /// Append per-recipient JSON lines to this file
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<FormatArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    HasAny,
    Exact,
}

impl From<PolicyArg> for MintPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::HasAny => MintPolicy::HasAny,
            PolicyArg::Exact => MintPolicy::Exact,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => LogFormat::Text,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Command-line flags take precedence over file and environment settings
    pub fn apply(&self, config: &mut Config) {
        if let Some(snapshot) = &self.snapshot {
            config.distribution.snapshot_path = snapshot.clone();
        }
        if let Some(rpc_url) = &self.rpc_url {
            config.chain.rpc_url = rpc_url.clone();
        }
        if let Some(contract) = &self.contract {
            config.contract.address = contract.clone();
        }
        if let Some(token_id) = &self.token_id {
            config.contract.token_id = token_id.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.distribution.batch_size = batch_size;
        }
        if let Some(policy) = self.policy {
            config.distribution.policy = policy.into();
        }
        if self.dry_run {
            config.submission.dry_run = true;
        }
        if let Some(audit_log) = &self.audit_log {
            config.logging.audit_log = Some(audit_log.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const MINIMAL: &str = r#"
        [contract]
        address = "0x918eaa82ee6f07e46c82d04e34ebc352a56317c2"
        token_id = 4
    "#;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "airdrop-distributor",
            "--snapshot",
            "other.json",
            "--batch-size",
            "25",
            "--policy",
            "exact",
            "--token-id",
            "7",
            "--dry-run",
            "--log-format",
            "json",
        ])
        .unwrap();

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        cli.apply(&mut config);

        assert_eq!(config.distribution.snapshot_path, PathBuf::from("other.json"));
        assert_eq!(config.distribution.batch_size, 25);
        assert_eq!(config.distribution.policy, MintPolicy::Exact);
        assert_eq!(config.contract.token_id, "7");
        assert!(config.submission.dry_run);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_absent_flags_leave_config_untouched() {
        let cli = Cli::try_parse_from(["airdrop-distributor"]).unwrap();

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        cli.apply(&mut config);

        assert_eq!(config.distribution.batch_size, 100);
        assert_eq!(config.token_id().unwrap(), alloy_primitives::U256::from(4));
        assert!(!config.submission.dry_run);
    }
}
