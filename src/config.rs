use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{AirdropError, AirdropResult};
use crate::planner::MintPolicy;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain: ChainConfig,
    pub contract: ContractConfig,
    pub distribution: DistributionConfig,
    pub gas: GasConfig,
    pub oracle: OracleConfig,
    pub submission: SubmissionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(default)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Airdrop contract exposing `balanceOfBatch` and `mintManyUpTo`
    pub address: String,
    /// Token id minted to every recipient, decimal or `0x` hex. A TOML
    /// integer works for small ids; ids past 64 bits must be quoted.
    pub token_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub snapshot_path: PathBuf,
    pub batch_size: usize,
    pub policy: MintPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Fixed gas limit attached to every mint batch
    pub limit: u64,
    /// Multiplier applied to the node's gas price quote
    pub price_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Number of balance chunks queried in parallel
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub confirmation_timeout_secs: u64,
    pub required_confirmations: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from defaults, the given TOML file (optional when it
    /// does not exist), and `AIRDROP_SECTION__KEY` environment variables.
    pub fn load(path: &Path) -> AirdropResult<Self> {
        // `.env` entries become plain environment variables
        dotenv::dotenv().ok();

        let config_builder = Self::with_defaults(config::Config::builder())?
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("AIRDROP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: Config = config_builder.try_deserialize()?;

        if config.chain.private_key.is_none() {
            config.chain.private_key = std::env::var("PRIVATE_KEY").ok();
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string on top of the defaults
    pub fn from_toml_str(content: &str) -> AirdropResult<Self> {
        let config_builder = Self::with_defaults(config::Config::builder())?
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?;

        Ok(config_builder.try_deserialize()?)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> AirdropResult<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(builder
            .set_default("chain.rpc_url", "http://localhost:8545")?
            .set_default("chain.chain_id", 1)?
            .set_default("contract.token_id", "0")?
            .set_default("distribution.snapshot_path", "snapshot.json")?
            .set_default("distribution.batch_size", 100)?
            .set_default("distribution.policy", "has-any")?
            .set_default("gas.limit", 5_000_000)?
            .set_default("gas.price_multiplier", 1.0)?
            .set_default("oracle.concurrency", 4)?
            .set_default("oracle.max_retries", 3)?
            .set_default("oracle.retry_delay_ms", 1000)?
            .set_default("submission.confirmation_timeout_secs", 300)?
            .set_default("submission.required_confirmations", 1)?
            .set_default("submission.dry_run", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?)
    }

    /// Reject configurations that cannot drive a run
    pub fn validate(&self) -> AirdropResult<()> {
        if self.distribution.batch_size == 0 {
            return Err(AirdropError::Config("distribution.batch_size must be greater than zero".into()));
        }
        if self.gas.limit == 0 {
            return Err(AirdropError::Config("gas.limit must be greater than zero".into()));
        }
        if !self.gas.price_multiplier.is_finite() || self.gas.price_multiplier <= 0.0 {
            return Err(AirdropError::Config(format!(
                "gas.price_multiplier must be a positive number, got {}",
                self.gas.price_multiplier
            )));
        }
        if self.oracle.concurrency == 0 {
            return Err(AirdropError::Config("oracle.concurrency must be greater than zero".into()));
        }
        if self.submission.confirmation_timeout_secs == 0 {
            return Err(AirdropError::Config(
                "submission.confirmation_timeout_secs must be greater than zero".into(),
            ));
        }

        if self.price_multiplier_permille() == 0 {
            return Err(AirdropError::Config(format!(
                "gas.price_multiplier {} rounds to a zero gas price; the smallest usable value is 0.001",
                self.gas.price_multiplier
            )));
        }

        self.contract_address()?;
        self.token_id()?;

        if !self.submission.dry_run && self.private_key().is_err() {
            return Err(AirdropError::Config(
                "chain.private_key (or PRIVATE_KEY) is required unless running with dry_run".into(),
            ));
        }

        Ok(())
    }

    pub fn contract_address(&self) -> AirdropResult<Address> {
        Address::from_str(self.contract.address.trim())
            .map_err(|e| AirdropError::Config(format!("Invalid contract address '{}': {}", self.contract.address, e)))
    }

    pub fn private_key(&self) -> AirdropResult<&str> {
        self.chain
            .private_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AirdropError::Config("private key not configured".into()))
    }

    pub fn token_id(&self) -> AirdropResult<U256> {
        let raw = self.contract.token_id.trim();
        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => U256::from_str_radix(hex, 16),
            None => U256::from_str_radix(raw, 10),
        };
        parsed.map_err(|e| AirdropError::Config(format!("Invalid token id '{}': {}", self.contract.token_id, e)))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.submission.confirmation_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.oracle.retry_delay_ms)
    }

    /// Gas price multiplier in thousandths, so prices scale without floats
    pub fn price_multiplier_permille(&self) -> u128 {
        (self.gas.price_multiplier * 1000.0).round() as u128
    }
}
