//! Chain access for the distributor: one trait, one Alloy-backed implementation

use std::time::Duration;

use alloy::{
    network::{EthereumWallet, ReceiptResponse as _},
    providers::{DynProvider, PendingTransactionBuilder, PendingTransactionError, ProviderBuilder},
    signers::{local::PrivateKeySigner, Signer as _},
    sol,
    transports::http::reqwest::Url,
};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::Provider;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ChainError;

pub type ChainResult<T> = std::result::Result<T, ChainError>;

sol! {
    /// @title Airdrop1155
    /// @notice ERC-1155 collection with an owner-only batched mint used for airdrops
    #[sol(rpc)]
    contract Airdrop1155 {
        function balanceOfBatch(
            address[] calldata accounts,
            uint256[] calldata ids
        ) external view returns (uint256[] memory);

        function mintManyUpTo(
            address[] calldata to,
            uint256[] calldata ids,
            uint256[] calldata amounts
        ) external;
    }
}

/// Fully specified `mintManyUpTo` call. Nothing here is left to provider fillers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    pub to: Vec<Address>,
    pub ids: Vec<U256>,
    pub amounts: Vec<U256>,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

/// Terminal on-chain outcome of a mint transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub success: bool,
}

/// Everything the distributor needs from the chain
#[async_trait]
pub trait AirdropContract: Send + Sync {
    /// Account that signs and pays for mint transactions
    fn signer_address(&self) -> Address;

    /// Pending transaction count of the signer
    async fn pending_nonce(&self) -> ChainResult<u64>;

    async fn gas_price(&self) -> ChainResult<u128>;

    async fn native_balance(&self, address: Address) -> ChainResult<U256>;

    /// Batched ERC-1155 balance read. One result per account, same order.
    async fn balance_of_batch(
        &self,
        accounts: Vec<Address>,
        token_ids: Vec<U256>,
    ) -> ChainResult<Vec<U256>>;

    /// Broadcast a mint batch. Returns as soon as the node accepted it.
    async fn send_mint_many(&self, request: &MintRequest) -> ChainResult<TxHash>;

    /// Block until the transaction is mined (or reverted) or `timeout` elapses
    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
        confirmations: u64,
    ) -> ChainResult<MintReceipt>;
}

/// Blockchain client for the Airdrop1155 contract using Alloy
pub struct AlloyAirdropContract {
    provider: DynProvider,
    signer: Address,
    contract_address: Address,
}

impl AlloyAirdropContract {
    pub fn new(
        rpc_url: &str,
        private_key: Option<&str>,
        contract_address: Address,
        chain_id: u64,
    ) -> ChainResult<Self> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| ChainError::Rpc(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;

        let (provider, signer) = match private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .trim()
                    .parse()
                    .map_err(|e| ChainError::Rpc(format!("Invalid private key: {}", e)))?;
                let signer = signer.with_chain_id(Some(chain_id));
                let address = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(url)
                    .erased();
                (provider, address)
            }
            // read-only client, enough for dry runs
            None => (ProviderBuilder::new().connect_http(url).erased(), Address::ZERO),
        };

        info!("Blockchain client connected to {} for contract {}", rpc_url, contract_address);

        Ok(Self {
            provider,
            signer,
            contract_address,
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }
}

#[async_trait]
impl AirdropContract for AlloyAirdropContract {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn pending_nonce(&self) -> ChainResult<u64> {
        self.provider
            .get_transaction_count(self.signer)
            .pending()
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get pending nonce: {}", e)))
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get gas price: {}", e)))
    }

    async fn native_balance(&self, address: Address) -> ChainResult<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get balance of {}: {}", address, e)))
    }

    async fn balance_of_batch(
        &self,
        accounts: Vec<Address>,
        token_ids: Vec<U256>,
    ) -> ChainResult<Vec<U256>> {
        let expected = accounts.len();
        let contract = Airdrop1155::new(self.contract_address, &self.provider);

        let balances = contract
            .balanceOfBatch(accounts, token_ids)
            .call()
            .await
            .map_err(|e| ChainError::ContractCall(format!("balanceOfBatch failed: {}", e)))?;

        if balances.len() != expected {
            return Err(ChainError::InvalidResponse(format!(
                "balanceOfBatch returned {} balances for {} accounts",
                balances.len(),
                expected
            )));
        }

        Ok(balances)
    }

    async fn send_mint_many(&self, request: &MintRequest) -> ChainResult<TxHash> {
        debug!(
            "Sending mintManyUpTo for {} recipients with nonce {}",
            request.to.len(),
            request.nonce
        );

        let contract = Airdrop1155::new(self.contract_address, &self.provider);
        let pending_tx = contract
            .mintManyUpTo(request.to.clone(), request.ids.clone(), request.amounts.clone())
            .nonce(request.nonce)
            .gas(request.gas_limit)
            .gas_price(request.gas_price)
            .send()
            .await
            .map_err(|e| ChainError::Transaction(format!("Transaction failed: {}", e)))?;

        Ok(*pending_tx.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
        confirmations: u64,
    ) -> ChainResult<MintReceipt> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(confirmations)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await
            .map_err(|e| match e {
                PendingTransactionError::TxWatcher(_) => {
                    ChainError::ReceiptTimeout(tx_hash)
                }
                other => ChainError::Transaction(format!("Failed to get receipt: {}", other)),
            })?;

        Ok(MintReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            success: receipt.status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn test_client_creation_derives_signer() {
        let client = AlloyAirdropContract::new(
            "http://localhost:8545",
            Some(ANVIL_KEY),
            Address::repeat_byte(0x42),
            31337,
        )
        .unwrap();

        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(client.signer_address(), expected);
        assert_eq!(client.contract_address(), Address::repeat_byte(0x42));
    }

    #[tokio::test]
    async fn test_invalid_rpc_url_rejected() {
        let result = AlloyAirdropContract::new("not a url", None, Address::ZERO, 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_private_key_rejected() {
        let result = AlloyAirdropContract::new(
            "http://localhost:8545",
            Some("0xdeadbeef"),
            Address::ZERO,
            1,
        );
        assert!(result.is_err());
    }
}
