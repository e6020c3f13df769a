//! Chain module - the seam between the workflows and the network
//!
//! This module provides:
//! - The `ChainClient` trait every workflow talks to
//! - An HTTP JSON-RPC implementation backed by an ethers provider
//! - The gas price model shared by the transaction builder

pub mod provider;

pub use provider::RpcClient;

use crate::error::EscrowResult;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};

/// Network operations the workflows depend on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain ID used for replay-protected signatures
    async fn chain_id(&self) -> EscrowResult<u64>;

    /// Current head block number
    async fn block_number(&self) -> EscrowResult<u64>;

    /// Current gas price according to the configured strategy
    async fn gas_price(&self) -> EscrowResult<GasPrice>;

    /// Next nonce for `address`, including pending transactions
    async fn transaction_count(&self, address: Address) -> EscrowResult<U256>;

    /// Dry-run gas estimation; a revert surfaces as `EscrowError::Estimation`
    async fn estimate_gas(&self, tx: &TypedTransaction) -> EscrowResult<U256>;

    /// Read-only call against the latest state
    async fn call(&self, tx: &TypedTransaction) -> EscrowResult<Bytes>;

    /// Broadcast a signed, RLP-encoded transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> EscrowResult<H256>;

    async fn transaction_receipt(&self, tx_hash: H256) -> EscrowResult<Option<TransactionReceipt>>;

    async fn balance(&self, address: Address) -> EscrowResult<U256>;

    async fn code(&self, address: Address) -> EscrowResult<Bytes>;
}

/// Gas price types
#[derive(Debug, Clone, PartialEq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}
