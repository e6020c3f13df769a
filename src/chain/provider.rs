//! HTTP JSON-RPC chain client

use super::{ChainClient, GasPrice};
use crate::config::{GasPriceStrategy, NetworkConfig};
use crate::error::{EscrowError, EscrowResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, JsonRpcError, Provider, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Chain client over a single reusable HTTP provider
pub struct RpcClient {
    provider: Provider<Http>,
    strategy: GasPriceStrategy,
    chain_id: OnceCell<u64>,
}

impl RpcClient {
    /// Create a new client for the configured endpoint
    pub fn new(config: &NetworkConfig) -> EscrowResult<Self> {
        let provider = Provider::<Http>::try_from(config.provider_url.as_str())
            .map_err(|e| {
                EscrowError::Config(format!(
                    "Invalid provider URL {}: {}",
                    config.provider_url, e
                ))
            })?
            .interval(Duration::from_millis(config.poll_interval_ms));
        debug!("Using HTTP provider {}", config.provider_url);

        Ok(Self {
            provider,
            strategy: config.gas_price_strategy.clone(),
            chain_id: OnceCell::new(),
        })
    }

    /// Estimate EIP-1559 fees from the latest block's base fee
    async fn estimate_eip1559_fees(&self) -> EscrowResult<(U256, U256)> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(rpc)?
            .ok_or_else(|| EscrowError::Rpc("No latest block".to_string()))?;

        // 2 gwei tip
        let priority_fee = U256::from(2_000_000_000u64);

        let max_fee = match block.base_fee_per_gas {
            // Headroom for base fee growth over the next blocks
            Some(base_fee) => base_fee * 2 + priority_fee,
            None => self.provider.get_gas_price().await.map_err(rpc)?,
        };

        Ok((max_fee, priority_fee))
    }
}

fn rpc(e: ProviderError) -> EscrowError {
    EscrowError::Rpc(e.to_string())
}

/// A dry-run the node answered with an error is an estimation failure; a dry-run
/// that never reached the node is not
fn estimation_error(e: ProviderError) -> EscrowError {
    let rejected = RpcError::as_error_response(&e).map(reason);
    match rejected {
        Some(reason) => EscrowError::Estimation(reason),
        None => rpc(e),
    }
}

fn call_error(e: ProviderError) -> EscrowError {
    let reverted = RpcError::as_error_response(&e)
        .filter(|response| response.is_revert())
        .map(reason);
    match reverted {
        Some(reason) => EscrowError::Reverted(reason),
        None => rpc(e),
    }
}

fn reason(response: &JsonRpcError) -> String {
    match response.as_revert_data().filter(|data| !data.is_empty()) {
        Some(data) => format!("{} ({})", response.message, data),
        None => response.message.clone(),
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn chain_id(&self) -> EscrowResult<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let id = self.provider.get_chainid().await.map_err(rpc)?;
                Ok::<_, EscrowError>(id.as_u64())
            })
            .await
            .copied()
    }

    async fn block_number(&self) -> EscrowResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|b| b.as_u64())
            .map_err(rpc)
    }

    async fn gas_price(&self) -> EscrowResult<GasPrice> {
        match self.strategy {
            GasPriceStrategy::Legacy => {
                let price = self.provider.get_gas_price().await.map_err(rpc)?;
                Ok(GasPrice::Legacy(price))
            }
            GasPriceStrategy::Eip1559 => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    async fn transaction_count(&self, address: Address) -> EscrowResult<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(rpc)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> EscrowResult<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(estimation_error)
    }

    async fn call(&self, tx: &TypedTransaction) -> EscrowResult<Bytes> {
        self.provider
            .call(tx, None)
            .await
            .map_err(call_error)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> EscrowResult<H256> {
        self.provider
            .send_raw_transaction(raw)
            .await
            .map(|pending| pending.tx_hash())
            .map_err(|e| EscrowError::Submission(e.to_string()))
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> EscrowResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc)
    }

    async fn balance(&self, address: Address) -> EscrowResult<U256> {
        self.provider.get_balance(address, None).await.map_err(rpc)
    }

    async fn code(&self, address: Address) -> EscrowResult<Bytes> {
        self.provider.get_code(address, None).await.map_err(rpc)
    }
}
