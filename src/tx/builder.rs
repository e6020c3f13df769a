//! Transaction builder: call encoding, dry-run gas estimation and fee typing

use super::gas::GasEstimator;
use crate::abi::{Arg, ContractHandle};
use crate::account::SigningIdentity;
use crate::artifacts::ContractArtifact;
use crate::chain::{ChainClient, GasPrice};
use crate::error::{EscrowError, EscrowResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, U256};
use std::sync::Arc;
use tracing::debug;

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Native value attached to the call
    pub value: U256,
    /// Run an `eth_call` pre-flight before returning the transaction
    pub check_revert: bool,
}

impl CallOptions {
    pub fn checked() -> Self {
        Self {
            value: U256::zero(),
            check_revert: true,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// A fully populated transaction awaiting signature
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    pub from: Address,
    /// Human-readable description for logs, e.g. `IERC20.approve`
    pub label: String,
    pub tx: TypedTransaction,
}

impl UnsignedTx {
    pub fn value(&self) -> U256 {
        self.tx.value().copied().unwrap_or_default()
    }

    pub fn gas(&self) -> U256 {
        self.tx.gas().copied().unwrap_or_default()
    }

    pub fn to(&self) -> Option<Address> {
        self.tx.to_addr().copied()
    }

    pub fn is_eip1559(&self) -> bool {
        matches!(self.tx, TypedTransaction::Eip1559(_))
    }
}

/// Builds unsigned transactions against current chain state
pub struct TransactionBuilder<C: ?Sized> {
    client: Arc<C>,
    gas_estimator: GasEstimator,
}

impl<C: ChainClient + ?Sized> TransactionBuilder<C> {
    pub fn new(client: Arc<C>, gas_estimator: GasEstimator) -> Self {
        Self {
            client,
            gas_estimator,
        }
    }

    /// Build a call to `contract.method(args)` sent by `identity`
    pub async fn build_call(
        &self,
        identity: &SigningIdentity,
        contract: &ContractHandle,
        method: &str,
        args: &[Arg],
        options: CallOptions,
    ) -> EscrowResult<UnsignedTx> {
        let data = contract.encode(method, args)?;
        self.build(
            identity.address(),
            Some(contract.address),
            data,
            options,
            format!("{}.{}", contract.name, method),
        )
        .await
    }

    /// Build a deployment of `artifact` with constructor `args`
    pub async fn build_deploy(
        &self,
        identity: &SigningIdentity,
        artifact: &ContractArtifact,
        args: &[Arg],
    ) -> EscrowResult<UnsignedTx> {
        let data = artifact.deployment_data(args)?;
        self.build(
            identity.address(),
            None,
            data,
            CallOptions::default(),
            format!("deploy {}", artifact.name),
        )
        .await
    }

    async fn build(
        &self,
        from: Address,
        to: Option<Address>,
        data: Bytes,
        options: CallOptions,
        label: String,
    ) -> EscrowResult<UnsignedTx> {
        let gas_price = self.gas_estimator.gas_price(&*self.client).await?;
        let mut tx = typed_request(from, to, data, options.value, &gas_price);

        let gas_limit = self
            .gas_estimator
            .estimate_limit(&*self.client, &tx)
            .await
            .map_err(|e| match e {
                EscrowError::Estimation(reason) => {
                    EscrowError::Estimation(format!("{}: {}", label, reason))
                }
                other => other,
            })?;
        tx.set_gas(gas_limit);

        if options.check_revert {
            self.client.call(&tx).await.map_err(|e| match e {
                EscrowError::Reverted(reason) => {
                    EscrowError::Reverted(format!("{}: {}", label, reason))
                }
                other => other,
            })?;
        }

        let nonce = self.client.transaction_count(from).await?;
        let chain_id = self.client.chain_id().await?;
        tx.set_nonce(nonce);
        tx.set_chain_id(chain_id);

        debug!(
            "Built {} (nonce {}, gas {}, value {}, max fee {})",
            label,
            nonce,
            gas_limit,
            options.value,
            GasEstimator::calculate_cost(gas_limit, &gas_price)
        );
        Ok(UnsignedTx { from, label, tx })
    }
}

fn typed_request(
    from: Address,
    to: Option<Address>,
    data: Bytes,
    value: U256,
    gas_price: &GasPrice,
) -> TypedTransaction {
    match gas_price {
        GasPrice::Legacy(price) => {
            let mut tx = TransactionRequest::new()
                .from(from)
                .data(data)
                .value(value)
                .gas_price(*price);
            if let Some(to) = to {
                tx = tx.to(to);
            }
            TypedTransaction::Legacy(tx)
        }
        GasPrice::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let mut tx = Eip1559TransactionRequest::new()
                .from(from)
                .data(data)
                .value(value)
                .max_fee_per_gas(*max_fee_per_gas)
                .max_priority_fee_per_gas(*max_priority_fee_per_gas);
            if let Some(to) = to {
                tx = tx.to(to);
            }
            TypedTransaction::Eip1559(tx)
        }
    }
}
