//! Contract deployment

use crate::abi::{display_address, Arg};
use crate::account::{Keyring, SigningIdentity};
use crate::artifacts::ContractArtifact;
use crate::chain::ChainClient;
use crate::error::{EscrowError, EscrowResult};
use crate::tx::{ConfirmationTracker, GasEstimator, TrackerConfig, TransactionBuilder};

use ethers::types::{Address, H256};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A contract that reached finality at its new address
#[derive(Debug, Clone)]
pub struct Deployment {
    pub contract: String,
    pub address: Address,
    pub tx_hash: H256,
    pub confirmations: u64,
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} deployed", self.contract)?;
        writeln!(f, "   Contract address: {}", display_address(&self.address))?;
        writeln!(f, "   TX hash         : {:?}", self.tx_hash)?;
        write!(f, "   Confirmations   : {}", self.confirmations)
    }
}

pub struct Deployer<C: ?Sized> {
    builder: TransactionBuilder<C>,
    tracker: ConfirmationTracker<C>,
}

impl<C: ChainClient + ?Sized + 'static> Deployer<C> {
    pub fn new(client: Arc<C>, gas_estimator: GasEstimator, tracker_config: TrackerConfig) -> Self {
        Self {
            builder: TransactionBuilder::new(client.clone(), gas_estimator),
            tracker: ConfirmationTracker::new(client, tracker_config),
        }
    }

    /// Deploy `artifact` with constructor `args` and wait for finality
    pub async fn deploy(
        &self,
        keyring: &Keyring,
        identity: &SigningIdentity,
        artifact: &ContractArtifact,
        args: &[Arg],
    ) -> EscrowResult<Deployment> {
        info!(
            "Deploying {} ({}) from {}",
            artifact.name,
            artifact.source_unit,
            display_address(&identity.address())
        );
        let unsigned = self.builder.build_deploy(identity, artifact, args).await?;
        let finality = self.tracker.submit_and_wait(keyring, unsigned).await?;

        let address = finality.receipt.contract_address.ok_or_else(|| {
            EscrowError::Submission(format!(
                "receipt {:?} carries no contract address",
                finality.tx_hash
            ))
        })?;
        info!("{} deployed at {}", artifact.name, display_address(&address));

        Ok(Deployment {
            contract: artifact.name.clone(),
            address,
            tx_hash: finality.tx_hash,
            confirmations: finality.confirmations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{provision, TEST_PHRASE};
    use crate::testing::{bridge_abi, fast_tracker, ChainCall, ScriptedChain};
    use ethers::types::Bytes;

    fn bridge_artifact(bytecode: Option<Bytes>) -> ContractArtifact {
        ContractArtifact {
            name: "ZondBridge".to_string(),
            source_unit: "ZondBridge.hyp".to_string(),
            abi: bridge_abi(),
            bytecode,
        }
    }

    #[tokio::test]
    async fn test_deploy_returns_receipt_address_without_preflight() {
        let chain = Arc::new(ScriptedChain::new());
        let mut keyring = Keyring::new();
        let identity = provision(TEST_PHRASE, &mut keyring).unwrap();
        let deployer = Deployer::new(chain.clone(), GasEstimator::default(), fast_tracker(2));

        let deployment = deployer
            .deploy(
                &keyring,
                &identity,
                &bridge_artifact(Some(Bytes::from(vec![0x60, 0x80]))),
                &[
                    Arg::Address(Address::repeat_byte(1)),
                    Arg::Address(Address::repeat_byte(2)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(deployment.address, Address::from_low_u64_be(0xc001));
        assert!(deployment.confirmations >= 2);
        let calls = chain.calls();
        assert!(calls.contains(&ChainCall::EstimateGas {
            to: None,
            value: ethers::types::U256::zero(),
        }));
        assert!(!calls.iter().any(|c| matches!(c, ChainCall::Call { .. })));
    }

    #[tokio::test]
    async fn test_interface_cannot_be_deployed() {
        let chain = Arc::new(ScriptedChain::new());
        let mut keyring = Keyring::new();
        let identity = provision(TEST_PHRASE, &mut keyring).unwrap();
        let deployer = Deployer::new(chain.clone(), GasEstimator::default(), fast_tracker(2));

        let err = deployer
            .deploy(&keyring, &identity, &bridge_artifact(None), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Abi(_)));
        assert!(chain.calls().is_empty());
    }
}
