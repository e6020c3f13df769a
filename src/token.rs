//! Mock token deployment arguments and token transfers

use crate::abi::{display_address, Arg, ContractHandle};
use crate::account::{Keyring, SigningIdentity};
use crate::chain::ChainClient;
use crate::config::TokenConfig;
use crate::error::{EscrowError, EscrowResult};
use crate::tx::{CallOptions, ConfirmationTracker, Finality, TransactionBuilder};

use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use tracing::info;

/// Constructor arguments `(name, symbol, decimals, supply)`; supply is given in
/// whole tokens and scaled by 10^18
pub fn constructor_args(config: &TokenConfig) -> EscrowResult<Vec<Arg>> {
    let supply = parse_ether(config.supply.trim())
        .map_err(|e| EscrowError::invalid("TOKEN_SUPPLY", format!("{:?}: {}", config.supply, e)))?;
    Ok(vec![
        Arg::Text(config.name.clone()),
        Arg::Text(config.symbol.clone()),
        Arg::Uint(U256::from(config.decimals)),
        Arg::Uint(supply),
    ])
}

/// Transfer `amount` of `token` from `identity` to `recipient`
pub async fn transfer<C: ChainClient + ?Sized + 'static>(
    builder: &TransactionBuilder<C>,
    tracker: &ConfirmationTracker<C>,
    keyring: &Keyring,
    identity: &SigningIdentity,
    token: &ContractHandle,
    recipient: Address,
    amount: U256,
) -> EscrowResult<Finality> {
    info!(
        "Transferring {} of {} from {} to {}",
        amount,
        display_address(&token.address),
        display_address(&identity.address()),
        display_address(&recipient)
    );
    let unsigned = builder
        .build_call(
            identity,
            token,
            "transfer",
            &[Arg::Address(recipient), Arg::Uint(amount)],
            CallOptions::default(),
        )
        .await?;
    tracker.submit_and_wait(keyring, unsigned).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{provision, TEST_PHRASE};
    use crate::testing::{fast_tracker, token_abi, ChainCall, ScriptedChain};
    use crate::tx::GasEstimator;
    use std::sync::Arc;
    use tokio_test::assert_ok;

    #[test]
    fn test_supply_scaled_to_base_units() {
        let args = assert_ok!(constructor_args(&TokenConfig::default()));
        assert_eq!(args[0], Arg::Text("Mock Token".into()));
        assert_eq!(args[1], Arg::Text("MOCK".into()));
        assert_eq!(args[2], Arg::Uint(U256::from(18)));
        assert_eq!(args[3], Arg::Uint(U256::exp10(24)));

        let config = TokenConfig {
            supply: "lots".into(),
            ..TokenConfig::default()
        };
        assert!(matches!(
            constructor_args(&config),
            Err(EscrowError::InvalidParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_transfer_to_self_without_preflight() {
        let chain = Arc::new(ScriptedChain::new());
        let mut keyring = Keyring::new();
        let identity = provision(TEST_PHRASE, &mut keyring).unwrap();
        let builder = TransactionBuilder::new(chain.clone(), GasEstimator::default());
        let tracker = ConfirmationTracker::new(chain.clone(), fast_tracker(2));
        let token = ContractHandle::new("IERC20", Address::repeat_byte(0x33), token_abi());

        let finality = assert_ok!(
            transfer(
                &builder,
                &tracker,
                &keyring,
                &identity,
                &token,
                identity.address(),
                U256::from(1_000),
            )
            .await
        );

        assert!(finality.confirmations >= 2);
        let calls = chain.calls();
        assert!(calls.contains(&ChainCall::EstimateGas {
            to: Some(token.address),
            value: U256::zero(),
        }));
        assert!(!calls.iter().any(|c| matches!(c, ChainCall::Call { .. })));
    }
}
