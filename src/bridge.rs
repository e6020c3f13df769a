//! ZondBridge deployment arguments and status report

use crate::abi::{display_address, parse_address, token_address, token_uint, Arg, ContractHandle};
use crate::chain::ChainClient;
use crate::config::{require, BridgeConfig};
use crate::error::{EscrowError, EscrowResult};

use ethers::abi::Token;
use ethers::types::{Address, U256};
use ethers::utils::format_ether;
use std::fmt;

/// Constructor arguments `(relayer, treasury)`
pub fn constructor_args(config: &BridgeConfig) -> EscrowResult<Vec<Arg>> {
    let relayer = parse_address(require(&config.relayer_address, "RELAYER_ADDRESS")?)?;
    let treasury = parse_address(require(&config.treasury_address, "TREASURY_ADDRESS")?)?;
    Ok(vec![Arg::Address(relayer), Arg::Address(treasury)])
}

#[derive(Debug, Clone)]
pub struct BridgeInfo {
    pub address: Address,
    pub balance: U256,
    pub relayer: Address,
    pub fee_treasury: Address,
    pub nonce: U256,
}

impl BridgeInfo {
    /// Balance, relayer, treasury and nonce, fetched concurrently
    pub async fn fetch<C: ChainClient + ?Sized>(
        client: &C,
        bridge: &ContractHandle,
    ) -> EscrowResult<Self> {
        let (balance, relayer, treasury, nonce) = tokio::try_join!(
            client.balance(bridge.address),
            bridge.read(client, "RELAYER", &[]),
            bridge.read(client, "FEE_TREASURY", &[]),
            bridge.read(client, "nonce", &[]),
        )?;

        Ok(Self {
            address: bridge.address,
            balance,
            relayer: single(&relayer, "RELAYER").and_then(token_address)?,
            fee_treasury: single(&treasury, "FEE_TREASURY").and_then(token_address)?,
            nonce: single(&nonce, "nonce").and_then(token_uint)?,
        })
    }
}

fn single<'a>(tokens: &'a [Token], method: &str) -> EscrowResult<&'a Token> {
    tokens
        .first()
        .ok_or_else(|| EscrowError::Abi(format!("{}() returned nothing", method)))
}

impl fmt::Display for BridgeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ZondBridge @ {}", display_address(&self.address))?;
        writeln!(f, "Bridge Contract Balance: {} ZND", format_ether(self.balance))?;
        writeln!(f, "Relayer Address: {}", display_address(&self.relayer))?;
        writeln!(f, "Treasury Address: {}", display_address(&self.fee_treasury))?;
        write!(f, "Current Nonce: {}", self.nonce)
    }
}
