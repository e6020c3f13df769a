//! Test fixtures: contract interfaces and a scripted in-memory chain

use crate::abi::ContractHandle;
use crate::account::SigningIdentity;
use crate::chain::{ChainClient, GasPrice};
use crate::error::{EscrowError, EscrowResult};
use crate::tx::{TrackerConfig, UnsignedTx};

use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionReceipt, H256, U256, U64};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const CHAIN_ID: u64 = 32382;

fn parse_abi(json: &str) -> Abi {
    serde_json::from_str(json).expect("fixture ABI parses")
}

pub fn swap_abi() -> Abi {
    parse_abi(
        r#"[
        {"type":"function","name":"lock","stateMutability":"payable","outputs":[],"inputs":[
            {"name":"hashedSecret","type":"bytes32"},
            {"name":"recipientRaw","type":"string"},
            {"name":"expiryTs","type":"uint256"},
            {"name":"asset","type":"address"},
            {"name":"amount","type":"uint256"}]},
        {"type":"function","name":"lock","stateMutability":"payable","outputs":[],"inputs":[
            {"name":"hashedSecret","type":"bytes32"},
            {"name":"recipientRaw","type":"string"},
            {"name":"expiryTs","type":"uint256"},
            {"name":"asset","type":"address"},
            {"name":"amount","type":"uint256"},
            {"name":"desiredAssetRaw","type":"string"},
            {"name":"desiredAmount","type":"uint256"}]},
        {"type":"function","name":"swaps","stateMutability":"view",
         "inputs":[{"name":"","type":"bytes32"}],
         "outputs":[
            {"name":"assetLocked","type":"address"},
            {"name":"amountLocked","type":"uint256"},
            {"name":"locker","type":"address"},
            {"name":"recipientRaw","type":"string"},
            {"name":"desiredAssetRaw","type":"string"},
            {"name":"desiredAmount","type":"uint256"},
            {"name":"expiryTs","type":"uint256"},
            {"name":"claimed","type":"bool"}]},
        {"type":"function","name":"previewSwapID","stateMutability":"view",
         "inputs":[
            {"name":"locker","type":"address"},
            {"name":"hashedSecret","type":"bytes32"},
            {"name":"recipientRaw","type":"string"}],
         "outputs":[{"name":"","type":"bytes32"}]},
        {"type":"function","name":"owner","stateMutability":"view","inputs":[],
         "outputs":[{"name":"","type":"address"}]},
        {"type":"function","name":"paused","stateMutability":"view","inputs":[],
         "outputs":[{"name":"","type":"bool"}]}
    ]"#,
    )
}

pub fn token_abi() -> Abi {
    parse_abi(
        r#"[
        {"type":"function","name":"approve","stateMutability":"nonpayable",
         "inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"balanceOf","stateMutability":"view",
         "inputs":[{"name":"account","type":"address"}],
         "outputs":[{"name":"","type":"uint256"}]}
    ]"#,
    )
}

pub fn bridge_abi() -> Abi {
    parse_abi(
        r#"[
        {"type":"constructor","stateMutability":"nonpayable",
         "inputs":[{"name":"relayer","type":"address"},{"name":"treasury","type":"address"}]},
        {"type":"function","name":"RELAYER","stateMutability":"view","inputs":[],
         "outputs":[{"name":"","type":"address"}]},
        {"type":"function","name":"FEE_TREASURY","stateMutability":"view","inputs":[],
         "outputs":[{"name":"","type":"address"}]},
        {"type":"function","name":"nonce","stateMutability":"view","inputs":[],
         "outputs":[{"name":"","type":"uint256"}]}
    ]"#,
    )
}

/// Tracker settings that resolve within milliseconds against `ScriptedChain`
pub fn fast_tracker(required_confirmations: u64) -> TrackerConfig {
    TrackerConfig {
        required_confirmations,
        poll_interval: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

/// A ready-to-sign native transfer from `identity`
pub fn unsigned_transfer(identity: &SigningIdentity) -> UnsignedTx {
    let tx = Eip1559TransactionRequest::new()
        .from(identity.address())
        .to(Address::repeat_byte(0x44))
        .value(U256::one())
        .gas(21_000u64)
        .nonce(0u64)
        .max_fee_per_gas(40_000_000_000u64)
        .max_priority_fee_per_gas(2_000_000_000u64)
        .chain_id(CHAIN_ID);
    UnsignedTx {
        from: identity.address(),
        label: "transfer".to_string(),
        tx: TypedTransaction::Eip1559(tx),
    }
}

/// One recorded interaction with the scripted chain
#[derive(Debug, Clone, PartialEq)]
pub enum ChainCall {
    EstimateGas { to: Option<Address>, value: U256 },
    Call { to: Option<Address> },
    Send { tx_hash: H256 },
    Receipt { tx_hash: H256 },
}

struct Mined {
    block: u64,
    contract_address: Option<Address>,
}

#[derive(Default)]
struct State {
    head: u64,
    mined: HashMap<H256, Mined>,
    calls: Vec<ChainCall>,
    responses: HashMap<[u8; 4], Bytes>,
    last_estimate_to: Option<Option<Address>>,
    sent: usize,
    stalled: bool,
    hanging: bool,
    reorging: bool,
    head_frozen: bool,
    reverting: bool,
    rejecting: bool,
    estimate_revert: Option<String>,
    balance: U256,
}

/// In-memory chain: every broadcast is mined in a fresh block and every head
/// query advances the chain by one block.
pub struct ScriptedChain {
    state: Mutex<State>,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                head: 100,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("scripted chain lock")
    }

    /// Transactions are accepted but never mined
    pub fn stall(&self) {
        self.state().stalled = true;
    }

    /// Receipt queries never answer
    pub fn hang(&self) {
        self.state().hanging = true;
    }

    /// A mined transaction is reported once, then drops out of the chain
    pub fn reorg_after_first_receipt(&self) {
        self.state().reorging = true;
    }

    /// Head queries stop advancing the chain
    pub fn freeze_head(&self) {
        self.state().head_frozen = true;
    }

    /// Mined receipts carry a failed status
    pub fn revert_receipts(&self) {
        self.state().reverting = true;
    }

    /// Broadcasts are refused by the node
    pub fn reject_submissions(&self) {
        self.state().rejecting = true;
    }

    /// Gas estimation reverts with `reason`
    pub fn fail_estimates(&self, reason: &str) {
        self.state().estimate_revert = Some(reason.to_string());
    }

    pub fn set_balance(&self, balance: U256) {
        self.state().balance = balance;
    }

    /// Answer read calls to `contract.method` with `tokens`
    pub fn respond(&self, contract: &ContractHandle, method: &str, arity: usize, tokens: &[Token]) {
        let selector = contract
            .function(method, arity)
            .expect("fixture method exists")
            .short_signature();
        self.state()
            .responses
            .insert(selector, Bytes::from(ethers::abi::encode(tokens)));
    }

    /// Broadcast attempts, including refused ones
    pub fn sent_count(&self) -> usize {
        self.state().sent
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn chain_id(&self) -> EscrowResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn block_number(&self) -> EscrowResult<u64> {
        let mut state = self.state();
        let head = state.head;
        if !state.head_frozen {
            state.head += 1;
        }
        Ok(head)
    }

    async fn gas_price(&self) -> EscrowResult<GasPrice> {
        Ok(GasPrice::Eip1559 {
            max_fee_per_gas: U256::from(40_000_000_000u64),
            max_priority_fee_per_gas: U256::from(2_000_000_000u64),
        })
    }

    async fn transaction_count(&self, _address: Address) -> EscrowResult<U256> {
        Ok(U256::from(self.state().sent))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> EscrowResult<U256> {
        let mut state = self.state();
        let to = tx.to_addr().copied();
        state.calls.push(ChainCall::EstimateGas {
            to,
            value: tx.value().copied().unwrap_or_default(),
        });
        state.last_estimate_to = Some(to);
        match &state.estimate_revert {
            Some(reason) => Err(EscrowError::Estimation(reason.clone())),
            None => Ok(U256::from(90_000)),
        }
    }

    async fn call(&self, tx: &TypedTransaction) -> EscrowResult<Bytes> {
        let mut state = self.state();
        state.calls.push(ChainCall::Call {
            to: tx.to_addr().copied(),
        });
        let response = tx
            .data()
            .filter(|data| data.len() >= 4)
            .and_then(|data| {
                let mut selector = [0u8; 4];
                selector.copy_from_slice(&data[..4]);
                state.responses.get(&selector).cloned()
            });
        Ok(response.unwrap_or_default())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> EscrowResult<H256> {
        let mut state = self.state();
        state.sent += 1;
        if state.rejecting {
            return Err(EscrowError::Submission("node refused transaction".to_string()));
        }
        let tx_hash = H256::from(keccak256(&raw));
        state.calls.push(ChainCall::Send { tx_hash });

        let contract_address = match state.last_estimate_to.take() {
            Some(None) => Some(Address::from_low_u64_be(0xc000 + state.sent as u64)),
            _ => None,
        };
        state.head += 1;
        let block = state.head;
        state.mined.insert(
            tx_hash,
            Mined {
                block,
                contract_address,
            },
        );
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> EscrowResult<Option<TransactionReceipt>> {
        let hanging = {
            let mut state = self.state();
            state.calls.push(ChainCall::Receipt { tx_hash });
            state.hanging
        };
        if hanging {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        if state.stalled {
            return Ok(None);
        }
        let status = if state.reverting { 0u64 } else { 1u64 };
        let mined = if state.reorging {
            state.mined.remove(&tx_hash)
        } else {
            state.mined.get(&tx_hash).map(|m| Mined {
                block: m.block,
                contract_address: m.contract_address,
            })
        };
        Ok(mined.map(|mined| TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(mined.block)),
            contract_address: mined.contract_address,
            status: Some(U64::from(status)),
            ..TransactionReceipt::default()
        }))
    }

    async fn balance(&self, _address: Address) -> EscrowResult<U256> {
        Ok(self.state().balance)
    }

    async fn code(&self, _address: Address) -> EscrowResult<Bytes> {
        Ok(Bytes::from(vec![0x60, 0x80, 0x60, 0x40]))
    }
}
