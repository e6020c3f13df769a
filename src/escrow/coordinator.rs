//! Escrow coordinator: the approve-then-lock workflow and swap lookups

use super::types::{Asset, HashLock, LockRequest, SwapId, SwapRecord, SwapVariant};
use crate::abi::{display_address, token_address, token_bool, token_bytes32, Arg, ContractHandle};
use crate::account::{Keyring, SigningIdentity};
use crate::chain::ChainClient;
use crate::error::{EscrowError, EscrowResult};
use crate::tx::{CallOptions, ConfirmationTracker, Finality, GasEstimator, TrackerConfig, TransactionBuilder};

use ethers::abi::Abi;
use ethers::types::{Address, U256};
use ethers::utils::format_ether;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a lock workflow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    Idle,
    /// Token allowance submitted, waiting for finality
    ApprovalPending,
    LockPending,
    Locked,
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapPhase::Idle => "idle",
            SwapPhase::ApprovalPending => "approval pending",
            SwapPhase::LockPending => "lock pending",
            SwapPhase::Locked => "locked",
        };
        f.write_str(name)
    }
}

/// Result of a completed lock
#[derive(Debug, Clone)]
pub struct LockOutcome {
    /// Locally derived identifier of the new swap
    pub swap_id: SwapId,
    pub hash_lock: HashLock,
    /// Present when a token allowance had to be granted first
    pub approval: Option<Finality>,
    pub lock: Finality,
    pub phase: SwapPhase,
}

/// Balance, owner and pause flag of the swap contract
#[derive(Debug, Clone)]
pub struct ContractSummary {
    pub address: Address,
    pub balance: U256,
    pub owner: Address,
    pub paused: bool,
}

impl fmt::Display for ContractSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ZondAtomicSwap @ {}", display_address(&self.address))?;
        writeln!(f, "---------------------------------------------")?;
        writeln!(f, "Balance          : {} ZND", format_ether(self.balance))?;
        writeln!(f, "Owner            : {}", display_address(&self.owner))?;
        write!(f, "Paused?          : {}", self.paused)
    }
}

/// Drives lock workflows against one deployed swap contract
pub struct SwapCoordinator<C: ?Sized> {
    client: Arc<C>,
    builder: TransactionBuilder<C>,
    tracker: ConfirmationTracker<C>,
    swap: ContractHandle,
    /// Interface used for allowance calls on locked tokens
    token_abi: Abi,
    token_interface: String,
}

impl<C: ChainClient + ?Sized + 'static> SwapCoordinator<C> {
    pub fn new(
        client: Arc<C>,
        swap: ContractHandle,
        token_abi: Abi,
        gas_estimator: GasEstimator,
        tracker_config: TrackerConfig,
    ) -> Self {
        Self {
            builder: TransactionBuilder::new(client.clone(), gas_estimator),
            tracker: ConfirmationTracker::new(client.clone(), tracker_config),
            client,
            swap,
            token_abi,
            token_interface: "IERC20".to_string(),
        }
    }

    /// Name used in logs for the token interface
    pub fn with_token_interface(mut self, name: impl Into<String>) -> Self {
        self.token_interface = name.into();
        self
    }

    #[cfg(test)]
    pub fn contract(&self) -> &ContractHandle {
        &self.swap
    }

    /// Lock `request.amount` of `request.asset` under the request's hash lock.
    ///
    /// Token locks grant the swap contract an allowance first, and the lock is only
    /// built once that approval is final. Nothing touches the network when the
    /// request fails validation.
    pub async fn lock(
        &self,
        keyring: &Keyring,
        identity: &SigningIdentity,
        request: &LockRequest,
    ) -> EscrowResult<LockOutcome> {
        request.validate(now())?;
        keyring.wallet(identity.address())?;

        let mut phase = SwapPhase::Idle;
        info!(
            "Locking {} of {} for {} (expiry {}, H {})",
            request.amount, request.asset, request.recipient_raw, request.expiry_ts, request.hash_lock
        );

        let approval = match request.asset {
            Asset::Native => None,
            Asset::Token(token) => {
                transition(&mut phase, SwapPhase::ApprovalPending);
                Some(self.approve(keyring, identity, token, request.amount).await?)
            }
        };

        transition(&mut phase, SwapPhase::LockPending);
        let value = if request.asset.is_native() {
            request.amount
        } else {
            U256::zero()
        };
        let unsigned = self
            .builder
            .build_call(
                identity,
                &self.swap,
                "lock",
                &lock_args(request),
                CallOptions::checked().with_value(value),
            )
            .await?;
        let lock = self.tracker.submit_and_wait(keyring, unsigned).await?;
        transition(&mut phase, SwapPhase::Locked);

        let swap_id = SwapId::derive(identity.address(), &request.hash_lock, &request.recipient_raw);
        info!("Swap {} locked in {:?}", swap_id, lock.tx_hash);

        Ok(LockOutcome {
            swap_id,
            hash_lock: request.hash_lock,
            approval,
            lock,
            phase,
        })
    }

    async fn approve(
        &self,
        keyring: &Keyring,
        identity: &SigningIdentity,
        token: Address,
        amount: U256,
    ) -> EscrowResult<Finality> {
        let handle = ContractHandle::new(self.token_interface.clone(), token, self.token_abi.clone());
        let unsigned = self
            .builder
            .build_call(
                identity,
                &handle,
                "approve",
                &[Arg::Address(self.swap.address), Arg::Uint(amount)],
                CallOptions::checked(),
            )
            .await?;
        self.tracker.submit_and_wait(keyring, unsigned).await
    }

    /// Ask the contract for the identifier of a (possibly future) swap
    pub async fn preview_swap_id(
        &self,
        locker: Address,
        hash_lock: &HashLock,
        recipient_raw: &str,
    ) -> EscrowResult<SwapId> {
        let tokens = self
            .swap
            .read(
                &*self.client,
                "previewSwapID",
                &[
                    Arg::Address(locker),
                    Arg::Bytes32(hash_lock.0),
                    Arg::Text(recipient_raw.to_string()),
                ],
            )
            .await?;
        let id = tokens
            .first()
            .ok_or_else(|| EscrowError::Abi("previewSwapID returned nothing".to_string()))?;
        Ok(SwapId(token_bytes32(id)?))
    }

    /// Read a swap record; a record with a zero locker means the swap does not exist
    pub async fn swap(&self, id: &SwapId) -> EscrowResult<SwapRecord> {
        let tokens = self
            .swap
            .read(&*self.client, "swaps", &[Arg::Bytes32(id.0)])
            .await?;
        let function = self.swap.function("swaps", 1)?;
        SwapRecord::from_tokens(function, tokens)
    }

    /// Locate a swap from its public parameters; `None` when it was never created
    pub async fn find_swap(
        &self,
        locker: Address,
        secret: &str,
        recipient_raw: &str,
    ) -> EscrowResult<(SwapId, Option<SwapRecord>)> {
        let hash_lock = HashLock::from_secret(secret.as_bytes());
        let id = self.preview_swap_id(locker, &hash_lock, recipient_raw).await?;
        let local = SwapId::derive(locker, &hash_lock, recipient_raw);
        if local != id {
            debug!("Contract swap ID {} differs from local derivation {}", id, local);
        }
        let record = self.swap(&id).await?;
        Ok((id, record.exists().then_some(record)))
    }

    /// Contract balance, owner and pause flag, fetched concurrently
    pub async fn summary(&self) -> EscrowResult<ContractSummary> {
        let client = &*self.client;
        let (balance, owner, paused) = tokio::try_join!(
            client.balance(self.swap.address),
            self.swap.read(client, "owner", &[]),
            self.swap.read(client, "paused", &[]),
        )?;
        Ok(ContractSummary {
            address: self.swap.address,
            balance,
            owner: first(&owner, "owner").and_then(token_address)?,
            paused: first(&paused, "paused").and_then(token_bool)?,
        })
    }
}

fn first<'a>(tokens: &'a [ethers::abi::Token], method: &str) -> EscrowResult<&'a ethers::abi::Token> {
    tokens
        .first()
        .ok_or_else(|| EscrowError::Abi(format!("{} returned nothing", method)))
}

fn lock_args(request: &LockRequest) -> Vec<Arg> {
    let mut args = vec![
        Arg::Bytes32(request.hash_lock.0),
        Arg::Text(request.recipient_raw.clone()),
        Arg::Uint(U256::from(request.expiry_ts)),
        Arg::Address(request.asset.address()),
        Arg::Uint(request.amount),
    ];
    if request.variant == SwapVariant::TwoSided {
        args.push(Arg::Text(request.desired_asset.clone().unwrap_or_default()));
        args.push(Arg::Uint(request.desired_amount()));
    }
    args
}

fn transition(phase: &mut SwapPhase, next: SwapPhase) {
    info!("Swap phase: {} -> {}", phase, next);
    *phase = next;
}

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl fmt::Display for SwapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expiry = chrono::DateTime::from_timestamp(self.expiry_ts as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| self.expiry_ts.to_string());
        writeln!(f, "assetLocked      : {}", self.asset_locked)?;
        writeln!(f, "amountLocked     : {}", format_ether(self.amount_locked))?;
        writeln!(f, "locker           : {}", display_address(&self.locker))?;
        writeln!(f, "recipientRaw     : {}", self.recipient_raw)?;
        if let Some(asset) = &self.desired_asset_raw {
            writeln!(f, "desiredAssetRaw  : {}", asset)?;
        }
        if let Some(amount) = &self.desired_amount {
            writeln!(f, "desiredAmount    : {}", amount)?;
        }
        writeln!(f, "expiryTs         : {}", expiry)?;
        write!(f, "claimed          : {}", self.claimed)
    }
}
