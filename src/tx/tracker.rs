//! Submission and confirmation tracking
//!
//! Submitting a transaction yields a lazy, single-pass stream of lifecycle events:
//! `Submitted`, zero or more `Confirmation`s as the inclusion depth grows, then
//! exactly one terminal `Receipt` or `Error`. A transaction is final once it is
//! buried under the configured number of blocks. Nothing is retried here; the
//! caller decides whether to resubmit.

use super::builder::UnsignedTx;
use crate::abi::display_address;
use crate::account::Keyring;
use crate::chain::ChainClient;
use crate::config::NetworkConfig;
use crate::error::{EscrowError, EscrowResult};

use futures::stream::{self, BoxStream, StreamExt};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{TransactionReceipt, H256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Confirmation tracking parameters
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Blocks (including the inclusion block) before a transaction is final
    pub required_confirmations: u64,
    pub poll_interval: Duration,
    /// Upper bound on the wait between submission and finality
    pub timeout: Duration,
}

impl TrackerConfig {
    pub fn from_network(config: &NetworkConfig) -> Self {
        Self {
            required_confirmations: config.tx_required_confirmations.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_secs(config.confirmation_timeout_secs),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 2,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Lifecycle events of a submitted transaction
#[derive(Debug)]
pub enum TxEvent {
    Submitted { tx_hash: H256 },
    Confirmation { depth: u64 },
    Receipt(TransactionReceipt),
    Error(EscrowError),
}

/// Event stream of one submission
pub type ConfirmationStream = BoxStream<'static, TxEvent>;

/// Terminal state of a submission that reached finality
#[derive(Debug, Clone)]
pub struct Finality {
    pub tx_hash: H256,
    pub receipt: TransactionReceipt,
    /// Highest confirmation depth observed
    pub confirmations: u64,
}

enum Stage {
    Unsent { tx: UnsignedTx, wallet: LocalWallet },
    Pending { tx_hash: H256, deadline: Instant, depth: u64 },
    Final(TransactionReceipt),
    Done,
}

struct Pump<C: ?Sized> {
    client: Arc<C>,
    config: TrackerConfig,
    stage: Stage,
}

/// Signs, submits and follows transactions to finality
pub struct ConfirmationTracker<C: ?Sized> {
    client: Arc<C>,
    config: TrackerConfig,
}

impl<C: ChainClient + ?Sized + 'static> ConfirmationTracker<C> {
    pub fn new(client: Arc<C>, config: TrackerConfig) -> Self {
        Self { client, config }
    }

    /// Submit `tx`, signed by the keyring wallet registered for its sender.
    ///
    /// The signer lookup is the only check performed eagerly; signing, broadcast
    /// and confirmation polling happen as the returned stream is consumed.
    pub fn submit(&self, keyring: &Keyring, tx: UnsignedTx) -> EscrowResult<ConfirmationStream> {
        let wallet = keyring.wallet(tx.from)?.clone();
        let pump = Pump {
            client: self.client.clone(),
            config: self.config.clone(),
            stage: Stage::Unsent { tx, wallet },
        };
        Ok(stream::unfold(pump, |pump| pump.step()).boxed())
    }

    /// Submit `tx` and wait for its terminal event
    pub async fn submit_and_wait(&self, keyring: &Keyring, tx: UnsignedTx) -> EscrowResult<Finality> {
        let label = tx.label.clone();
        let events = self.submit(keyring, tx)?;
        wait_final(&label, events).await
    }
}

impl<C: ChainClient + ?Sized> Pump<C> {
    async fn step(mut self) -> Option<(TxEvent, Self)> {
        loop {
            match std::mem::replace(&mut self.stage, Stage::Done) {
                Stage::Done => return None,
                Stage::Final(receipt) => return Some((TxEvent::Receipt(receipt), self)),
                Stage::Unsent { tx, wallet } => {
                    return match self.send(tx, wallet).await {
                        Ok(tx_hash) => {
                            self.stage = Stage::Pending {
                                tx_hash,
                                deadline: Instant::now() + self.config.timeout,
                                depth: 0,
                            };
                            Some((TxEvent::Submitted { tx_hash }, self))
                        }
                        Err(e) => Some((TxEvent::Error(e), self)),
                    };
                }
                Stage::Pending {
                    tx_hash,
                    deadline,
                    depth,
                } => match tokio::time::timeout_at(deadline, self.poll(tx_hash, depth)).await {
                    Err(_) => return Some((TxEvent::Error(self.timed_out(tx_hash)), self)),
                    Ok(Ok(Some((new_depth, receipt)))) => {
                        self.stage = if new_depth >= self.config.required_confirmations {
                            Stage::Final(receipt)
                        } else {
                            Stage::Pending {
                                tx_hash,
                                deadline,
                                depth: new_depth,
                            }
                        };
                        return Some((TxEvent::Confirmation { depth: new_depth }, self));
                    }
                    Ok(Ok(None)) => {
                        if Instant::now() >= deadline {
                            return Some((TxEvent::Error(self.timed_out(tx_hash)), self));
                        }
                        self.stage = Stage::Pending {
                            tx_hash,
                            deadline,
                            depth,
                        };
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                    Ok(Err(e)) => return Some((TxEvent::Error(e), self)),
                },
            }
        }
    }

    fn timed_out(&self, tx_hash: H256) -> EscrowError {
        EscrowError::ConfirmationTimeout {
            tx_hash: format!("{:?}", tx_hash),
            waited_secs: self.config.timeout.as_secs(),
        }
    }

    async fn send(&self, tx: UnsignedTx, wallet: LocalWallet) -> EscrowResult<H256> {
        debug!(
            "Signing {} ({}) to {}",
            tx.label,
            if tx.is_eip1559() { "type 2" } else { "legacy" },
            tx.to()
                .map_or_else(|| "contract creation".to_string(), |to| display_address(&to))
        );
        let signature = wallet
            .sign_transaction(&tx.tx)
            .await
            .map_err(|e| EscrowError::Submission(format!("signing {}: {}", tx.label, e)))?;
        let raw = tx.tx.rlp_signed(&signature);
        let tx_hash = tokio::time::timeout(self.config.timeout, self.client.send_raw_transaction(raw))
            .await
            .map_err(|_| {
                EscrowError::Submission(format!(
                    "{}: no answer from the node within {}s",
                    tx.label,
                    self.config.timeout.as_secs()
                ))
            })??;
        info!(
            "Sent {}: {:?} (gas {}, value {})",
            tx.label,
            tx_hash,
            tx.gas(),
            tx.value()
        );
        Ok(tx_hash)
    }

    /// Returns the new depth when it grew past `depth`, `None` when nothing changed
    async fn poll(&self, tx_hash: H256, depth: u64) -> EscrowResult<Option<(u64, TransactionReceipt)>> {
        let receipt = match self.client.transaction_receipt(tx_hash).await? {
            Some(receipt) => receipt,
            None if depth > 0 => {
                warn!("Transaction {:?} dropped out of the chain", tx_hash);
                return Err(EscrowError::ReorgDetected {
                    tx_hash: format!("{:?}", tx_hash),
                });
            }
            None => return Ok(None),
        };

        if receipt.status == Some(0u64.into()) {
            return Err(EscrowError::TransactionReverted {
                tx_hash: format!("{:?}", tx_hash),
            });
        }

        let Some(included_at) = receipt.block_number else {
            return Ok(None);
        };
        let head = self.client.block_number().await?;
        let current = head.saturating_sub(included_at.as_u64()) + 1;

        if current > depth {
            debug!(
                "Transaction {:?} has {} / {} confirmations",
                tx_hash, current, self.config.required_confirmations
            );
            Ok(Some((current, receipt)))
        } else {
            Ok(None)
        }
    }
}

/// Drain a confirmation stream, logging each event, and return its terminal state
pub async fn wait_final(label: &str, mut events: ConfirmationStream) -> EscrowResult<Finality> {
    let mut tx_hash = H256::zero();
    let mut confirmations = 0;

    while let Some(event) = events.next().await {
        match event {
            TxEvent::Submitted { tx_hash: hash } => tx_hash = hash,
            TxEvent::Confirmation { depth, .. } => {
                confirmations = depth;
                info!("{} confirmation {}", label, depth);
            }
            TxEvent::Receipt(receipt) => {
                info!("{} final: {:?}", label, receipt.transaction_hash);
                return Ok(Finality {
                    tx_hash,
                    receipt,
                    confirmations,
                });
            }
            TxEvent::Error(e) => {
                warn!("{} failed: {}", label, e);
                return Err(e);
            }
        }
    }

    Err(EscrowError::Submission(format!(
        "{}: event stream ended without a terminal event",
        label
    )))
}
