//! zond-escrow - ZondBridge / ZondAtomicSwap deployment and hash-locked swap tooling
//!
//! Deploys the bridge, swap and mock token contracts, locks funds into the atomic
//! swap contract under a SHA-256 hash lock, and reports on-chain swap and bridge state.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

mod abi;
mod account;
mod artifacts;
mod bridge;
mod chain;
mod config;
mod deploy;
mod error;
mod escrow;
mod token;
mod tx;

#[cfg(test)]
mod testing;

use abi::{display_address, parse_address, parse_amount};
use account::{derive_account, provision, Keyring, SigningIdentity};
use artifacts::{ArtifactResolver, ArtifactSet, HypcCompiler};
use bridge::BridgeInfo;
use chain::{ChainClient, RpcClient};
use config::{require, Settings};
use deploy::Deployer;
use error::EscrowError;
use escrow::types::HashLock;
use escrow::{LockParams, SwapCoordinator, SwapStatus, SwapVariant};
use tx::{ConfirmationTracker, GasEstimator, TrackerConfig, TransactionBuilder};

#[derive(Parser)]
#[command(name = "zond-escrow")]
#[command(version)]
#[command(about = "Deploy bridge and swap contracts and drive hash-locked swaps", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $ZOND_ESCROW_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a contract
    #[command(subcommand)]
    Deploy(DeployTarget),

    /// Lock funds into the atomic swap contract
    Lock {
        /// Omit the counter-asset terms of the paired chain
        #[arg(long)]
        one_sided: bool,
    },

    /// Show the swap contract summary and, given its parameters, one swap
    Inspect {
        /// Locker address
        locker: Option<String>,
        /// Swap secret (hashed locally, never sent)
        secret: Option<String>,
        /// Recipient identifier as passed to lock
        recipient: Option<String>,
    },

    /// Show bridge balance, relayer, treasury and nonce
    BridgeInfo,

    /// Transfer tokens (to the own account unless --to is given)
    Transfer {
        #[arg(long)]
        to: Option<String>,
    },

    /// Print the code deployed at an address
    Code {
        address: String,
    },

    /// Show the address and hex seed derived from the configured mnemonic
    Account,

    /// Check a secret against a published hash lock
    Verify {
        secret: String,
        /// Hash lock as printed by lock, 0x-prefixed hex
        hash: String,
    },
}

#[derive(Subcommand)]
enum DeployTarget {
    /// ZondBridge(relayer, treasury)
    Bridge,
    /// ZondAtomicSwap()
    Swap,
    /// MockERC20(name, symbol, decimals, supply)
    Token,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let precondition = e
                .chain()
                .filter_map(|cause| cause.downcast_ref::<EscrowError>())
                .any(EscrowError::is_precondition);
            if precondition {
                error!("Precondition failed: {:#}", e);
            } else {
                error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    let client = Arc::new(RpcClient::new(&settings.network)?);

    match cli.command {
        Command::Deploy(target) => deploy(&settings, client, target).await,
        Command::Lock { one_sided } => lock(&settings, client, one_sided).await,
        Command::Inspect {
            locker,
            secret,
            recipient,
        } => inspect(&settings, client, locker, secret, recipient).await,
        Command::BridgeInfo => bridge_info(&settings, client).await,
        Command::Transfer { to } => transfer(&settings, client, to).await,
        Command::Code { address } => {
            let address = parse_address(&address)?;
            let code = client.code(address).await.context("fetching code")?;
            println!("{}", code);
            Ok(())
        }
        Command::Account => {
            let identity = derive_account(require(&settings.wallet.mnemonic, "MNEMONIC")?)?;
            println!("Address  : {}", display_address(&identity.address()));
            println!("Hex seed : {}", identity.hex_seed());
            Ok(())
        }
        Command::Verify { secret, hash } => verify(&secret, &hash),
    }
}

fn verify(secret: &str, hash: &str) -> Result<()> {
    let lock = HashLock::parse(hash)?;
    if lock.verify(secret.as_bytes()) {
        println!("Secret opens hash lock {}", lock);
        Ok(())
    } else {
        anyhow::bail!("secret does not open hash lock {}", lock)
    }
}

fn signer(settings: &Settings, keyring: &mut Keyring) -> Result<SigningIdentity> {
    let phrase = require(&settings.wallet.mnemonic, "MNEMONIC")?;
    let identity = provision(phrase, keyring).context("provisioning account")?;
    info!("Using account {}", display_address(&identity.address()));
    Ok(identity)
}

async fn compile(settings: &Settings) -> Result<ArtifactSet> {
    let resolver = ArtifactResolver::new(
        HypcCompiler::new(settings.compiler.binary.clone()),
        settings.compiler.clone(),
    );
    resolver.load().await.context("compiling contracts")
}

fn gas_estimator(settings: &Settings) -> GasEstimator {
    GasEstimator::new(settings.network.gas_limit_buffer_percent)
}

async fn deploy(settings: &Settings, client: Arc<RpcClient>, target: DeployTarget) -> Result<()> {
    let mut keyring = Keyring::new();
    let identity = signer(settings, &mut keyring)?;

    let (contract, args) = match target {
        DeployTarget::Bridge => (
            &settings.contracts.bridge_contract,
            bridge::constructor_args(&settings.bridge)?,
        ),
        DeployTarget::Swap => (&settings.contracts.swap_contract, Vec::new()),
        DeployTarget::Token => (
            &settings.contracts.mock_token_contract,
            token::constructor_args(&settings.token)?,
        ),
    };

    let artifacts = compile(settings).await?;
    let artifact = artifacts.get(contract)?;

    let deployer = Deployer::new(
        client,
        gas_estimator(settings),
        TrackerConfig::from_network(&settings.network),
    );
    let deployment = deployer
        .deploy(&keyring, &identity, artifact, &args)
        .await
        .with_context(|| format!("deploying {}", contract))?;
    println!("{}", deployment);
    Ok(())
}

async fn lock(settings: &Settings, client: Arc<RpcClient>, one_sided: bool) -> Result<()> {
    let swap_address = parse_address(require(
        &settings.contracts.atomic_swap_address,
        "ZOND_ATOMIC_SWAP_CONTRACT_ADDRESS",
    )?)?;
    let variant = if one_sided {
        SwapVariant::OneSided
    } else {
        SwapVariant::TwoSided
    };
    let params = LockParams {
        secret: settings.swap.secret.clone(),
        recipient: settings.swap.recipient.clone(),
        expiry_ts: settings.swap.expiry_ts.clone(),
        asset: settings.swap.asset.clone(),
        amount: settings.swap.amount.clone(),
        desired_asset: settings.swap.desired_asset.clone(),
        desired_amount: settings.swap.desired_amount.clone(),
    };
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let request = params.into_request(variant, now)?;

    let mut keyring = Keyring::new();
    let identity = signer(settings, &mut keyring)?;

    let artifacts = compile(settings).await?;
    let swap = artifacts.get(&settings.contracts.swap_contract)?.at(swap_address);
    let token_abi = artifacts.get(&settings.contracts.token_interface)?.abi.clone();

    let coordinator = SwapCoordinator::new(
        client,
        swap,
        token_abi,
        gas_estimator(settings),
        TrackerConfig::from_network(&settings.network),
    )
    .with_token_interface(settings.contracts.token_interface.clone());

    let outcome = coordinator
        .lock(&keyring, &identity, &request)
        .await
        .context("locking swap")?;

    if let Some(approval) = &outcome.approval {
        println!("Approve receipt  : {:?}", approval.tx_hash);
    }
    println!("Lock receipt     : {:?}", outcome.lock.tx_hash);
    println!("Hash H           : {}", outcome.hash_lock);
    println!("Swap ID          : {}", outcome.swap_id);
    println!("Phase            : {}", outcome.phase);
    Ok(())
}

async fn inspect(
    settings: &Settings,
    client: Arc<RpcClient>,
    locker: Option<String>,
    secret: Option<String>,
    recipient: Option<String>,
) -> Result<()> {
    let swap_address = parse_address(require(
        &settings.contracts.atomic_swap_address,
        "ZOND_ATOMIC_SWAP_CONTRACT_ADDRESS",
    )?)?;
    let artifacts = compile(settings).await?;
    let swap = artifacts.get(&settings.contracts.swap_contract)?.at(swap_address);
    let token_abi = artifacts.get(&settings.contracts.token_interface)?.abi.clone();

    let coordinator = SwapCoordinator::new(
        client,
        swap,
        token_abi,
        gas_estimator(settings),
        TrackerConfig::from_network(&settings.network),
    );

    let summary = coordinator.summary().await.context("reading contract summary")?;
    println!("{}\n", summary);

    // The lookup is optional: without all three parameters only the summary is shown
    let (Some(locker), Some(secret), Some(recipient)) = (locker, secret, recipient) else {
        return Ok(());
    };
    let locker = parse_address(&locker)?;
    let (swap_id, record) = coordinator
        .find_swap(locker, &secret, &recipient)
        .await
        .context("looking up swap")?;

    println!("swapID           : {}", swap_id);
    match record {
        None => println!("Swap not found on-chain"),
        Some(record) => {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            println!("{}", record);
            let status = match record.status(now) {
                SwapStatus::NotFound => "not found",
                SwapStatus::Locked => "locked",
                SwapStatus::Claimed => "claimed",
                SwapStatus::Refundable => "expired, refundable",
            };
            println!("status           : {}", status);
        }
    }
    Ok(())
}

async fn bridge_info(settings: &Settings, client: Arc<RpcClient>) -> Result<()> {
    let bridge_address = parse_address(require(
        &settings.contracts.bridge_address,
        "BRIDGE_CONTRACT_ADDRESS",
    )?)?;
    let artifacts = compile(settings).await?;
    let bridge = artifacts.get(&settings.contracts.bridge_contract)?.at(bridge_address);

    let info = BridgeInfo::fetch(&*client, &bridge)
        .await
        .context("reading bridge state")?;
    println!("{}", info);
    Ok(())
}

async fn transfer(settings: &Settings, client: Arc<RpcClient>, to: Option<String>) -> Result<()> {
    let token_address = parse_address(require(&settings.contracts.token_address, "TOKEN_ADDRESS")?)?;
    let amount = parse_amount(require(&settings.token.transfer_amount, "AMOUNT")?, "AMOUNT")?;
    let recipient = to.as_deref().map(parse_address).transpose()?;

    let mut keyring = Keyring::new();
    let identity = signer(settings, &mut keyring)?;
    let recipient = recipient.unwrap_or_else(|| identity.address());

    let artifacts = compile(settings).await?;
    let token = artifacts
        .get(&settings.contracts.token_interface)?
        .at(token_address);

    let builder = TransactionBuilder::new(client.clone(), gas_estimator(settings));
    let tracker = ConfirmationTracker::new(client, TrackerConfig::from_network(&settings.network));
    let finality = token::transfer(
        &builder,
        &tracker,
        &keyring,
        &identity,
        &token,
        recipient,
        amount,
    )
    .await
    .context("transferring tokens")?;

    println!(
        "Transferred {} to {} in {:?} ({} confirmations)",
        amount,
        display_address(&recipient),
        finality.tx_hash,
        finality.confirmations
    );
    Ok(())
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,zond_escrow=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["zond-escrow", "--config", "x.toml", "lock", "--one-sided"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Command::Lock { one_sided: true }));
        assert!(!cli.log_json);

        let cli = Cli::parse_from(["zond-escrow", "bridge-info", "--log-json"]);
        assert!(cli.log_json);

        let cli = Cli::parse_from(["zond-escrow", "verify", "s3cret", "0xabc"]);
        assert!(matches!(cli.command, Command::Verify { .. }));

        let cli = Cli::parse_from(["zond-escrow", "deploy", "token"]);
        assert!(matches!(cli.command, Command::Deploy(DeployTarget::Token)));

        let cli = Cli::parse_from(["zond-escrow", "inspect", "Z01", "s3cret", "bob"]);
        match cli.command {
            Command::Inspect { locker, secret, recipient } => {
                assert_eq!(locker.as_deref(), Some("Z01"));
                assert_eq!(secret.as_deref(), Some("s3cret"));
                assert_eq!(recipient.as_deref(), Some("bob"));
            }
            _ => panic!("expected inspect"),
        }
    }

    #[test]
    fn test_verify_checks_secret_against_hash() {
        let hash = HashLock::from_secret(b"s3cret").to_string();
        assert!(verify("s3cret", &hash).is_ok());
        assert!(verify("s3cre7", &hash).is_err());
        assert!(verify("s3cret", "0x12").is_err());
    }

    #[test]
    fn test_precondition_errors_survive_context() {
        let err = anyhow::Error::from(EscrowError::MissingParameter("SECRET".into()))
            .context("locking swap");
        assert!(err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<EscrowError>())
            .any(EscrowError::is_precondition));
    }

    #[test]
    fn test_cli_rejects_unknown_deploy_target() {
        assert!(Cli::try_parse_from(["zond-escrow", "deploy", "vault"]).is_err());
    }
}
