//! Hash-locked swap data model

use crate::abi::{display_address, parse_address, parse_amount, token_address, token_bool, token_text, token_uint};
use crate::error::{EscrowError, EscrowResult};

use ethers::abi::{Function, Token};
use ethers::types::{Address, U256};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::fmt;

/// The asset a swap locks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    /// The network's native coin, written as the all-zero address on-chain
    Native,
    Token(Address),
}

impl Asset {
    /// Parse an asset address; the zero address in either prefix form is `Native`
    pub fn parse(input: &str) -> EscrowResult<Self> {
        Ok(Self::from_address(parse_address(input)?))
    }

    pub fn from_address(address: Address) -> Self {
        if address.is_zero() {
            Asset::Native
        } else {
            Asset::Token(address)
        }
    }

    /// On-chain representation
    pub fn address(&self) -> Address {
        match self {
            Asset::Native => Address::zero(),
            Asset::Token(address) => *address,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "ZND (native)"),
            Asset::Token(address) => write!(f, "{}", display_address(address)),
        }
    }
}

/// SHA-256 commitment to a swap secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashLock(pub [u8; 32]);

impl HashLock {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self(Sha256::digest(secret).into())
    }

    /// Check a candidate preimage against the commitment
    pub fn verify(&self, secret: &[u8]) -> bool {
        Self::from_secret(secret) == *self
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a published commitment, `0x` prefix optional
    pub fn parse(input: &str) -> EscrowResult<Self> {
        let trimmed = input.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| EscrowError::invalid("hash", e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EscrowError::invalid("hash", "expected 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for HashLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Swap identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapId(pub [u8; 32]);

impl SwapId {
    /// keccak256(locker ‖ hashedSecret ‖ recipientRaw), packed encoding.
    ///
    /// Needs no contract state; the contract's `previewSwapID` stays authoritative
    /// for lookups.
    pub fn derive(locker: Address, hash_lock: &HashLock, recipient_raw: &str) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(locker.as_bytes());
        hasher.update(hash_lock.as_bytes());
        hasher.update(recipient_raw.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Whether the lock also records counter-terms on the paired chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapVariant {
    OneSided,
    TwoSided,
}

/// Parameters of a `lock` call
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub hash_lock: HashLock,
    pub recipient_raw: String,
    pub expiry_ts: u64,
    pub asset: Asset,
    pub amount: U256,
    pub variant: SwapVariant,
    /// Counter-asset identifier on the paired chain; required for `TwoSided`
    pub desired_asset: Option<String>,
    /// Defaults to `amount`
    pub desired_amount: Option<U256>,
}

impl LockRequest {
    /// Reject requests that would not produce a well-formed `lock` call
    pub fn validate(&self, now: u64) -> EscrowResult<()> {
        if self.recipient_raw.trim().is_empty() {
            return Err(EscrowError::MissingParameter("recipient".to_string()));
        }
        if self.variant == SwapVariant::TwoSided
            && self.desired_asset.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            return Err(EscrowError::MissingParameter("desired asset address".to_string()));
        }
        if self.amount.is_zero() {
            return Err(EscrowError::invalid("amount", "must be positive"));
        }
        if self.expiry_ts <= now {
            return Err(EscrowError::invalid(
                "expiry",
                format!("{} is not after the current time {}", self.expiry_ts, now),
            ));
        }
        Ok(())
    }

    pub fn desired_amount(&self) -> U256 {
        self.desired_amount.unwrap_or(self.amount)
    }
}

/// Raw swap parameters as they arrive from configuration or the command line
#[derive(Debug, Clone, Default)]
pub struct LockParams {
    pub secret: Option<String>,
    pub recipient: Option<String>,
    pub expiry_ts: Option<String>,
    pub asset: Option<String>,
    pub amount: Option<String>,
    pub desired_asset: Option<String>,
    pub desired_amount: Option<String>,
}

/// Default lock window when no expiry is given
pub const DEFAULT_EXPIRY_WINDOW_SECS: u64 = 3600;

impl LockParams {
    /// Turn raw parameters into a request; every absent required value fails here,
    /// before any network call
    pub fn into_request(self, variant: SwapVariant, now: u64) -> EscrowResult<LockRequest> {
        let secret = self
            .secret
            .ok_or_else(|| EscrowError::MissingParameter("secret".to_string()))?;
        let recipient_raw = self
            .recipient
            .ok_or_else(|| EscrowError::MissingParameter("recipient".to_string()))?;
        if variant == SwapVariant::TwoSided && self.desired_asset.is_none() {
            return Err(EscrowError::MissingParameter("desired asset address".to_string()));
        }

        let expiry_ts = match self.expiry_ts {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| EscrowError::invalid("expiry", format!("{:?}: {}", raw, e)))?,
            None => now + DEFAULT_EXPIRY_WINDOW_SECS,
        };
        let asset = match self.asset {
            Some(raw) => Asset::parse(&raw)?,
            None => Asset::Native,
        };
        let amount = match self.amount {
            Some(raw) => parse_amount(&raw, "amount")?,
            None => U256::exp10(18),
        };
        let desired_amount = self
            .desired_amount
            .map(|raw| parse_amount(&raw, "desired amount"))
            .transpose()?;

        let request = LockRequest {
            hash_lock: HashLock::from_secret(secret.as_bytes()),
            recipient_raw,
            expiry_ts,
            asset,
            amount,
            variant,
            desired_asset: self.desired_asset,
            desired_amount,
        };
        request.validate(now)?;
        Ok(request)
    }
}

/// Getter field order of the swap record
const SWAP_FIELDS: [&str; 8] = [
    "assetLocked",
    "amountLocked",
    "locker",
    "recipientRaw",
    "desiredAssetRaw",
    "desiredAmount",
    "expiryTs",
    "claimed",
];

/// A swap as stored by the contract
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRecord {
    pub asset_locked: Asset,
    pub amount_locked: U256,
    /// Zero address when the swap was never created
    pub locker: Address,
    pub recipient_raw: String,
    pub desired_asset_raw: Option<String>,
    pub desired_amount: Option<U256>,
    pub expiry_ts: u64,
    pub claimed: bool,
}

/// Lifecycle position of a swap record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    NotFound,
    Locked,
    Claimed,
    /// Expired and unclaimed
    Refundable,
}

impl SwapRecord {
    pub fn exists(&self) -> bool {
        !self.locker.is_zero()
    }

    pub fn status(&self, now: u64) -> SwapStatus {
        if !self.exists() {
            SwapStatus::NotFound
        } else if self.claimed {
            SwapStatus::Claimed
        } else if now >= self.expiry_ts {
            SwapStatus::Refundable
        } else {
            SwapStatus::Locked
        }
    }

    /// Decode the return values of `swaps(bytes32)` by output name
    pub fn from_tokens(function: &Function, tokens: Vec<Token>) -> EscrowResult<Self> {
        // Struct getters may come back as a single tuple, whose field names the ABI drops
        let tokens = match <[Token; 1]>::try_from(tokens) {
            Ok([Token::Tuple(inner)]) => inner,
            Ok([other]) => vec![other],
            Err(tokens) => tokens,
        };
        let names: Vec<&str> = if function.outputs.len() == tokens.len() {
            function.outputs.iter().map(|p| p.name.as_str()).collect()
        } else {
            SWAP_FIELDS.to_vec()
        };

        let field = |name: &str| output_field(&names, &tokens, name);
        let required = |name: &str| {
            field(name).ok_or_else(|| EscrowError::Abi(format!("swaps() output lacks {}", name)))
        };

        Ok(Self {
            asset_locked: Asset::from_address(token_address(required("assetLocked")?)?),
            amount_locked: token_uint(required("amountLocked")?)?,
            locker: token_address(required("locker")?)?,
            recipient_raw: token_text(required("recipientRaw")?),
            desired_asset_raw: field("desiredAssetRaw").map(token_text),
            desired_amount: field("desiredAmount").map(token_uint).transpose()?,
            expiry_ts: u64::try_from(token_uint(required("expiryTs")?)?)
                .map_err(|_| EscrowError::Abi("swaps() expiryTs exceeds 64 bits".to_string()))?,
            claimed: token_bool(required("claimed")?)?,
        })
    }
}

fn output_field<'a>(names: &[&str], tokens: &'a [Token], name: &str) -> Option<&'a Token> {
    names
        .iter()
        .position(|n| *n == name)
        .and_then(|i| tokens.get(i))
}
