//! Account provisioning: recovery phrase -> signing identity, plus the signer set
//! that transaction submission draws wallets from.

use crate::config::is_placeholder;
use crate::error::{EscrowError, EscrowResult};

use ethers::signers::coins_bip39::{English, Mnemonic};
use ethers::signers::{LocalWallet, MnemonicBuilder, Signer};
use ethers::types::Address;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A derived account: seed, address and the wallet able to sign for it
#[derive(Clone)]
pub struct SigningIdentity {
    seed: [u8; 64],
    wallet: LocalWallet,
}

impl SigningIdentity {
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Hex encoding of the BIP-39 seed, `0x` prefixed
    pub fn hex_seed(&self) -> String {
        format!("0x{}", hex::encode(self.seed))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Derive a signing identity from a recovery phrase.
///
/// Fails with `InvalidMnemonic` for empty, whitespace-only or placeholder phrases,
/// and for phrases that are not valid BIP-39 mnemonics.
pub fn derive_account(recovery_phrase: &str) -> EscrowResult<SigningIdentity> {
    let phrase = recovery_phrase.trim();
    if phrase.is_empty() {
        return Err(EscrowError::InvalidMnemonic("phrase is empty".to_string()));
    }
    if is_placeholder(phrase) {
        return Err(EscrowError::InvalidMnemonic(
            "phrase is still the sample placeholder".to_string(),
        ));
    }
    let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");

    let mnemonic = Mnemonic::<English>::new_from_phrase(&phrase)
        .map_err(|e| EscrowError::InvalidMnemonic(e.to_string()))?;
    let seed = mnemonic
        .to_seed(None)
        .map_err(|e| EscrowError::InvalidMnemonic(e.to_string()))?;

    let wallet = MnemonicBuilder::<English>::default()
        .phrase(phrase.as_str())
        .build()
        .map_err(|e| EscrowError::InvalidMnemonic(e.to_string()))?;

    debug!("Derived account {:?}", wallet.address());
    Ok(SigningIdentity { seed, wallet })
}

/// The set of wallets a workflow may sign with, owned by that workflow
#[derive(Default)]
pub struct Keyring {
    wallets: HashMap<Address, LocalWallet>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity. Returns false when it was already known.
    pub fn register(&mut self, identity: &SigningIdentity) -> bool {
        let address = identity.address();
        if self.wallets.contains_key(&address) {
            return false;
        }
        self.wallets.insert(address, identity.wallet.clone());
        true
    }

    /// Wallet for `address`, or `SignerNotRegistered`
    pub fn wallet(&self, address: Address) -> EscrowResult<&LocalWallet> {
        self.wallets
            .get(&address)
            .ok_or_else(|| EscrowError::SignerNotRegistered {
                address: format!("{:?}", address),
            })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.wallets.len()
    }
}

/// Derive an identity and register it with the keyring
pub fn provision(recovery_phrase: &str, keyring: &mut Keyring) -> EscrowResult<SigningIdentity> {
    let identity = derive_account(recovery_phrase)?;
    if keyring.register(&identity) {
        debug!("Registered signer {:?}", identity.address());
    }
    Ok(identity)
}

#[cfg(test)]
pub(crate) const TEST_PHRASE: &str =
    "test test test test test test test test test test test junk";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_account(TEST_PHRASE).unwrap();
        let b = derive_account(TEST_PHRASE).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.hex_seed(), b.hex_seed());
        assert_eq!(a.hex_seed().len(), 2 + 128);
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let a = derive_account(TEST_PHRASE).unwrap();
        let b = derive_account(&format!("  {}\n", TEST_PHRASE)).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_invalid_phrases_rejected() {
        for phrase in ["", "   \t", "your_mnemonic_here", "not a real mnemonic at all"] {
            assert!(
                matches!(derive_account(phrase), Err(EscrowError::InvalidMnemonic(_))),
                "phrase {:?} should be rejected",
                phrase
            );
        }
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut keyring = Keyring::new();
        let first = provision(TEST_PHRASE, &mut keyring).unwrap();
        let second = provision(TEST_PHRASE, &mut keyring).unwrap();
        assert_eq!(first.address(), second.address());
        assert_eq!(keyring.len(), 1);
        assert!(keyring.wallet(first.address()).is_ok());
    }

    #[test]
    fn test_unknown_signer_is_typed_error() {
        let keyring = Keyring::new();
        assert!(matches!(
            keyring.wallet(Address::zero()),
            Err(EscrowError::SignerNotRegistered { .. })
        ));
    }
}
