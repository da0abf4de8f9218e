//! Wallet signature verification.
//!
//! A client proves it controls an address by signing a message with the
//! wallet's key. The server recovers the signer from the signature and
//! compares it to the address the client claims. Nothing is stored: the
//! check is a pure function of `(message, signature, claimed address)`.
//!
//! Messages are signed the way wallets sign human-readable text
//! (EIP-191 "personal message"):
//!
//! ```text
//! keccak256("\x19Ethereum Signed Message:\n" ++ len(message) ++ message)
//! ```
//!
//! and the signature is `0x` + hex of `r || s || v`, 65 bytes.

use forgeauth_protocol::Address;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::{SignatureError, VerifierError};

/// Length of an `r || s || v` signature in bytes.
const SIGNATURE_LEN: usize = 65;

/// The message a client signs to authenticate an API call.
///
/// ```rust
/// use forgeauth_session::canonical_message;
///
/// assert_eq!(
///     canonical_message("TokenForge", 1_700_000_000_000),
///     "TokenForge API Authentication\nTimestamp: 1700000000000",
/// );
/// ```
pub fn canonical_message(app_name: &str, timestamp: u64) -> String {
    format!("{app_name} API Authentication\nTimestamp: {timestamp}")
}

/// EIP-191 personal-message digest of `message`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", bytes.len()));
    hasher.update(bytes);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Recovers the address that produced `signature` over `message`.
///
/// # Errors
/// A [`SignatureError`] describing what was wrong with the signature.
pub fn recover_address(
    message: &str,
    signature: &str,
) -> Result<Address, SignatureError> {
    let digits = signature
        .trim()
        .strip_prefix("0x")
        .ok_or(SignatureError::MissingPrefix)?;
    let bytes = hex::decode(digits)?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(SignatureError::Length(bytes.len()));
    }

    let sig = Signature::try_from(&bytes[..64])
        .map_err(|_| SignatureError::Malformed)?;
    let recovery_id = normalize_recovery_id(bytes[64])?;
    let prehash = personal_message_hash(message);

    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|_| SignatureError::Recovery)?;
    address_of(&key)
}

/// `true` iff `signature` over `message` was produced by `claimed_address`.
///
/// Address comparison ignores case. Malformed input of any kind yields
/// `false`; this function never panics and never errors.
pub fn verify_signature(
    message: &str,
    signature: &str,
    claimed_address: &str,
) -> bool {
    match recover_address(message, signature) {
        Ok(signer) => signer.matches(claimed_address),
        Err(e) => {
            tracing::debug!(error = %e, "signature recovery failed");
            false
        }
    }
}

/// Wallets emit `v` as 27/28; raw ECDSA tooling emits 0/1.
fn normalize_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        27 | 28 => v - 27,
        0 | 1 => v,
        other => return Err(SignatureError::RecoveryId(other)),
    };
    RecoveryId::from_byte(id).ok_or(SignatureError::RecoveryId(v))
}

fn address_of(key: &VerifyingKey) -> Result<Address, SignatureError> {
    let encoded = key.to_encoded_point(false);
    let pubkey = encoded.as_bytes();
    // Uncompressed SEC1: 0x04 || x || y
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(SignatureError::Recovery);
    }
    let digest = Keccak256::digest(&pubkey[1..]);
    let mut account = [0u8; 20];
    account.copy_from_slice(&digest[12..]);
    Ok(Address::from_bytes(account))
}

// ---------------------------------------------------------------------------
// Pluggable verifier
// ---------------------------------------------------------------------------

/// Checks that a message was signed by a claimed address.
///
/// The request middleware holds one of these behind an `Arc`. `Ok(false)`
/// means "wrong signer or malformed signature"; `Err` means the verifier
/// itself broke, and the caller maps it to a generic failure.
pub trait SignatureVerifier: Send + Sync + 'static {
    fn verify(
        &self,
        message: &str,
        signature: &str,
        claimed_address: &str,
    ) -> Result<bool, VerifierError>;
}

/// EIP-191 recovery with secp256k1. Never returns `Err`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EthereumVerifier;

impl SignatureVerifier for EthereumVerifier {
    fn verify(
        &self,
        message: &str,
        signature: &str,
        claimed_address: &str,
    ) -> Result<bool, VerifierError> {
        Ok(verify_signature(message, signature, claimed_address))
    }
}

// =========================================================================
// Tests
// =========================================================================
