//! # Node and Client Signatures
//!
//! secp256k1 ECDSA as used across the ledger: clients sign transactions,
//! validators sign every consensus message and certificate vote.
//!
//! Signing derives its nonce from the key and message (RFC 6979), so the
//! same keypair signing the same bytes always yields the same `r||s`.
//! Verification never fails loudly: a garbage key or signature just does not
//! verify.

use crate::CryptoError;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fmt;
use zeroize::Zeroizing;

const COMPRESSED_LEN: usize = 33;
const SIGNATURE_LEN: usize = 64;

/// SEC1-compressed public key, hex on the wire.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secp256k1PublicKey(#[serde_as(as = "Hex")] [u8; COMPRESSED_LEN]);

impl Secp256k1PublicKey {
    /// Accepts only bytes that decode to a curve point.
    pub fn from_bytes(bytes: [u8; COMPRESSED_LEN]) -> Result<Self, CryptoError> {
        let key = Self(bytes);
        key.verifying_key()?;
        Ok(key)
    }

    /// Compressed point bytes.
    pub fn as_bytes(&self) -> &[u8; COMPRESSED_LEN] {
        &self.0
    }

    /// `true` only when `signature` is a valid signature of `message` by this key.
    pub fn verify(&self, message: &[u8], signature: &Secp256k1Signature) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        match Signature::from_slice(signature.as_bytes()) {
            Ok(parsed) => key.verify(message, &parsed).is_ok(),
            Err(_) => false,
        }
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)
    }

    pub(crate) fn from_verifying_key(key: &VerifyingKey) -> Self {
        let mut compressed = [0u8; COMPRESSED_LEN];
        compressed.copy_from_slice(key.to_encoded_point(true).as_bytes());
        Self(compressed)
    }
}

impl fmt::Debug for Secp256k1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0[..6].iter().map(|b| format!("{b:02x}")).collect();
        write!(f, "Secp256k1PublicKey({prefix}..)")
    }
}

/// Raw `r||s` signature, hex on the wire.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secp256k1Signature(#[serde_as(as = "Hex")] [u8; SIGNATURE_LEN]);

impl Secp256k1Signature {
    /// No validation: malformed bytes surface as a failed `verify`.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// `r||s` bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

/// Signing identity of a client or validator.
///
/// The scalar is zeroized when the inner `SigningKey` drops.
#[derive(Clone)]
pub struct Secp256k1KeyPair {
    secret: SigningKey,
}

impl Secp256k1KeyPair {
    /// Fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Rebuild from a 32-byte scalar; zero or out-of-range scalars are rejected.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        SigningKey::from_bytes((&bytes).into())
            .map(Self::from_signing_key)
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    pub(crate) fn from_signing_key(secret: SigningKey) -> Self {
        Self { secret }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }

    /// Compressed public half.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        Secp256k1PublicKey::from_verifying_key(self.secret.verifying_key())
    }

    /// Deterministic signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Secp256k1Signature {
        let signature: Signature = self.secret.sign(message);
        Secp256k1Signature(signature.to_bytes().into())
    }

    /// Secret scalar, wiped when the returned buffer is dropped.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes().into())
    }
}

impl fmt::Debug for Secp256k1KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secp256k1KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Sign `payload` with `keypair`.
pub fn sign(keypair: &Secp256k1KeyPair, payload: &[u8]) -> Secp256k1Signature {
    keypair.sign(payload)
}

/// Check `signature` over `payload`; any malformed input is `false`.
pub fn verify(
    public_key: &Secp256k1PublicKey,
    payload: &[u8],
    signature: &Secp256k1Signature,
) -> bool {
    public_key.verify(payload, signature)
}
