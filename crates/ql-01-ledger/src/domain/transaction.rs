//! Signed client transactions.

use super::amount::Amount;
use super::error::TransactionError;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_crypto::{keccak256, Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
use shared_types::{now_millis, Address, Hash};

/// Domain tag prefixed to the canonical transaction encoding.
const TRANSACTION_TAG: &[u8] = b"QL-TRAN";

/// A signed transfer from `sender` to `receiver`.
///
/// Immutable once created. `hash` identifies the transaction for
/// deduplication and block inclusion.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub receiver: Address,
    pub amount: Amount,
    pub fee: Amount,
    /// Creation time, unix milliseconds.
    pub timestamp: u64,
    pub sender_key: Secp256k1PublicKey,
    pub signature: Secp256k1Signature,
    #[serde_as(as = "Hex")]
    pub hash: Hash,
}

impl Transaction {
    /// Build and sign a transaction stamped with the current time.
    pub fn create(
        sender: Address,
        receiver: Address,
        amount: f64,
        fee: f64,
        keypair: &Secp256k1KeyPair,
    ) -> Result<Self, TransactionError> {
        Self::create_at(sender, receiver, amount, fee, now_millis(), keypair)
    }

    /// Build and sign a transaction with an explicit timestamp.
    pub fn create_at(
        sender: Address,
        receiver: Address,
        amount: f64,
        fee: f64,
        timestamp: u64,
        keypair: &Secp256k1KeyPair,
    ) -> Result<Self, TransactionError> {
        let amount = Amount::from_decimal(amount).ok_or(TransactionError::InvalidAmount {
            field: "amount",
            value: amount,
        })?;
        let fee = Amount::from_decimal(fee).ok_or(TransactionError::InvalidAmount {
            field: "fee",
            value: fee,
        })?;
        Ok(Self::sign_with(sender, receiver, amount, fee, timestamp, keypair))
    }

    /// Build and sign from already-validated amounts.
    pub fn sign_with(
        sender: Address,
        receiver: Address,
        amount: Amount,
        fee: Amount,
        timestamp: u64,
        keypair: &Secp256k1KeyPair,
    ) -> Self {
        let sender_key = keypair.public_key();
        let payload = canonical_encoding(&sender, &receiver, amount, fee, timestamp, &sender_key);
        Self {
            signature: keypair.sign(&payload),
            hash: keccak256(&payload),
            sender,
            receiver,
            amount,
            fee,
            timestamp,
            sender_key,
        }
    }

    /// Canonical byte encoding covered by the signature and the hash.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_encoding(
            &self.sender,
            &self.receiver,
            self.amount,
            self.fee,
            self.timestamp,
            &self.sender_key,
        )
    }

    /// Recompute the content hash from the signed fields.
    pub fn compute_hash(&self) -> Hash {
        keccak256(&self.canonical_bytes())
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// `true` iff the stored hash matches the fields and the signature
    /// verifies against the sender key.
    ///
    /// `sender` is a signed label, not an identity: it is covered by the
    /// signature but never checked against `sender_key`, so any key may sign
    /// for any address. The ledger keeps no balances and grants nothing on
    /// the strength of the label.
    pub fn verify(&self) -> bool {
        let payload = self.canonical_bytes();
        keccak256(&payload) == self.hash
            && shared_crypto::verify(&self.sender_key, &payload, &self.signature)
    }

    /// Amount plus fee, the total debited from the sender.
    pub fn total_cost(&self) -> Option<Amount> {
        self.amount.checked_add(self.fee)
    }
}

fn canonical_encoding(
    sender: &Address,
    receiver: &Address,
    amount: Amount,
    fee: Amount,
    timestamp: u64,
    sender_key: &Secp256k1PublicKey,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(TRANSACTION_TAG.len() + 128);
    out.extend_from_slice(TRANSACTION_TAG);
    push_field(&mut out, sender.as_str().as_bytes());
    push_field(&mut out, receiver.as_str().as_bytes());
    out.extend_from_slice(&amount.units().to_le_bytes());
    out.extend_from_slice(&fee.units().to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(sender_key.as_bytes());
    out
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}
