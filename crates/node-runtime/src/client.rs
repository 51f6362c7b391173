//! # Simulated Client
//!
//! A wallet that signs random transfers and broadcasts each one to every
//! node in the NodeTable. Amounts are drawn from `[5, 25)` and fees from
//! `[0.01, 1.2)`; the client stops once its balance cannot cover the next
//! transfer.

use futures::future::join_all;
use ql_01_ledger::{Amount, Transaction, TransactionError};
use ql_04_transport::{Transport, WireMessage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_crypto::{keccak256, Secp256k1KeyPair};
use shared_types::{hash_hex, short_hex, Address, NodeTable};
use std::ops::Range;
use tracing::{debug, info, warn};

pub const AMOUNT_RANGE: Range<f64> = 5.0..25.0;
pub const FEE_RANGE: Range<f64> = 0.01..1.2;

/// Outcome of `SimulatedClient::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientReport {
    /// Transactions delivered to at least one node.
    pub submitted: usize,
    /// Transactions no node accepted.
    pub undelivered: usize,
    /// Whether the run stopped early for lack of funds.
    pub exhausted: bool,
}

pub struct SimulatedClient {
    id: String,
    address: Address,
    balance: Amount,
    keypair: Secp256k1KeyPair,
}

impl SimulatedClient {
    /// A client with a fresh key and an address derived from it.
    pub fn new(id: impl Into<String>, balance: Amount) -> Self {
        let keypair = Secp256k1KeyPair::generate();
        let address = address_of(&keypair);
        Self::with_keypair(id, address, balance, keypair)
    }

    pub fn with_keypair(
        id: impl Into<String>,
        address: Address,
        balance: Amount,
        keypair: Secp256k1KeyPair,
    ) -> Self {
        Self {
            id: id.into(),
            address,
            balance,
            keypair,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Sign a transfer of `amount` plus `fee` and deduct it.
    ///
    /// Returns `Ok(None)` when the balance cannot cover it.
    pub fn transfer(
        &mut self,
        receiver: &Address,
        amount: f64,
        fee: f64,
    ) -> Result<Option<Transaction>, TransactionError> {
        let tx = Transaction::create(
            self.address.clone(),
            receiver.clone(),
            amount,
            fee,
            &self.keypair,
        )?;
        let Some(remaining) = tx
            .total_cost()
            .and_then(|cost| self.balance.checked_sub(cost))
        else {
            return Ok(None);
        };
        self.balance = remaining;
        Ok(Some(tx))
    }

    /// A transfer with random amount and fee.
    pub fn random_transfer(
        &mut self,
        receiver: &Address,
        rng: &mut impl Rng,
    ) -> Result<Option<Transaction>, TransactionError> {
        let amount = rng.gen_range(AMOUNT_RANGE);
        let fee = rng.gen_range(FEE_RANGE);
        self.transfer(receiver, amount, fee)
    }

    /// Send `tx` to every node in `table`; returns how many accepted it.
    pub async fn submit<T: Transport>(
        &self,
        transport: &T,
        table: &NodeTable,
        tx: &Transaction,
    ) -> Result<usize, ql_04_transport::CodecError> {
        let payload = WireMessage::from(tx.clone()).encode()?;
        let sends = table.iter().map(|(node, address)| {
            let payload = &payload;
            async move {
                match transport.send(payload, address).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(client = %self.id, %node, error = %err, "Transaction send failed");
                        false
                    }
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|sent| *sent).count();
        debug!(client = %self.id, tx = %short_hex(&tx.hash), delivered, "Transaction broadcast");
        Ok(delivered)
    }

    /// Generate and submit up to `count` random transfers to `receivers`.
    pub async fn run<T: Transport>(
        &mut self,
        transport: &T,
        table: &NodeTable,
        receivers: &[Address],
        count: usize,
    ) -> ClientReport {
        let mut report = ClientReport::default();
        if receivers.is_empty() {
            return report;
        }
        let mut rng = StdRng::from_entropy();

        for _ in 0..count {
            let receiver = &receivers[rng.gen_range(0..receivers.len())];
            let tx = match self.random_transfer(receiver, &mut rng) {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    report.exhausted = true;
                    break;
                }
                Err(err) => {
                    warn!(client = %self.id, error = %err, "Could not build transaction");
                    continue;
                }
            };
            match self.submit(transport, table, &tx).await {
                Ok(0) | Err(_) => report.undelivered += 1,
                Ok(_) => report.submitted += 1,
            }
        }

        info!(
            client = %self.id,
            submitted = report.submitted,
            undelivered = report.undelivered,
            balance = %self.balance,
            "Client finished"
        );
        report
    }
}

/// `0x` + the first 20 bytes of the Keccak-256 of the public key.
pub fn address_of(keypair: &Secp256k1KeyPair) -> Address {
    let digest = hash_hex(&keccak256(keypair.public_key().as_bytes()));
    Address::new(format!("0x{}", &digest[..40]))
}
