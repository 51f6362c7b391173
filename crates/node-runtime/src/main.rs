//! # quorum-node
//!
//! ```text
//! quorum-node keygen   --config node.toml
//! quorum-node run      --config node.toml
//! quorum-node simulate --nodes 4 --clients 2 --transactions 10 --export ledger.json
//! ```
//!
//! `run` starts one TCP replica. Every member's public key must already be
//! in the key directory; `keygen` creates any that are missing. `simulate`
//! runs a whole cluster in-process on the memory transport.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use node_runtime::{
    init_logging, LocalCluster, LoggingConfig, Node, NodeConfig, NodeDependencies, NodeSettings,
    SimulatedClient,
};
use ql_01_ledger::{Amount, LedgerExport};
use ql_03_consensus::{ConsensusConfig, ValidatorSet};
use ql_04_transport::adapters::TcpTransport;
use shared_crypto::KeyStore;
use shared_types::{hash_hex, Address};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "quorum-node", version, about = "Permissioned PBFT ledger node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one replica over TCP
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Generate missing key pairs for every NodeTable member
    Keygen {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run an in-process cluster with simulated clients
    Simulate {
        #[arg(long, default_value_t = 4)]
        nodes: usize,
        #[arg(long, default_value_t = 2)]
        clients: usize,
        /// Transactions per client
        #[arg(long, default_value_t = 10)]
        transactions: usize,
        /// Starting balance per client
        #[arg(long, default_value_t = 1_000.0)]
        balance: f64,
        /// Seconds to wait for every transaction to commit
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        #[arg(long, default_value_t = 2_000)]
        view_change_timeout_ms: u64,
        /// Write Node1's ledger here when done
        #[arg(long)]
        export: Option<PathBuf>,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Run { config } => run(config).await,
        Command::Keygen { config } => keygen(config),
        Command::Simulate {
            nodes,
            clients,
            transactions,
            balance,
            timeout_secs,
            view_change_timeout_ms,
            export,
            log_level,
        } => {
            init_logging(&LoggingConfig {
                level: log_level,
                json: false,
            })?;
            let settings = NodeSettings {
                consensus: ConsensusConfig {
                    view_change_timeout_ms,
                    ..ConsensusConfig::default()
                },
                ..NodeSettings::default()
            };
            simulate(SimulationPlan {
                nodes,
                clients,
                transactions,
                balance,
                timeout: Duration::from_secs(timeout_secs),
                export,
                settings,
            })
            .await
        }
    }
}

async fn run(path: PathBuf) -> Result<()> {
    let config = NodeConfig::load(&path)?;
    init_logging(&config.logging)?;

    let table = config.node_table()?;
    let local = config.local_id();
    let store = KeyStore::new(&config.key_dir);
    let keypair = store
        .load_or_generate(local.as_str())
        .with_context(|| format!("loading key pair for {local}"))?;

    let mut members = Vec::with_capacity(table.len());
    for id in table.ids() {
        let key = if *id == local {
            keypair.public_key()
        } else {
            store
                .load_public(id.as_str())
                .with_context(|| format!("public key for {id} (run `quorum-node keygen`)"))?
        };
        members.push((id.clone(), key));
    }

    let node = Node::new(NodeDependencies {
        id: local,
        keypair,
        table,
        validators: ValidatorSet::new(members)?,
        transport: Arc::new(TcpTransport::new(config.tcp.clone())),
        settings: config.node_settings(),
    })?;
    node.start();

    info!(node = %node.id(), "Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    node.shutdown().await;

    if let Some(export) = &config.export_path {
        LedgerExport::write_json(&node.ledger(), export)?;
        info!(path = %export.display(), "Ledger exported");
    }
    Ok(())
}

fn keygen(path: PathBuf) -> Result<()> {
    let config = NodeConfig::load(&path)?;
    let table = config.node_table()?;
    let store = KeyStore::new(&config.key_dir);
    for id in table.ids() {
        store.load_or_generate(id.as_str())?;
        println!("{id}: {}", store.public_key_path(id.as_str()).display());
    }
    Ok(())
}

struct SimulationPlan {
    nodes: usize,
    clients: usize,
    transactions: usize,
    balance: f64,
    timeout: Duration,
    export: Option<PathBuf>,
    settings: NodeSettings,
}

async fn simulate(plan: SimulationPlan) -> Result<()> {
    if plan.nodes == 0 {
        bail!("a cluster needs at least one node");
    }
    let balance = Amount::from_decimal(plan.balance).context("invalid client balance")?;
    let cluster = LocalCluster::spawn(plan.nodes, plan.settings).await?;

    let mut clients: Vec<SimulatedClient> = (1..=plan.clients)
        .map(|k| SimulatedClient::new(format!("client{k}"), balance))
        .collect();
    let addresses: Vec<Address> = clients.iter().map(|c| c.address().clone()).collect();

    let mut submitted = 0;
    for client in &mut clients {
        let receivers: Vec<Address> = addresses
            .iter()
            .filter(|address| *address != client.address())
            .cloned()
            .collect();
        let receivers = if receivers.is_empty() {
            addresses.clone()
        } else {
            receivers
        };
        submitted += cluster
            .run_client(client, &receivers, plan.transactions)
            .await
            .submitted;
    }

    let committed = cluster.wait_for_transactions(submitted, plan.timeout).await;
    if !committed {
        warn!(submitted, "Timed out before every transaction committed");
    }
    for (node, height, tail) in cluster.tail_hashes() {
        info!(%node, height, tail = %hash_hex(&tail), "Final ledger");
    }

    if let Some(path) = &plan.export {
        let ledger = cluster.nodes()[0].ledger();
        LedgerExport::write_json(&ledger, path)?;
        info!(path = %path.display(), blocks = ledger.len(), "Ledger exported");
    }
    cluster.shutdown().await;

    if !committed {
        bail!("{submitted} transactions submitted, not all committed");
    }
    Ok(())
}
