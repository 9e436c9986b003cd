//! Binary entry point for utxo-ledger.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use utxo_ledger::blockchain::{Transaction, TransactionError, COIN};
use utxo_ledger::config::{get_default_config_path, Config};
use utxo_ledger::consensus::{EpochReport, TxHandler};
use utxo_ledger::crypto::{generate_keypair, Ed25519Verifier, PrivateKey};
use utxo_ledger::database::{load_batch, OutPoint, PoolSnapshot, UtxoPool};
use utxo_ledger::LedgerResult;

#[derive(Debug, Parser)]
#[command(name = "utxo-ledger", version, about = "Apply epochs of transactions to a UTXO pool")]
struct Cli {
    /// Config file (TOML). Defaults to the per-user config location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one epoch: apply a batch of transactions to a pool snapshot.
    Run {
        /// Pool snapshot (JSON).
        #[arg(long)]
        pool: PathBuf,
        /// Proposed transactions (JSON array), applied in file order.
        #[arg(long)]
        txs: PathBuf,
        /// Where to write the resulting pool snapshot.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build a small ledger in memory and run a sample epoch against it.
    Demo,
    /// Write the default configuration file.
    InitConfig {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref()).context("loading config")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    match cli.command {
        Command::Run { pool, txs, out } => {
            let report = run_epoch(&config, &pool, &txs, out.as_deref())
                .with_context(|| format!("running epoch over {}", txs.display()))?;
            print_report(&report);
        }
        Command::Demo => {
            let report = run_demo(&config).context("running demo epoch")?;
            print_report(&report);
        }
        Command::InitConfig { path } => {
            let path = path.unwrap_or_else(get_default_config_path);
            Config::default()
                .to_file(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn handler_for(config: &Config, pool: &UtxoPool) -> TxHandler<Ed25519Verifier> {
    TxHandler::with_verifier(pool, Ed25519Verifier, config.consensus.clone())
        .log_rejections(config.logging.log_rejections)
}

fn run_epoch(
    config: &Config,
    pool_path: &Path,
    txs_path: &Path,
    out: Option<&Path>,
) -> LedgerResult<EpochReport> {
    let pool = PoolSnapshot::load(pool_path)?.into_pool();
    let batch = load_batch(txs_path)?;
    if !batch.mismatched.is_empty() {
        log::warn!(
            "{} transaction(s) in {} carried a stale hash; using content hashes",
            batch.mismatched.len(),
            txs_path.display()
        );
    }

    let mut handler = handler_for(config, &pool);
    let report = handler.apply_epoch(&batch.transactions);

    if let Some(out) = out {
        PoolSnapshot::from_pool(handler.utxo_pool()).save(out)?;
        log::info!("wrote pool snapshot to {}", out.display());
    }
    Ok(report)
}

fn run_demo(config: &Config) -> LedgerResult<EpochReport> {
    let (alice_sk, alice) = generate_keypair();
    let (bob_sk, bob) = generate_keypair();
    let (carol_sk, carol) = generate_keypair();
    let (_, dave) = generate_keypair();

    let genesis = Transaction::coinbase(50 * COIN, alice);
    let pool: UtxoPool = [(OutPoint::new(genesis.hash(), 0), genesis.outputs()[0].clone())]
        .into_iter()
        .collect();

    let signed = |mut tx: Transaction, key: &PrivateKey| -> Result<Transaction, TransactionError> {
        for i in 0..tx.num_inputs() {
            tx.sign_input(i, key)?;
        }
        Ok(tx)
    };

    // Alice pays bob 30 and keeps 20 as change.
    let mut pay_bob = Transaction::new();
    pay_bob
        .add_input(genesis.hash(), 0)
        .add_output(30 * COIN, bob)
        .add_output(20 * COIN, alice);
    let pay_bob = signed(pay_bob, &alice_sk)?;

    // Bob forwards 25 to carol in the same epoch, leaving a fee of 5.
    let mut pay_carol = Transaction::new();
    pay_carol.add_input(pay_bob.hash(), 0).add_output(25 * COIN, carol);
    let pay_carol = signed(pay_carol, &bob_sk)?;

    // Alice tries to spend the genesis output a second time.
    let mut double_spend = Transaction::new();
    double_spend.add_input(genesis.hash(), 0).add_output(50 * COIN, dave);
    let double_spend = signed(double_spend, &alice_sk)?;

    // Carol tries to send more than she holds.
    let mut overspend = Transaction::new();
    overspend.add_input(pay_carol.hash(), 0).add_output(26 * COIN, dave);
    let overspend = signed(overspend, &carol_sk)?;

    let mut handler = handler_for(config, &pool);
    let report = handler.apply_epoch(&[pay_bob, pay_carol, double_spend, overspend]);

    let stats = handler.utxo_pool().stats();
    println!(
        "pool after epoch: {} outputs, {} base units",
        stats.unspent_outputs, stats.unspent_value
    );
    Ok(report)
}

fn print_report(report: &EpochReport) {
    println!("accepted {} transaction(s):", report.accepted.len());
    for hash in report.accepted_hashes() {
        println!("  {}", hash);
    }
    println!("rejected {} transaction(s):", report.rejected.len());
    for (hash, reason) in &report.rejected {
        println!("  {}: {}", hash, reason);
    }
    println!("fees: {}", report.fees);
}
