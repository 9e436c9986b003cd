//! Database layer: the in-memory UTXO pool plus the JSON snapshot and batch
//! files used by the command-line driver.
//!
//! Snapshots are a convenience for moving pools in and out of the process.
//! The ledger core itself keeps the pool in memory between epochs.

pub mod utxo_set;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::blockchain::{Transaction, TxInput, TxOutput};
use crate::crypto::Hash;

pub use utxo_set::{OutPoint, UtxoError, UtxoPool, UtxoRecord, UtxoStats};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serializable form of a pool: its records, sorted by outpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub utxos: Vec<UtxoRecord>,
}

impl PoolSnapshot {
    pub fn from_pool(pool: &UtxoPool) -> Self {
        Self {
            utxos: pool.unspent(),
        }
    }

    pub fn into_pool(self) -> UtxoPool {
        self.utxos.into_iter().collect()
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        write_json(path, self)
    }
}

/// One transaction as it appears in a batch file. `hash` is whatever the
/// producer claimed and is only compared against the content.
#[derive(Debug, Serialize, Deserialize)]
struct BatchEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<Hash>,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
}

/// Transactions read from a batch file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxBatch {
    pub transactions: Vec<Transaction>,
    /// Positions whose stated hash differs from the content hash.
    pub mismatched: Vec<usize>,
}

/// Read a JSON array of transactions.
///
/// Identity always comes from content. A stated `hash` that disagrees is
/// logged and recorded in `mismatched`; the transaction is kept under its
/// content hash.
pub fn load_batch(path: &Path) -> Result<TxBatch, SnapshotError> {
    let entries: Vec<BatchEntry> = read_json(path)?;
    let mut batch = TxBatch {
        transactions: Vec::with_capacity(entries.len()),
        mismatched: Vec::new(),
    };

    for (position, entry) in entries.into_iter().enumerate() {
        let tx = Transaction::from_parts(entry.inputs, entry.outputs);
        if let Some(stated) = entry.hash {
            let derived = tx.hash();
            if stated != derived {
                log::warn!(
                    "batch entry {}: stated hash {} does not match content hash {}",
                    position,
                    stated.short(),
                    derived.short()
                );
                batch.mismatched.push(position);
            }
        }
        batch.transactions.push(tx);
    }

    log::debug!("loaded {} transaction(s) from {}", batch.transactions.len(), path.display());
    Ok(batch)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}
