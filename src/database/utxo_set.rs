//! In-memory pool of unspent transaction outputs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::blockchain::{Amount, TxOutput};
use crate::crypto::Hash;

/// A reference to a previous transaction output.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub tx_hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub const fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash.short(), self.index)
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({})", self)
    }
}

/// An unspent output record, as exposed by `UtxoPool::unspent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoRecord {
    pub outpoint: OutPoint,
    pub output: TxOutput,
}

/// Accumulated statistics over the pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UtxoStats {
    pub unspent_outputs: u64,
    pub unspent_value: i128,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UtxoError {
    #[error("UTXO not found: {0}")]
    NotFound(OutPoint),
}

/// Outputs that are currently spendable, keyed by the output they came from.
///
/// `Clone` is a full structural copy: mutating the clone never affects the
/// source and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoPool {
    outputs: HashMap<OutPoint, TxOutput>,
}

impl UtxoPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent copy of `other`.
    pub fn from_pool(other: &UtxoPool) -> Self {
        other.clone()
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.outputs.contains_key(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Result<&TxOutput, UtxoError> {
        self.outputs
            .get(outpoint)
            .ok_or(UtxoError::NotFound(*outpoint))
    }

    /// Add or overwrite the output at `outpoint`; returns the previous one.
    pub fn insert(&mut self, outpoint: OutPoint, output: TxOutput) -> Option<TxOutput> {
        self.outputs.insert(outpoint, output)
    }

    /// Remove `outpoint` if present. Absent keys are a no-op.
    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<TxOutput> {
        self.outputs.remove(outpoint)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// All entries, sorted by outpoint so snapshots are reproducible.
    pub fn unspent(&self) -> Vec<UtxoRecord> {
        let mut v: Vec<UtxoRecord> = self
            .outputs
            .iter()
            .map(|(op, out)| UtxoRecord {
                outpoint: *op,
                output: out.clone(),
            })
            .collect();
        v.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        v
    }

    pub fn stats(&self) -> UtxoStats {
        UtxoStats {
            unspent_outputs: self.outputs.len() as u64,
            unspent_value: self.outputs.values().map(|o| o.value as i128).sum(),
        }
    }

    /// Total value held by `owner`.
    pub fn balance_of(&self, owner: &crate::crypto::PublicKey) -> Amount {
        self.outputs
            .values()
            .filter(|o| &o.recipient == owner)
            .map(|o| o.value)
            .fold(0, Amount::saturating_add)
    }
}

impl FromIterator<(OutPoint, TxOutput)> for UtxoPool {
    fn from_iter<I: IntoIterator<Item = (OutPoint, TxOutput)>>(iter: I) -> Self {
        Self {
            outputs: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<UtxoRecord> for UtxoPool {
    fn from_iter<I: IntoIterator<Item = UtxoRecord>>(iter: I) -> Self {
        iter.into_iter().map(|r| (r.outpoint, r.output)).collect()
    }
}
