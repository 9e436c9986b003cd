//! Transaction data model: inputs claiming prior outputs, new outputs, and
//! the byte encodings used for signing and identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{self, sha512_hash, Hash, PrivateKey, PublicKey};
use crate::database::OutPoint;

/// Monetary amount in base units. Signed so that malformed negative
/// outputs can be represented and rejected.
pub type Amount = i64;

/// 1 coin = 100,000,000 base units
pub const COIN: Amount = 100_000_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("input index {index} out of range ({len} inputs)")]
    InputOutOfRange { index: usize, len: usize },

    #[error("output index {index} out of range ({len} outputs)")]
    OutputOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction whose output is being spent.
    pub prev_tx_hash: Hash,
    /// Position of that output in its transaction, first one is 0.
    pub output_index: u32,
    /// Detached signature over `Transaction::signing_payload` for this input.
    #[serde(with = "crate::crypto::encoding::hex_vec", default)]
    pub signature: Vec<u8>,
}

impl TxInput {
    pub fn new(prev_tx_hash: Hash, output_index: u32) -> Self {
        Self {
            prev_tx_hash,
            output_index,
            signature: Vec::new(),
        }
    }

    /// The pool key this input claims.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.prev_tx_hash, self.output_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    pub recipient: PublicKey,
}

impl TxOutput {
    pub fn new(value: Amount, recipient: PublicKey) -> Self {
        Self { value, recipient }
    }

    fn write_bytes(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_be_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
    }
}

/// A proposed transfer. Its identity is the hash of its content and is
/// recomputed on every call to `hash`, so it can never go stale.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self { inputs, outputs }
    }

    /// Coinbase-style transaction: no inputs, a single output.
    pub fn coinbase(value: Amount, recipient: PublicKey) -> Self {
        let mut tx = Self::new();
        tx.add_output(value, recipient);
        tx
    }

    pub fn add_input(&mut self, prev_tx_hash: Hash, output_index: u32) -> &mut Self {
        self.inputs.push(TxInput::new(prev_tx_hash, output_index));
        self
    }

    pub fn add_output(&mut self, value: Amount, recipient: PublicKey) -> &mut Self {
        self.outputs.push(TxOutput::new(value, recipient));
        self
    }

    pub fn add_signature(
        &mut self,
        index: usize,
        signature: Vec<u8>,
    ) -> Result<(), TransactionError> {
        let len = self.inputs.len();
        let input = self
            .inputs
            .get_mut(index)
            .ok_or(TransactionError::InputOutOfRange { index, len })?;
        input.signature = signature;
        Ok(())
    }

    /// Sign input `index` with `key` over its signing payload.
    pub fn sign_input(&mut self, index: usize, key: &PrivateKey) -> Result<(), TransactionError> {
        let payload = self.signing_payload(index).ok_or(TransactionError::InputOutOfRange {
            index,
            len: self.inputs.len(),
        })?;
        self.add_signature(index, crypto::sign(key, &payload))
    }

    /// Message authenticated by input `index`: the input's own claim followed
    /// by every output. Signatures never take part, so signing one input
    /// leaves the payload of every other input unchanged.
    pub fn signing_payload(&self, index: usize) -> Option<Vec<u8>> {
        let input = self.inputs.get(index)?;
        let mut buf = Vec::with_capacity(64 + 4 + self.outputs.len() * (8 + 32));
        buf.extend_from_slice(input.prev_tx_hash.as_bytes());
        buf.extend_from_slice(&input.output_index.to_be_bytes());
        for output in &self.outputs {
            output.write_bytes(&mut buf);
        }
        Some(buf)
    }

    /// Full encoding including signatures; hashed to form the identity.
    pub fn raw_tx(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.inputs.len() as u32).to_be_bytes());
        for input in &self.inputs {
            buf.extend_from_slice(input.prev_tx_hash.as_bytes());
            buf.extend_from_slice(&input.output_index.to_be_bytes());
            buf.extend_from_slice(&(input.signature.len() as u32).to_be_bytes());
            buf.extend_from_slice(&input.signature);
        }
        buf.extend_from_slice(&(self.outputs.len() as u32).to_be_bytes());
        for output in &self.outputs {
            output.write_bytes(&mut buf);
        }
        buf
    }

    /// SHA-512 of `raw_tx`. Signatures are covered, so sign every input
    /// before handing the hash to anyone who will spend the outputs.
    pub fn hash(&self) -> Hash {
        sha512_hash(&self.raw_tx())
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Pool key of output `index` once this transaction is accepted.
    pub fn outpoint(&self, index: u32) -> Result<OutPoint, TransactionError> {
        if (index as usize) < self.outputs.len() {
            Ok(OutPoint::new(self.hash(), index))
        } else {
            Err(TransactionError::OutputOutOfRange {
                index: index as usize,
                len: self.outputs.len(),
            })
        }
    }

    /// Exact sum of output values; `i128` so no realistic batch overflows.
    pub fn output_sum(&self) -> i128 {
        self.outputs.iter().map(|o| o.value as i128).sum()
    }
}
