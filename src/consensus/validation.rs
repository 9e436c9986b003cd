//! Single-transaction validity against the current UTXO pool.
//!
//! A transaction is valid when every claimed output is in the pool, no output
//! is claimed twice, no output value is negative, claimed value covers
//! produced value, and every input carries a valid signature from the
//! recipient of the output it claims. Checks that only touch the pool run
//! first; signatures are verified last.

use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

use crate::blockchain::{Amount, Transaction, TxOutput};
use crate::crypto::SignatureVerifier;
use crate::database::{OutPoint, UtxoPool};

use super::ConsensusConfig;

/// Why a proposed transaction was not accepted. This is an outcome, not a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxRejection {
    #[error("input {input_index} claims {outpoint}, which is not in the pool")]
    MissingInput { input_index: usize, outpoint: OutPoint },

    #[error("input {input_index} claims {outpoint} a second time")]
    DuplicateInput { input_index: usize, outpoint: OutPoint },

    #[error("output {output_index} has negative value {value}")]
    NegativeOutput { output_index: usize, value: Amount },

    #[error("insufficient input value: have {have}, need {need}")]
    InsufficientInput { have: i128, need: i128 },

    #[error("signature on input {input_index} does not verify")]
    InvalidSignature { input_index: usize },
}

/// Totals of a transaction that passed every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxAcceptance {
    pub total_input: i128,
    pub total_output: i128,
    /// Claimed minus produced value. Not returned to the pool.
    pub fee: i128,
}

/// True iff `tx` may be applied to `pool` as it stands. Never mutates `pool`.
pub fn is_valid_tx<V: SignatureVerifier>(tx: &Transaction, pool: &UtxoPool, verifier: &V) -> bool {
    check_transaction(tx, pool, verifier, &ConsensusConfig::default()).is_ok()
}

/// Run every check and report the first one that fails.
pub fn check_transaction<V: SignatureVerifier>(
    tx: &Transaction,
    pool: &UtxoPool,
    verifier: &V,
    config: &ConsensusConfig,
) -> Result<TxAcceptance, TxRejection> {
    let claimed = resolve_claims(tx, pool)?;
    check_no_duplicate_claims(tx)?;
    check_outputs_non_negative(tx)?;
    let acceptance = check_conservation(tx, &claimed)?;
    check_signatures(tx, &claimed, verifier, config)?;
    Ok(acceptance)
}

/// Look up the output each input claims, in input order.
fn resolve_claims<'p>(
    tx: &Transaction,
    pool: &'p UtxoPool,
) -> Result<Vec<&'p TxOutput>, TxRejection> {
    tx.inputs()
        .iter()
        .enumerate()
        .map(|(input_index, input)| {
            let outpoint = input.outpoint();
            pool.get(&outpoint)
                .map_err(|_| TxRejection::MissingInput { input_index, outpoint })
        })
        .collect()
}

fn check_no_duplicate_claims(tx: &Transaction) -> Result<(), TxRejection> {
    let mut seen: HashSet<OutPoint> = HashSet::with_capacity(tx.num_inputs());
    for (input_index, input) in tx.inputs().iter().enumerate() {
        let outpoint = input.outpoint();
        if !seen.insert(outpoint) {
            return Err(TxRejection::DuplicateInput { input_index, outpoint });
        }
    }
    Ok(())
}

fn check_outputs_non_negative(tx: &Transaction) -> Result<(), TxRejection> {
    match tx.outputs().iter().position(|o| o.value < 0) {
        Some(output_index) => Err(TxRejection::NegativeOutput {
            output_index,
            value: tx.outputs()[output_index].value,
        }),
        None => Ok(()),
    }
}

fn check_conservation(
    tx: &Transaction,
    claimed: &[&TxOutput],
) -> Result<TxAcceptance, TxRejection> {
    let total_input: i128 = claimed.iter().map(|o| o.value as i128).sum();
    let total_output = tx.output_sum();
    if total_input < total_output {
        return Err(TxRejection::InsufficientInput {
            have: total_input,
            need: total_output,
        });
    }
    Ok(TxAcceptance {
        total_input,
        total_output,
        fee: total_input - total_output,
    })
}

fn check_signatures<V: SignatureVerifier>(
    tx: &Transaction,
    claimed: &[&TxOutput],
    verifier: &V,
    config: &ConsensusConfig,
) -> Result<(), TxRejection> {
    let input_ok = |input_index: usize| -> bool {
        let Some(payload) = tx.signing_payload(input_index) else {
            return false;
        };
        verifier.verify(
            &claimed[input_index].recipient,
            &payload,
            &tx.inputs()[input_index].signature,
        )
    };

    let failed = if config.parallel_signatures && tx.num_inputs() >= config.parallel_threshold {
        // Smallest failing index, so the report matches the sequential path.
        (0..tx.num_inputs())
            .into_par_iter()
            .filter(|&i| !input_ok(i))
            .min()
    } else {
        (0..tx.num_inputs()).find(|&i| !input_ok(i))
    };

    match failed {
        Some(input_index) => Err(TxRejection::InvalidSignature { input_index }),
        None => Ok(()),
    }
}
