//! Epoch handling: apply a batch of proposed transactions to the pool in
//! the order given, re-validating each against the pool as it changes.

use log::{debug, info, warn};

use crate::blockchain::Transaction;
use crate::crypto::{Ed25519Verifier, Hash, SignatureVerifier};
use crate::database::{OutPoint, UtxoPool};

use super::validation::{self, TxAcceptance, TxRejection};
use super::ConsensusConfig;

/// Outcome of one epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochReport {
    /// Accepted transactions, in the order they appeared in the batch.
    pub accepted: Vec<Transaction>,
    /// Rejected transactions by hash, with the first failing check.
    pub rejected: Vec<(Hash, TxRejection)>,
    /// Sum of implicit fees of accepted transactions.
    pub fees: i128,
}

impl EpochReport {
    pub fn accepted_hashes(&self) -> Vec<Hash> {
        self.accepted.iter().map(Transaction::hash).collect()
    }
}

/// Spend the claimed outputs and publish the new ones under `tx`'s hash.
fn apply_transaction(tx: &Transaction, pool: &mut UtxoPool) -> Hash {
    let hash = tx.hash();
    for input in tx.inputs() {
        pool.remove(&input.outpoint());
    }
    for (index, output) in tx.outputs().iter().enumerate() {
        pool.insert(OutPoint::new(hash, index as u32), output.clone());
    }
    hash
}

/// Fold `txs` over `pool` in order. A transaction that claims an output
/// already spent earlier in the batch fails the pool lookup and is skipped,
/// so the earliest claimant wins.
pub fn apply_epoch<V: SignatureVerifier>(
    txs: &[Transaction],
    pool: &mut UtxoPool,
    verifier: &V,
    config: &ConsensusConfig,
) -> EpochReport {
    txs.iter().fold(EpochReport::default(), |mut report, tx| {
        match validation::check_transaction(tx, pool, verifier, config) {
            Ok(TxAcceptance { fee, .. }) => {
                let hash = apply_transaction(tx, pool);
                debug!(
                    "accepted tx {} ({} in, {} out, fee {})",
                    hash.short(),
                    tx.num_inputs(),
                    tx.num_outputs(),
                    fee
                );
                report.fees += fee;
                report.accepted.push(tx.clone());
            }
            Err(reason) => {
                let hash = tx.hash();
                debug!("rejected tx {}: {}", hash.short(), reason);
                report.rejected.push((hash, reason));
            }
        }
        report
    })
}

/// Accepted subset of `txs`, in order. `pool` ends up reflecting every
/// accepted transaction.
pub fn handle_txs<V: SignatureVerifier>(
    txs: &[Transaction],
    pool: &mut UtxoPool,
    verifier: &V,
    config: &ConsensusConfig,
) -> Vec<Transaction> {
    apply_epoch(txs, pool, verifier, config).accepted
}

/// Public ledger: owns the current pool and advances it one epoch at a time.
#[derive(Debug)]
pub struct TxHandler<V = Ed25519Verifier> {
    pool: UtxoPool,
    verifier: V,
    config: ConsensusConfig,
    epoch: u64,
    log_rejections: bool,
}

impl TxHandler<Ed25519Verifier> {
    /// Ledger over a private copy of `pool`, verifying ed25519 signatures.
    pub fn new(pool: &UtxoPool) -> Self {
        Self::with_verifier(pool, Ed25519Verifier, ConsensusConfig::default())
    }
}

impl<V: SignatureVerifier> TxHandler<V> {
    pub fn with_verifier(pool: &UtxoPool, verifier: V, config: ConsensusConfig) -> Self {
        Self {
            pool: UtxoPool::from_pool(pool),
            verifier,
            config,
            epoch: 0,
            log_rejections: false,
        }
    }

    /// Emit a warning for every rejected transaction.
    pub fn log_rejections(mut self, enabled: bool) -> Self {
        self.log_rejections = enabled;
        self
    }

    pub fn is_valid_tx(&self, tx: &Transaction) -> bool {
        self.check_transaction(tx).is_ok()
    }

    pub fn check_transaction(&self, tx: &Transaction) -> Result<TxAcceptance, TxRejection> {
        validation::check_transaction(tx, &self.pool, &self.verifier, &self.config)
    }

    /// Accept a mutually valid subset of `txs` and update the pool.
    pub fn handle_txs(&mut self, txs: &[Transaction]) -> Vec<Transaction> {
        self.apply_epoch(txs).accepted
    }

    pub fn apply_epoch(&mut self, txs: &[Transaction]) -> EpochReport {
        let report = apply_epoch(txs, &mut self.pool, &self.verifier, &self.config);
        self.epoch += 1;

        if self.log_rejections {
            for (hash, reason) in &report.rejected {
                warn!("epoch {}: rejected tx {}: {}", self.epoch, hash.short(), reason);
            }
        }
        info!(
            "epoch {}: {} proposed, {} accepted, {} rejected, fees {}, pool size {}",
            self.epoch,
            txs.len(),
            report.accepted.len(),
            report.rejected.len(),
            report.fees,
            self.pool.len()
        );
        report
    }

    pub fn utxo_pool(&self) -> &UtxoPool {
        &self.pool
    }

    pub fn into_pool(self) -> UtxoPool {
        self.pool
    }

    /// Number of epochs processed so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Amount, COIN};
    use crate::crypto::{keypair_from_seed, KeyPair, PublicKey};

    struct Ledger {
        alice: KeyPair,
        bob: KeyPair,
        carol: KeyPair,
        genesis: Transaction,
        pool: UtxoPool,
    }

    /// Genesis pays alice 10 coins in output 0 and 4 coins in output 1.
    fn ledger() -> Ledger {
        let alice = keypair_from_seed([1u8; 32]);
        let bob = keypair_from_seed([2u8; 32]);
        let carol = keypair_from_seed([3u8; 32]);
        let mut genesis = Transaction::new();
        genesis.add_output(10 * COIN, alice.1).add_output(4 * COIN, alice.1);

        let mut pool = UtxoPool::new();
        for (i, output) in genesis.outputs().iter().enumerate() {
            pool.insert(OutPoint::new(genesis.hash(), i as u32), output.clone());
        }
        Ledger {
            alice,
            bob,
            carol,
            genesis,
            pool,
        }
    }

    fn transfer(
        signer: &KeyPair,
        claims: &[(Hash, u32)],
        outputs: &[(Amount, PublicKey)],
    ) -> Transaction {
        let mut tx = Transaction::new();
        for &(hash, index) in claims {
            tx.add_input(hash, index);
        }
        for &(value, to) in outputs {
            tx.add_output(value, to);
        }
        for i in 0..claims.len() {
            tx.sign_input(i, &signer.0).unwrap();
        }
        tx
    }

    #[test]
    fn double_spend_across_batch_keeps_first() {
        let l = ledger();
        let g = l.genesis.hash();
        let t1 = transfer(&l.alice, &[(g, 0)], &[(10 * COIN, l.bob.1)]);
        let t2 = transfer(&l.alice, &[(g, 0)], &[(10 * COIN, l.carol.1)]);

        let mut handler = TxHandler::new(&l.pool);
        assert!(handler.is_valid_tx(&t1));
        assert!(handler.is_valid_tx(&t2));

        let accepted = handler.handle_txs(&[t1.clone(), t2.clone()]);
        assert_eq!(accepted, vec![t1.clone()]);
        assert!(!handler.utxo_pool().contains(&OutPoint::new(g, 0)));
        assert!(handler.utxo_pool().contains(&OutPoint::new(t1.hash(), 0)));
        assert!(!handler.utxo_pool().contains(&OutPoint::new(t2.hash(), 0)));
    }

    #[test]
    fn order_decides_the_winner() {
        let l = ledger();
        let g = l.genesis.hash();
        let t1 = transfer(&l.alice, &[(g, 0)], &[(10 * COIN, l.bob.1)]);
        let t2 = transfer(&l.alice, &[(g, 0)], &[(9 * COIN, l.carol.1)]);

        let mut pool = l.pool.clone();
        let report = apply_epoch(
            &[t2.clone(), t1.clone()],
            &mut pool,
            &Ed25519Verifier,
            &ConsensusConfig::default(),
        );
        assert_eq!(report.accepted_hashes(), vec![t2.hash()]);
        assert_eq!(report.fees, COIN as i128);
        assert!(matches!(
            report.rejected.as_slice(),
            [(h, TxRejection::MissingInput { input_index: 0, .. })] if *h == t1.hash()
        ));
    }

    #[test]
    fn chained_spend_within_epoch() {
        let l = ledger();
        let g = l.genesis.hash();
        let t1 = transfer(&l.alice, &[(g, 0)], &[(6 * COIN, l.bob.1), (4 * COIN, l.alice.1)]);
        let t2 = transfer(&l.bob, &[(t1.hash(), 0)], &[(6 * COIN, l.carol.1)]);

        let mut handler = TxHandler::new(&l.pool);
        let accepted = handler.handle_txs(&[t1.clone(), t2.clone()]);
        assert_eq!(accepted, vec![t1.clone(), t2.clone()]);

        let pool = handler.utxo_pool();
        assert!(!pool.contains(&OutPoint::new(g, 0)));
        assert!(!pool.contains(&OutPoint::new(t1.hash(), 0)));
        assert!(pool.contains(&OutPoint::new(t1.hash(), 1)));
        assert_eq!(pool.get(&OutPoint::new(t2.hash(), 0)).unwrap().recipient, l.carol.1);
        assert_eq!(pool.balance_of(&l.carol.1), 6 * COIN);
    }

    #[test]
    fn child_before_parent_is_rejected() {
        let l = ledger();
        let g = l.genesis.hash();
        let t1 = transfer(&l.alice, &[(g, 0)], &[(10 * COIN, l.bob.1)]);
        let t2 = transfer(&l.bob, &[(t1.hash(), 0)], &[(10 * COIN, l.carol.1)]);

        let mut handler = TxHandler::new(&l.pool);
        assert_eq!(handler.handle_txs(&[t2.clone(), t1.clone()]), vec![t1.clone()]);

        // The child is valid in the following epoch.
        assert_eq!(handler.handle_txs(&[t2.clone()]), vec![t2]);
        assert_eq!(handler.epoch(), 2);
    }

    #[test]
    fn invalid_transactions_are_skipped_silently() {
        let l = ledger();
        let g = l.genesis.hash();
        let overspend = transfer(&l.alice, &[(g, 1)], &[(5 * COIN, l.bob.1)]);
        let negative = transfer(&l.alice, &[(g, 1)], &[(-1, l.bob.1), (COIN, l.bob.1)]);
        let duplicate = transfer(&l.alice, &[(g, 1), (g, 1)], &[(COIN, l.bob.1)]);
        let forged = transfer(&l.bob, &[(g, 1)], &[(COIN, l.bob.1)]);
        let good = transfer(&l.alice, &[(g, 1)], &[(4 * COIN, l.bob.1)]);

        let mut handler = TxHandler::new(&l.pool);
        let report = handler.apply_epoch(&[overspend, negative, duplicate, forged, good.clone()]);
        assert_eq!(report.accepted, vec![good]);
        let reasons: Vec<&TxRejection> = report.rejected.iter().map(|(_, r)| r).collect();
        assert!(matches!(
            reasons.as_slice(),
            [
                TxRejection::InsufficientInput { .. },
                TxRejection::NegativeOutput { .. },
                TxRejection::DuplicateInput { .. },
                TxRejection::InvalidSignature { .. },
            ]
        ));
        assert!(handler.utxo_pool().contains(&OutPoint::new(g, 0)));
    }

    #[test]
    fn outputs_of_separate_transactions_never_collide() {
        let l = ledger();
        let g = l.genesis.hash();
        // Built and signed in place; nothing else is done before submission.
        let mut t1 = Transaction::new();
        t1.add_input(g, 0).add_output(10 * COIN, l.bob.1);
        t1.sign_input(0, &l.alice.0).unwrap();
        let mut t2 = Transaction::new();
        t2.add_input(g, 1).add_output(4 * COIN, l.carol.1);
        t2.sign_input(0, &l.alice.0).unwrap();

        let mut handler = TxHandler::new(&l.pool);
        assert_eq!(handler.handle_txs(&[t1.clone(), t2.clone()]).len(), 2);

        let pool = handler.utxo_pool();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().unspent_value, 14 * COIN as i128);
        assert_eq!(pool.balance_of(&l.bob.1), 10 * COIN);
        assert_eq!(pool.balance_of(&l.carol.1), 4 * COIN);
        assert!(pool.contains(&t1.outpoint(0).unwrap()));
        assert!(pool.contains(&t2.outpoint(0).unwrap()));
    }

    #[test]
    fn fee_is_not_returned_to_pool() {
        let l = ledger();
        let g = l.genesis.hash();
        let tx = transfer(&l.alice, &[(g, 0), (g, 1)], &[(13 * COIN, l.bob.1)]);
        let mut handler = TxHandler::new(&l.pool);
        let report = handler.apply_epoch(&[tx]);
        assert_eq!(report.fees, COIN as i128);
        assert_eq!(handler.utxo_pool().stats().unspent_value, 13 * COIN as i128);
    }

    #[test]
    fn handler_pool_is_isolated_from_source() {
        let l = ledger();
        let g = l.genesis.hash();
        let mut source = l.pool.clone();
        let handler = TxHandler::new(&source);

        source.remove(&OutPoint::new(g, 0));
        source.insert(
            OutPoint::new(g, 7),
            crate::blockchain::TxOutput::new(COIN, l.bob.1),
        );

        assert!(handler.utxo_pool().contains(&OutPoint::new(g, 0)));
        assert!(!handler.utxo_pool().contains(&OutPoint::new(g, 7)));
        assert_eq!(handler.utxo_pool(), &l.pool);
    }

    #[test]
    fn source_pool_untouched_by_epoch() {
        let l = ledger();
        let g = l.genesis.hash();
        let tx = transfer(&l.alice, &[(g, 0)], &[(10 * COIN, l.bob.1)]);
        let mut handler = TxHandler::new(&l.pool).log_rejections(true);
        handler.handle_txs(&[tx]);
        assert!(l.pool.contains(&OutPoint::new(g, 0)));
        assert_ne!(handler.into_pool(), l.pool);
    }

    #[test]
    fn free_function_matches_handler() {
        let l = ledger();
        let g = l.genesis.hash();
        let txs = vec![
            transfer(&l.alice, &[(g, 0)], &[(10 * COIN, l.bob.1)]),
            transfer(&l.alice, &[(g, 0), (g, 1)], &[(COIN, l.carol.1)]),
            transfer(&l.alice, &[(g, 1)], &[(4 * COIN, l.carol.1)]),
        ];
        let mut pool = l.pool.clone();
        let accepted = handle_txs(&txs, &mut pool, &Ed25519Verifier, &ConsensusConfig::default());

        let mut handler = TxHandler::new(&l.pool);
        assert_eq!(handler.handle_txs(&txs), accepted);
        assert_eq!(handler.utxo_pool(), &pool);
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn empty_batch_leaves_pool_unchanged() {
        let l = ledger();
        let mut handler = TxHandler::new(&l.pool);
        assert!(handler.handle_txs(&[]).is_empty());
        assert_eq!(handler.utxo_pool(), &l.pool);
        assert_eq!(handler.epoch(), 1);
    }
}
