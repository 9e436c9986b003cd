pub mod epoch;
pub mod validation;

// Re-export for easier access
pub use epoch::{apply_epoch, handle_txs, EpochReport, TxHandler};
pub use validation::{check_transaction, is_valid_tx, TxAcceptance, TxRejection};

/// Consensus configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Verify the signatures of one transaction on the rayon pool.
    pub parallel_signatures: bool,
    /// Minimum input count before the parallel path is used.
    pub parallel_threshold: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            parallel_signatures: false,
            parallel_threshold: 16,
        }
    }
}
