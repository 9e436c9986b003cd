//! Crate root.
//!
//! Validates batches of proposed transactions against a pool of unspent
//! outputs and commits a mutually consistent subset, one epoch at a time.

pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod database;
pub mod error;

pub use blockchain::{Amount, Transaction, TxInput, TxOutput, COIN};
pub use consensus::{
    handle_txs, is_valid_tx, ConsensusConfig, EpochReport, TxHandler, TxRejection,
};
pub use database::{OutPoint, UtxoPool};
pub use error::{LedgerError, LedgerResult};
