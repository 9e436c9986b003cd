pub mod transaction;

pub use transaction::{Amount, Transaction, TransactionError, TxInput, TxOutput, COIN};
