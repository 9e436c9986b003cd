use thiserror::Error;

use crate::blockchain::TransactionError;
use crate::database::SnapshotError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Transaction;
    use crate::crypto::keypair_from_seed;
    use crate::database::PoolSnapshot;
    use std::path::Path;

    fn sign_missing_input() -> LedgerResult<()> {
        let (sk, _) = keypair_from_seed([1u8; 32]);
        Transaction::new().sign_input(0, &sk)?;
        Ok(())
    }

    fn load_missing_snapshot() -> LedgerResult<PoolSnapshot> {
        Ok(PoolSnapshot::load(Path::new("/nonexistent/pool.json"))?)
    }

    #[test]
    fn transaction_errors_convert() {
        let err = sign_missing_input().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Transaction(TransactionError::InputOutOfRange { index: 0, len: 0 })
        ));
        assert!(err.to_string().starts_with("Transaction error"));
    }

    #[test]
    fn snapshot_errors_convert() {
        let err = load_missing_snapshot().unwrap_err();
        assert!(matches!(err, LedgerError::Snapshot(SnapshotError::Io(_))));
    }
}
