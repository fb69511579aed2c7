// ============================================================================
// Transaction Manager
// ============================================================================
//
// Owns the committed state of a database and the single writer slot.
// Readers clone the committed snapshot (O(1)); at most one transaction may
// write at a time, and trying to begin a second one fails instead of waiting.
//
// ============================================================================

use super::{Transaction, TransactionId, TransactionState};
use crate::core::{DbError, Result};
use crate::storage::InMemoryStorage;
use std::sync::{Mutex, RwLock};
use tracing::debug;

struct CommittedState {
    storage: InMemoryStorage,
    version: u64,
}

pub struct TransactionManager {
    committed: RwLock<CommittedState>,

    // Transaction currently holding the write slot
    writer: Mutex<Option<TransactionId>>,
}

impl TransactionManager {
    pub fn new(storage: InMemoryStorage) -> Self {
        Self {
            committed: RwLock::new(CommittedState {
                storage,
                version: 0,
            }),
            writer: Mutex::new(None),
        }
    }

    /// Latest committed state and its version
    pub fn snapshot(&self) -> Result<(InMemoryStorage, u64)> {
        let committed = self.committed.read()?;
        Ok((committed.storage.clone(), committed.version))
    }

    pub fn version(&self) -> Result<u64> {
        Ok(self.committed.read()?.version)
    }

    /// Claim the writer slot. The transaction starts from the latest commit.
    pub fn begin(&self) -> Result<Transaction> {
        let mut writer = self.writer.lock()?;
        if let Some(active) = *writer {
            return Err(DbError::IllegalState(format!(
                "Cannot begin a write transaction: {} is already writing",
                active
            )));
        }

        let (base, version) = self.snapshot()?;
        let transaction = Transaction::new(TransactionId::new(), base, version);
        *writer = Some(transaction.id());

        debug!(txn = %transaction.id(), read_version = version, "write transaction started");
        Ok(transaction)
    }

    /// Publish `storage` as the new committed state and free the writer slot.
    pub fn commit(&self, transaction: &mut Transaction, storage: InMemoryStorage) -> Result<u64> {
        let mut writer = self.writer.lock()?;
        if *writer != Some(transaction.id()) {
            return Err(DbError::IllegalState(format!(
                "{} does not hold the write slot",
                transaction.id()
            )));
        }

        transaction.commit()?;
        let version = {
            let mut committed = self.committed.write()?;
            committed.storage = storage;
            committed.version += 1;
            committed.version
        };
        *writer = None;

        debug!(
            txn = %transaction.id(),
            version,
            changes = transaction.change_count(),
            "write transaction committed"
        );
        Ok(version)
    }

    pub fn rollback(&self, transaction: &mut Transaction) -> Result<()> {
        let mut writer = self.writer.lock()?;
        if *writer == Some(transaction.id()) {
            *writer = None;
        }
        transaction.rollback()?;

        debug!(txn = %transaction.id(), "write transaction rolled back");
        Ok(())
    }

    pub fn active_writer(&self) -> Result<Option<TransactionId>> {
        Ok(*self.writer.lock()?)
    }
}

/// Diagnostics snapshot of a running transaction
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub read_version: u64,
    pub change_count: usize,
    pub duration: std::time::Duration,
}

impl From<&Transaction> for TransactionInfo {
    fn from(txn: &Transaction) -> Self {
        Self {
            id: txn.id(),
            state: txn.state(),
            read_version: txn.read_version(),
            change_count: txn.change_count(),
            duration: txn.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, ObjectSchema, Property, Schema};
    use std::sync::Arc;

    fn manager() -> TransactionManager {
        let schema = Arc::new(
            Schema::new().class(ObjectSchema::new("IntObject").property(Property::new("intCol", DataType::Int))),
        );
        TransactionManager::new(InMemoryStorage::new(schema))
    }

    #[test]
    fn test_single_writer() {
        let manager = manager();
        let mut first = manager.begin().unwrap();
        assert!(manager.begin().unwrap_err().is_illegal_state());
        assert_eq!(manager.active_writer().unwrap(), Some(first.id()));

        manager.rollback(&mut first).unwrap();
        assert_eq!(manager.active_writer().unwrap(), None);
        assert!(manager.begin().is_ok());
    }

    #[test]
    fn test_commit_publishes_state() {
        let manager = manager();
        let mut txn = manager.begin().unwrap();
        let mut working = txn.base().clone();
        let class = Arc::clone(working.schema().get("IntObject").unwrap());
        working.create_object(&class, None);

        let (before, _) = manager.snapshot().unwrap();
        assert_eq!(manager.commit(&mut txn, working).unwrap(), 1);

        let (after, version) = manager.snapshot().unwrap();
        assert_eq!(version, 1);
        assert_eq!(after.object_count(), 1);
        assert_eq!(before.object_count(), 0);
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    #[test]
    fn test_commit_requires_writer_slot() {
        let manager = manager();
        let mut txn = manager.begin().unwrap();
        manager.rollback(&mut txn).unwrap();

        let (storage, _) = manager.snapshot().unwrap();
        assert!(manager.commit(&mut txn, storage).is_err());
        assert_eq!(manager.version().unwrap(), 0);
    }

    #[test]
    fn test_transaction_info() {
        let manager = manager();
        let txn = manager.begin().unwrap();
        let info = TransactionInfo::from(&txn);
        assert_eq!(info.id, txn.id());
        assert_eq!(info.state, TransactionState::Active);
        assert_eq!(info.change_count, 0);
    }
}
