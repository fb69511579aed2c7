// ============================================================================
// Transaction State Management
// ============================================================================
//
// Implements the State Pattern for write transaction lifecycle management.
// Each transaction moves through defined states: Active -> Committed/Aborted
//
// A transaction keeps the snapshot it started from. The writer mutates its
// own copy of that snapshot; commit publishes the copy and rollback puts the
// base back.
//
// ============================================================================

use super::Change;
use crate::core::{DbError, Result};
use crate::storage::InMemoryStorage;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted/rolled back
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A write transaction
///
/// Owned by the connection that began it. The TransactionManager only tracks
/// which transaction holds the writer slot.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,

    state: TransactionState,

    /// Committed state the transaction started from
    base: InMemoryStorage,

    /// Database version of `base`
    read_version: u64,

    /// Changes made during this transaction
    changes: Vec<Change>,

    /// Start time for diagnostics
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId, base: InMemoryStorage, read_version: u64) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            base,
            read_version,
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Snapshot the transaction started from
    pub fn base(&self) -> &InMemoryStorage {
        &self.base
    }

    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Record changes made by one successful operation
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record_changes(&mut self, changes: impl IntoIterator<Item = Change>) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::IllegalState(format!(
                "Cannot record change: transaction {} is {}",
                self.id, self.state
            )));
        }

        self.changes.extend(changes);
        Ok(())
    }

    /// Mark transaction as committed
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::IllegalState(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard changes
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::IllegalState(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.changes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Schema;
    use std::sync::Arc;

    fn transaction() -> Transaction {
        Transaction::new(TransactionId::new(), InMemoryStorage::new(Arc::new(Schema::new())), 0)
    }

    fn change() -> Change {
        let schema = Arc::new(
            Schema::new().class(crate::core::ObjectSchema::new("Empty")),
        );
        let mut store = InMemoryStorage::new(Arc::clone(&schema));
        let key = store.create_object(schema.get("Empty").unwrap(), None);
        Change::CreateObject {
            class: "Empty".to_string(),
            key,
        }
    }

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = transaction();

        assert_eq!(txn.state(), TransactionState::Active);
        assert!(txn.state().is_active());
        assert!(!txn.state().is_terminal());

        txn.commit().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(txn.state().is_terminal());
    }

    #[test]
    fn test_cannot_commit_twice() {
        let mut txn = transaction();

        txn.commit().unwrap();
        assert!(txn.commit().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_rollback_clears_changes() {
        let mut txn = transaction();

        txn.record_changes([change()]).unwrap();
        assert_eq!(txn.change_count(), 1);

        txn.rollback().unwrap();
        assert_eq!(txn.change_count(), 0);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_cannot_record_change_after_commit() {
        let mut txn = transaction();

        txn.commit().unwrap();
        assert!(txn.record_changes([change()]).is_err());
    }
}
