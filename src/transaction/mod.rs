// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Single-writer transactions over persistent snapshots.
//
// Design Patterns Used:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Command Pattern: Change records describing every mutation
// - Copy-on-Write: the writer works on an O(1) clone of the committed state
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionInfo, TransactionManager};
pub use state::{Transaction, TransactionId, TransactionState};
