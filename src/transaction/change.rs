// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every mutation made through a write transaction is recorded as a Change.
// The log is what a transaction reports about itself (TransactionInfo) and
// what commit logging summarizes; the data itself lives in the writer's
// working copy of the store, so discarding that copy is the rollback.
//
// ============================================================================

use crate::storage::ObjectKey;

/// A single recorded mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A new object was stored (directly, or adopted as part of a graph)
    CreateObject { class: String, key: ObjectKey },

    /// An object was deleted along with `cascaded` embedded descendants
    DeleteObject {
        class: String,
        key: ObjectKey,
        cascaded: usize,
    },

    /// A single-valued property was overwritten
    SetValue { key: ObjectKey, property: usize },

    ListInsert {
        owner: ObjectKey,
        property: usize,
        index: usize,
    },

    ListRemove {
        owner: ObjectKey,
        property: usize,
        index: usize,
    },

    ListReplace {
        owner: ObjectKey,
        property: usize,
        index: usize,
    },

    ListMove {
        owner: ObjectKey,
        property: usize,
        from: usize,
        to: usize,
    },

    ListSwap {
        owner: ObjectKey,
        property: usize,
        a: usize,
        b: usize,
    },

    ListClear {
        owner: ObjectKey,
        property: usize,
        removed: usize,
    },
}

impl Change {
    /// The object whose state this change touched
    pub fn target(&self) -> ObjectKey {
        match self {
            Change::CreateObject { key, .. }
            | Change::DeleteObject { key, .. }
            | Change::SetValue { key, .. } => *key,
            Change::ListInsert { owner, .. }
            | Change::ListRemove { owner, .. }
            | Change::ListReplace { owner, .. }
            | Change::ListMove { owner, .. }
            | Change::ListSwap { owner, .. }
            | Change::ListClear { owner, .. } => *owner,
        }
    }

    pub fn is_list_change(&self) -> bool {
        matches!(
            self,
            Change::ListInsert { .. }
                | Change::ListRemove { .. }
                | Change::ListReplace { .. }
                | Change::ListMove { .. }
                | Change::ListSwap { .. }
                | Change::ListClear { .. }
        )
    }

    pub fn is_object_change(&self) -> bool {
        !self.is_list_change()
    }
}
