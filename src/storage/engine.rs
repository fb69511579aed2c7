use super::arena::ObjectKey;
use super::table::Cell;
use crate::core::{ElementType, Result};

/// Handle to one list property of one stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionHandle {
    pub owner: ObjectKey,
    pub property: usize,
    pub element: ElementType,
}

/// Storage engine trait - the collection API list accessors are written against.
///
/// Index arguments are positions already checked against `collection_count`
/// by the caller; implementations still reject out of range positions with
/// `DbError::OutOfRange` and never apply a partial change.
pub trait StorageEngine {
    /// Resolve the list stored under `property` of the object at `owner`
    fn open_collection(&self, owner: ObjectKey, property: usize) -> Result<CollectionHandle>;

    fn collection_count(&self, handle: &CollectionHandle) -> Result<usize>;

    fn collection_get(&self, handle: &CollectionHandle, index: usize) -> Result<Cell>;

    /// Insert at `index` in `[0, count]`, shifting later elements right
    fn collection_insert(&mut self, handle: &CollectionHandle, index: usize, cell: Cell)
    -> Result<()>;

    /// Remove and return the element at `index`, shifting later elements left
    fn collection_remove(&mut self, handle: &CollectionHandle, index: usize) -> Result<Cell>;

    /// Overwrite in place and return the previous element
    fn collection_replace(
        &mut self,
        handle: &CollectionHandle,
        index: usize,
        cell: Cell,
    ) -> Result<Cell>;

    fn collection_move(&mut self, handle: &CollectionHandle, from: usize, to: usize) -> Result<()>;

    fn collection_swap(&mut self, handle: &CollectionHandle, a: usize, b: usize) -> Result<()>;

    /// Empty the list, returning what it held
    fn collection_clear(&mut self, handle: &CollectionHandle) -> Result<Vec<Cell>>;

    /// First index whose element satisfies `matches`
    fn match_index(
        &self,
        handle: &CollectionHandle,
        matches: &mut dyn FnMut(&Cell) -> Result<bool>,
    ) -> Result<Option<usize>>;
}
