use super::index::{element_index, insertion_index, subrange};
use super::{CollectionAccess, KeyPath, PropertySource};
use crate::connection::Connection;
use crate::core::{DbError, ElementType, Result, Value};
use crate::object::ownership::{self, AdoptionPlan, SlotKind};
use crate::query::Predicate;
use crate::storage::{Cell, CollectionHandle, InMemoryStorage, ObjectKey, Owner, StorageEngine};
use crate::transaction::Change;
use tracing::trace;

/// Accessor for a list property of a stored object.
///
/// Holds no elements: every call resolves the collection in the
/// connection's current snapshot (or working copy while writing), so all
/// accessors over the same property observe each other's writes.
#[derive(Clone)]
pub(crate) struct ManagedList {
    conn: Connection,
    owner: ObjectKey,
    property: usize,
    element: ElementType,
}

impl ManagedList {
    pub(crate) fn new(conn: Connection, owner: ObjectKey, property: usize, element: ElementType) -> Self {
        Self {
            conn,
            owner,
            property,
            element,
        }
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn element(&self) -> &ElementType {
        &self.element
    }

    fn handle(&self, store: &InMemoryStorage) -> Result<CollectionHandle> {
        if !store.contains(self.owner) {
            return Err(DbError::invalidated("List"));
        }
        store.open_collection(self.owner, self.property)
    }

    fn read<T>(&self, f: impl FnOnce(&InMemoryStorage, &CollectionHandle) -> Result<T>) -> Result<T> {
        self.conn.read(|store| {
            let handle = self.handle(store)?;
            f(store, &handle)
        })
    }

    /// Run one list mutation in the write transaction, then mark whatever
    /// it adopted as managed.
    fn mutate<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut InMemoryStorage, &CollectionHandle, &mut AdoptionPlan, &mut Vec<Change>) -> Result<T>,
    ) -> Result<T> {
        let (value, plan) = self.conn.mutate(|store, changes| {
            let handle = self.handle(store)?;
            let mut plan = AdoptionPlan::default();
            let value = f(store, &handle, &mut plan, changes)?;
            Ok((value, plan))
        })?;
        trace!(conn = self.conn.id(), owner = %self.owner, property = self.property, op, "list mutated");
        plan.apply(&self.conn)?;
        Ok(value)
    }

    fn adopt(
        &self,
        store: &mut InMemoryStorage,
        value: Value,
        plan: &mut AdoptionPlan,
        changes: &mut Vec<Change>,
    ) -> Result<Cell> {
        let slot = Owner {
            parent: self.owner,
            property: self.property,
        };
        ownership::adopt_value(
            store,
            &self.conn,
            value,
            &self.element,
            slot,
            SlotKind::ListElement,
            plan,
            changes,
        )
    }

    fn insert_change(&self, index: usize) -> Change {
        Change::ListInsert {
            owner: self.owner,
            property: self.property,
            index,
        }
    }

    fn remove_change(&self, index: usize) -> Change {
        Change::ListRemove {
            owner: self.owner,
            property: self.property,
            index,
        }
    }

    /// The stored cell equal to `value`, if one can exist in this list
    fn probe(&self, store: &InMemoryStorage, value: &Value) -> Result<Option<Cell>> {
        let value = match self.element.validate(value.clone()) {
            Ok(value) => value,
            Err(_) if value.is_null() => return Ok(None),
            Err(err) => return Err(err),
        };
        match value {
            Value::Object(object) => Ok(object.managed_ref()?.and_then(|managed| {
                (Connection::ptr_eq(&managed.conn, &self.conn) && store.contains(managed.key))
                    .then_some(Cell::Link(managed.key))
            })),
            scalar => Cell::scalar(scalar).map(Some),
        }
    }
}

/// A stored element seen as a key path source, resolved inside the
/// snapshot that is already being read.
pub(crate) struct StoredElement<'a> {
    pub store: &'a InMemoryStorage,
    pub conn: &'a Connection,
    pub cell: &'a Cell,
}

impl PropertySource for StoredElement<'_> {
    fn values_at(&self, path: &KeyPath) -> Result<Vec<Value>> {
        self.store
            .resolve_path(self.cell, path.segments())?
            .into_iter()
            .map(|cell| self.conn.materialize(self.store, cell))
            .collect()
    }
}

impl CollectionAccess for ManagedList {
    fn count(&self) -> Result<usize> {
        self.read(|store, handle| store.collection_count(handle))
    }

    fn get(&self, index: usize) -> Result<Value> {
        self.read(|store, handle| {
            let cell = store.collection_get(handle, index)?;
            self.conn.materialize(store, cell)
        })
    }

    fn insert(&self, index: usize, value: Value) -> Result<()> {
        self.mutate("insert", |store, handle, plan, changes| {
            let index = insertion_index(index, store.collection_count(handle)?)?;
            let cell = self.adopt(store, value, plan, changes)?;
            store.collection_insert(handle, index, cell)?;
            changes.push(self.insert_change(index));
            Ok(())
        })
    }

    fn append_all(&self, values: Vec<Value>) -> Result<()> {
        self.mutate("append", |store, handle, plan, changes| {
            let start = store.collection_count(handle)?;
            for (offset, value) in values.into_iter().enumerate() {
                let cell = self.adopt(store, value, plan, changes)?;
                store.collection_insert(handle, start + offset, cell)?;
                changes.push(self.insert_change(start + offset));
            }
            Ok(())
        })
    }

    fn remove(&self, index: usize) -> Result<()> {
        self.mutate("remove", |store, handle, _, changes| {
            let index = element_index(index, store.collection_count(handle)?)?;
            let removed = store.collection_remove(handle, index)?;
            store.release(&removed)?;
            changes.push(self.remove_change(index));
            Ok(())
        })
    }

    fn replace(&self, index: usize, value: Value) -> Result<()> {
        self.mutate("replace", |store, handle, plan, changes| {
            let index = element_index(index, store.collection_count(handle)?)?;
            let cell = self.adopt(store, value, plan, changes)?;
            let old = store.collection_replace(handle, index, cell)?;
            store.release(&old)?;
            changes.push(Change::ListReplace {
                owner: self.owner,
                property: self.property,
                index,
            });
            Ok(())
        })
    }

    fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.mutate("move", |store, handle, _, changes| {
            let count = store.collection_count(handle)?;
            let from = element_index(from, count)?;
            let to = element_index(to, count)?;
            store.collection_move(handle, from, to)?;
            changes.push(Change::ListMove {
                owner: self.owner,
                property: self.property,
                from,
                to,
            });
            Ok(())
        })
    }

    fn swap(&self, a: usize, b: usize) -> Result<()> {
        self.mutate("swap", |store, handle, _, changes| {
            let count = store.collection_count(handle)?;
            let a = element_index(a, count)?;
            let b = element_index(b, count)?;
            store.collection_swap(handle, a, b)?;
            changes.push(Change::ListSwap {
                owner: self.owner,
                property: self.property,
                a,
                b,
            });
            Ok(())
        })
    }

    fn replace_range(&self, start: usize, end: usize, values: Vec<Value>) -> Result<()> {
        self.mutate("replace_range", |store, handle, plan, changes| {
            let (start, end) = subrange(start..end, store.collection_count(handle)?)?;
            for index in (start..end).rev() {
                let removed = store.collection_remove(handle, index)?;
                store.release(&removed)?;
                changes.push(self.remove_change(index));
            }
            for (offset, value) in values.into_iter().enumerate() {
                let cell = self.adopt(store, value, plan, changes)?;
                store.collection_insert(handle, start + offset, cell)?;
                changes.push(self.insert_change(start + offset));
            }
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        self.mutate("clear", |store, handle, _, changes| {
            let removed = store.collection_clear(handle)?;
            for cell in &removed {
                store.release(cell)?;
            }
            changes.push(Change::ListClear {
                owner: self.owner,
                property: self.property,
                removed: removed.len(),
            });
            Ok(())
        })
    }

    fn index_of(&self, value: &Value) -> Result<Option<usize>> {
        self.read(|store, handle| match self.probe(store, value)? {
            Some(target) => store.match_index(handle, &mut |cell| Ok(*cell == target)),
            None => Ok(None),
        })
    }

    fn index_matching(&self, predicate: &Predicate) -> Result<Option<usize>> {
        self.read(|store, handle| {
            store.match_index(handle, &mut |cell| {
                predicate.evaluate(&StoredElement {
                    store,
                    conn: &self.conn,
                    cell,
                })
            })
        })
    }

    fn values(&self) -> Result<Vec<Value>> {
        self.read(|store, handle| {
            (0..store.collection_count(handle)?)
                .map(|index| {
                    let cell = store.collection_get(handle, index)?;
                    self.conn.materialize(store, cell)
                })
                .collect()
        })
    }

    fn values_for_key_path(&self, path: &KeyPath) -> Result<Vec<Value>> {
        self.read(|store, handle| {
            let mut values = Vec::new();
            for index in 0..store.collection_count(handle)? {
                let cell = store.collection_get(handle, index)?;
                values.extend(
                    StoredElement {
                        store,
                        conn: &self.conn,
                        cell: &cell,
                    }
                    .values_at(path)?,
                );
            }
            Ok(values)
        })
    }

    fn is_invalidated(&self) -> bool {
        self.conn.is_stale(self.owner)
    }
}

impl std::fmt::Debug for ManagedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedList")
            .field("conn", &self.conn.id())
            .field("owner", &self.owner)
            .field("property", &self.property)
            .field("element", &self.element)
            .finish()
    }
}
