use super::arena::{ObjectArena, ObjectKey};
use super::engine::{CollectionHandle, StorageEngine};
use super::table::{Cell, Field, ObjectRow, Owner};
use crate::core::{DbError, ObjectSchema, Result, Schema};
use std::collections::HashSet;
use std::sync::Arc;

/// Full state of a database at one version.
///
/// Built from persistent collections, so `clone` is O(1): a snapshot handed
/// to a reader and the copy a writer is modifying share every untouched node.
#[derive(Debug, Clone)]
pub struct InMemoryStorage {
    schema: Arc<Schema>,
    arena: ObjectArena,
    /// Top-level objects of each class in insertion order
    tables: im::OrdMap<String, im::Vector<ObjectKey>>,
}

impl InMemoryStorage {
    pub fn new(schema: Arc<Schema>) -> Self {
        let tables = schema
            .classes()
            .filter(|class| !class.is_embedded())
            .map(|class| (class.name().to_string(), im::Vector::new()))
            .collect();
        Self {
            schema,
            arena: ObjectArena::new(),
            tables,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.arena.contains(key)
    }

    /// Number of stored objects, embedded ones included
    pub fn object_count(&self) -> usize {
        self.arena.len()
    }

    pub fn row(&self, key: ObjectKey) -> Result<&ObjectRow> {
        self.arena.get(key).ok_or_else(|| DbError::invalidated("Object"))
    }

    fn row_mut(&mut self, key: ObjectKey) -> Result<&mut ObjectRow> {
        self.arena
            .get_mut(key)
            .ok_or_else(|| DbError::invalidated("Object"))
    }

    /// Store a new object with every property at its initial value.
    pub fn create_object(&mut self, class: &Arc<ObjectSchema>, owner: Option<Owner>) -> ObjectKey {
        let key = self.arena.insert(ObjectRow::new(Arc::clone(class), owner));
        if owner.is_none()
            && let Some(table) = self.tables.get_mut(class.name())
        {
            table.push_back(key);
        }
        key
    }

    pub fn objects_of_class(&self, class: &str) -> Result<im::Vector<ObjectKey>> {
        let schema = self.schema.get(class)?;
        if schema.is_embedded() {
            return Err(DbError::IllegalState(format!(
                "Embedded objects of type '{}' can only be reached through their parent",
                class
            )));
        }
        Ok(self.tables.get(class).cloned().unwrap_or_default())
    }

    pub fn get_value(&self, key: ObjectKey, property: usize) -> Result<Cell> {
        self.row(key)?.value(property).cloned()
    }

    /// Overwrite a single-valued property, returning the previous cell.
    pub fn set_value(&mut self, key: ObjectKey, property: usize, cell: Cell) -> Result<Cell> {
        self.row_mut(key)?.set_value(property, cell)
    }

    /// Whether `cell` links to an object owned by a parent slot.
    pub fn is_embedded_link(&self, cell: &Cell) -> bool {
        cell.link()
            .and_then(|key| self.arena.get(key))
            .is_some_and(|row| row.owner().is_some())
    }

    /// Dispose of a cell that just left its slot: embedded objects die with it.
    pub fn release(&mut self, cell: &Cell) -> Result<()> {
        if let Some(key) = cell.link()
            && self.is_embedded_link(cell)
        {
            self.delete_object(key)?;
        }
        Ok(())
    }

    /// Delete an object together with every embedded object it owns, and
    /// scrub all links to them. Returns the deleted keys, parent first.
    pub fn delete_object(&mut self, key: ObjectKey) -> Result<Vec<ObjectKey>> {
        self.row(key)?;

        let mut doomed = vec![key];
        let mut next = 0;
        while next < doomed.len() {
            let parent = doomed[next];
            for (_, child) in self.row(parent)?.links() {
                let owned = self
                    .arena
                    .get(child)
                    .and_then(|row| row.owner())
                    .is_some_and(|owner| owner.parent == parent);
                if owned && !doomed.contains(&child) {
                    doomed.push(child);
                }
            }
            next += 1;
        }

        for key in &doomed {
            if let Some(row) = self.arena.remove(*key)
                && row.owner().is_none()
                && let Some(table) = self.tables.get_mut(row.class_name())
            {
                table.retain(|k| k != key);
            }
        }

        let doomed_set: HashSet<ObjectKey> = doomed.iter().copied().collect();
        let referrers: Vec<ObjectKey> = self
            .arena
            .iter()
            .filter(|(_, row)| row.links().iter().any(|(_, k)| doomed_set.contains(k)))
            .map(|(key, _)| key)
            .collect();
        for referrer in referrers {
            self.row_mut(referrer)?.scrub_links(&doomed_set);
        }

        Ok(doomed)
    }

    /// Follow `path` from `cell`. List properties along the way are flattened
    /// in order and null links yield a single null.
    pub fn resolve_path(&self, cell: &Cell, path: &[String]) -> Result<Vec<Cell>> {
        let mut current = vec![cell.clone()];
        for (depth, name) in path.iter().enumerate() {
            let mut next = Vec::with_capacity(current.len());
            for cell in current {
                match cell {
                    Cell::Link(key) => {
                        let row = self.row(key)?;
                        let property = row.schema().property_index(name)?;
                        match row.field(property)? {
                            Field::Value(value) => next.push(value.clone()),
                            Field::List(cells) => next.extend(cells.iter().cloned()),
                        }
                    }
                    cell if cell.is_null() => next.push(Cell::NULL),
                    Cell::Value(value) => {
                        return Err(DbError::TypeMismatch(format!(
                            "Key path '{}' reaches a {} value before '{}'",
                            path.join("."),
                            value.type_name(),
                            path[depth]
                        )));
                    }
                }
            }
            current = next;
        }
        Ok(current)
    }

    fn list(&self, handle: &CollectionHandle) -> Result<&im::Vector<Cell>> {
        self.row(handle.owner)?.list(handle.property)
    }

    fn list_mut(&mut self, handle: &CollectionHandle) -> Result<&mut im::Vector<Cell>> {
        self.row_mut(handle.owner)?.list_mut(handle.property)
    }
}

fn check_index(index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(DbError::index_out_of_bounds(index, count));
    }
    Ok(())
}

impl StorageEngine for InMemoryStorage {
    fn open_collection(&self, owner: ObjectKey, property: usize) -> Result<CollectionHandle> {
        let row = self.row(owner)?;
        let schema = row.schema();
        let prop = schema.properties().get(property).ok_or_else(|| {
            DbError::PropertyNotFound(format!("#{}", property), schema.name().to_string())
        })?;
        if !prop.is_list() {
            return Err(DbError::TypeMismatch(format!(
                "Property '{}' of '{}' is not a list",
                prop.name,
                schema.name()
            )));
        }
        Ok(CollectionHandle {
            owner,
            property,
            element: prop.element_type(),
        })
    }

    fn collection_count(&self, handle: &CollectionHandle) -> Result<usize> {
        Ok(self.list(handle)?.len())
    }

    fn collection_get(&self, handle: &CollectionHandle, index: usize) -> Result<Cell> {
        let list = self.list(handle)?;
        check_index(index, list.len())?;
        Ok(list[index].clone())
    }

    fn collection_insert(
        &mut self,
        handle: &CollectionHandle,
        index: usize,
        cell: Cell,
    ) -> Result<()> {
        let list = self.list_mut(handle)?;
        check_index(index, list.len() + 1)?;
        list.insert(index, cell);
        Ok(())
    }

    fn collection_remove(&mut self, handle: &CollectionHandle, index: usize) -> Result<Cell> {
        let list = self.list_mut(handle)?;
        check_index(index, list.len())?;
        Ok(list.remove(index))
    }

    fn collection_replace(
        &mut self,
        handle: &CollectionHandle,
        index: usize,
        cell: Cell,
    ) -> Result<Cell> {
        let list = self.list_mut(handle)?;
        check_index(index, list.len())?;
        Ok(list.set(index, cell))
    }

    fn collection_move(&mut self, handle: &CollectionHandle, from: usize, to: usize) -> Result<()> {
        let list = self.list_mut(handle)?;
        check_index(from, list.len())?;
        check_index(to, list.len())?;
        if from != to {
            let cell = list.remove(from);
            list.insert(to, cell);
        }
        Ok(())
    }

    fn collection_swap(&mut self, handle: &CollectionHandle, a: usize, b: usize) -> Result<()> {
        let list = self.list_mut(handle)?;
        check_index(a, list.len())?;
        check_index(b, list.len())?;
        if a != b {
            list.swap(a, b);
        }
        Ok(())
    }

    fn collection_clear(&mut self, handle: &CollectionHandle) -> Result<Vec<Cell>> {
        let list = self.list_mut(handle)?;
        Ok(std::mem::take(list).into_iter().collect())
    }

    fn match_index(
        &self,
        handle: &CollectionHandle,
        matches: &mut dyn FnMut(&Cell) -> Result<bool>,
    ) -> Result<Option<usize>> {
        for (index, cell) in self.list(handle)?.iter().enumerate() {
            if matches(cell)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}
