use super::predicate::Predicate;
use crate::connection::Connection;
use crate::core::{ObjectSchema, Result, Value};
use crate::list::{self, KeyPath, List, ListIndex, PropertySource, StoredElement};
use crate::storage::{Cell, InMemoryStorage, ObjectKey};
use std::fmt;
use std::sync::Arc;

/// Live view of the top-level objects of one class, optionally filtered.
///
/// Results hold no objects. Each call evaluates against the connection's
/// current snapshot, so objects added or deleted since the last call are
/// reflected.
#[derive(Clone)]
pub struct Results {
    conn: Connection,
    schema: Arc<ObjectSchema>,
    filter: Option<Predicate>,
}

impl Results {
    pub(crate) fn new(conn: Connection, schema: Arc<ObjectSchema>) -> Self {
        Self {
            conn,
            schema,
            filter: None,
        }
    }

    pub fn class_name(&self) -> &str {
        self.schema.name()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Narrow these results; stacked filters must all hold.
    pub fn filter(&self, predicate: Predicate) -> Results {
        let filter = match self.filter.clone() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        };
        Results {
            conn: self.conn.clone(),
            schema: Arc::clone(&self.schema),
            filter: Some(filter),
        }
    }

    /// [`filter`](Self::filter) with a predicate in text form
    pub fn filter_str(&self, predicate: &str) -> Result<Results> {
        Ok(self.filter(Predicate::parse(predicate)?))
    }

    fn matching_keys(&self, store: &InMemoryStorage) -> Result<Vec<ObjectKey>> {
        let keys = store.objects_of_class(self.schema.name())?;
        let Some(filter) = &self.filter else {
            return Ok(keys.into_iter().collect());
        };
        let mut matched = Vec::new();
        for key in keys {
            let cell = Cell::Link(key);
            let source = StoredElement {
                store,
                conn: &self.conn,
                cell: &cell,
            };
            if filter.evaluate(&source)? {
                matched.push(key);
            }
        }
        Ok(matched)
    }

    fn read<T>(&self, f: impl FnOnce(&InMemoryStorage, Vec<ObjectKey>) -> Result<T>) -> Result<T> {
        self.conn.read(|store| {
            let keys = self.matching_keys(store)?;
            f(store, keys)
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.read(|_, keys| Ok(keys.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    pub fn get<I: ListIndex>(&self, index: I) -> Result<Value> {
        self.read(|store, keys| {
            let index = list::element_index(index, keys.len())?;
            self.conn.materialize(store, Cell::Link(keys[index]))
        })
    }

    pub fn first(&self) -> Result<Option<Value>> {
        self.read(|store, keys| match keys.first() {
            Some(key) => self.conn.materialize(store, Cell::Link(*key)).map(Some),
            None => Ok(None),
        })
    }

    pub fn last(&self) -> Result<Option<Value>> {
        self.read(|store, keys| match keys.last() {
            Some(key) => self.conn.materialize(store, Cell::Link(*key)).map(Some),
            None => Ok(None),
        })
    }

    /// Every matching object at this moment
    pub fn snapshot(&self) -> Result<Vec<Value>> {
        self.read(|store, keys| {
            keys.into_iter()
                .map(|key| self.conn.materialize(store, Cell::Link(key)))
                .collect()
        })
    }

    /// Live cursor; see [`ListIter`](crate::list::ListIter) for how it treats
    /// objects added or removed while iterating.
    pub fn iter(&self) -> ResultsIter {
        ResultsIter {
            results: self.clone(),
            next: 0,
            end: None,
            done: false,
        }
    }

    pub fn index_of(&self, value: &Value) -> Result<Option<usize>> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        let Some(managed) = object.managed_ref()? else {
            return Ok(None);
        };
        if !Connection::ptr_eq(&managed.conn, &self.conn) {
            return Ok(None);
        }
        self.read(|_, keys| Ok(keys.iter().position(|key| *key == managed.key)))
    }

    /// Position of the first object for which `predicate` holds
    pub fn index_matching(&self, predicate: &Predicate) -> Result<Option<usize>> {
        self.read(|store, keys| {
            for (index, key) in keys.into_iter().enumerate() {
                let cell = Cell::Link(key);
                let source = StoredElement {
                    store,
                    conn: &self.conn,
                    cell: &cell,
                };
                if predicate.evaluate(&source)? {
                    return Ok(Some(index));
                }
            }
            Ok(None)
        })
    }

    /// The values at `path` of every matching object, flattened
    pub fn value_for_key_path(&self, path: &str) -> Result<Vec<Value>> {
        let path = KeyPath::parse(path)?;
        self.read(|store, keys| {
            let mut values = Vec::new();
            for key in keys {
                let cell = Cell::Link(key);
                let source = StoredElement {
                    store,
                    conn: &self.conn,
                    cell: &cell,
                };
                values.extend(source.values_at(&path)?);
            }
            Ok(values)
        })
    }

    /// The list property at the end of `path`, for every matching object
    pub fn lists_for_key_path(&self, path: &str) -> Result<Vec<List>> {
        let key_path = KeyPath::parse(path)?;
        let Some((init, last)) = key_path.split_last() else {
            return Err(crate::core::DbError::InvalidKeyPath(
                "'self' does not name a list".into(),
            ));
        };
        let owners = self.value_for_key_path(&init.to_string())?;
        list::lists_of(owners, last)
    }

    /// False once the connection is closed
    pub fn is_valid(&self) -> bool {
        !self.conn.is_closed()
    }
}

pub struct ResultsIter {
    results: Results,
    next: usize,
    end: Option<usize>,
    done: bool,
}

impl ResultsIter {
    fn step(&mut self) -> Result<Option<Value>> {
        self.results.read(|store, keys| {
            let end = *self.end.get_or_insert(keys.len());
            if self.next >= end.min(keys.len()) {
                return Ok(None);
            }
            let value = self.results.conn.materialize(store, Cell::Link(keys[self.next]))?;
            self.next += 1;
            Ok(Some(value))
        })
    }
}

impl Iterator for ResultsIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = self.step();
        self.done = !matches!(step, Ok(Some(_)));
        step.transpose()
    }
}

impl std::iter::FusedIterator for ResultsIter {}

impl IntoIterator for &Results {
    type Item = Result<Value>;
    type IntoIter = ResultsIter;

    fn into_iter(self) -> ResultsIter {
        self.iter()
    }
}

impl fmt::Debug for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("conn", &self.conn.id())
            .field("class", &self.schema.name())
            .field("filter", &self.filter)
            .finish()
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "[invalid results]");
        }
        match self.count() {
            Ok(count) => write!(f, "Results<{}>({})", self.schema.name(), count),
            Err(_) => write!(f, "[invalid results]"),
        }
    }
}
