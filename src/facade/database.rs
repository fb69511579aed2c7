use crate::connection::{Connection, DatabaseConfig};
use crate::core::{DbError, Result, Schema};
use crate::storage::InMemoryStorage;
use crate::transaction::TransactionManager;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

// Registry of open databases by name. Entries are weak: a database goes away
// with its last handle and the next open starts from an empty store.
lazy_static! {
    static ref OPEN_DATABASES: Mutex<HashMap<String, Weak<DatabaseInner>>> =
        Mutex::new(HashMap::new());
}

pub(crate) struct DatabaseInner {
    config: DatabaseConfig,
    schema: Arc<Schema>,
    transactions: TransactionManager,
    open_connections: AtomicUsize,
    next_connection_id: AtomicU64,
}

impl DatabaseInner {
    pub(crate) fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub(crate) fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub(crate) fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub(crate) fn release_connection(&self) {
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared handle to a named in-memory database
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub(crate) fn from_inner(inner: Arc<DatabaseInner>) -> Self {
        Self { inner }
    }

    /// Open the database named by `config`, creating it if no handle to it
    /// is alive. An already open database must have been opened with an
    /// identical schema.
    pub fn open(config: DatabaseConfig, schema: Schema) -> Result<Self> {
        config.validate()?;
        schema.validate()?;

        let mut registry = OPEN_DATABASES.lock()?;
        if let Some(inner) = registry.get(&config.name).and_then(Weak::upgrade) {
            if *inner.schema != schema {
                return Err(DbError::SchemaError(format!(
                    "Database '{}' is already open with a different schema",
                    config.name
                )));
            }
            return Ok(Self { inner });
        }

        let schema = Arc::new(schema);
        let inner = Arc::new(DatabaseInner {
            transactions: TransactionManager::new(InMemoryStorage::new(Arc::clone(&schema))),
            schema,
            open_connections: AtomicUsize::new(0),
            next_connection_id: AtomicU64::new(1),
            config: config.clone(),
        });
        registry.retain(|_, db| db.strong_count() > 0);
        registry.insert(config.name.clone(), Arc::downgrade(&inner));

        debug!(
            name = %config.name,
            classes = inner.schema.len(),
            read_only = config.read_only,
            "database opened"
        );
        Ok(Self { inner })
    }

    /// Open a database under a fresh unique name.
    pub fn temporary(schema: Schema) -> Result<Self> {
        let name = format!("tmp-{}", uuid::Uuid::new_v4());
        Self::open(DatabaseConfig::new(&name), schema)
    }

    /// Open a connection confined to the calling thread.
    pub fn connect(&self) -> Result<Connection> {
        let max = self.inner.config.max_connections;
        let claimed = self
            .inner
            .open_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (open < max).then_some(open + 1)
            });
        if claimed.is_err() {
            return Err(DbError::IllegalState(format!(
                "Database '{}' already has the maximum of {} open connections",
                self.inner.config.name, max
            )));
        }

        let id = self.inner.next_connection_id.fetch_add(1, Ordering::SeqCst);
        Connection::open(id, Arc::clone(&self.inner))
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }

    /// Version of the newest commit
    pub fn version(&self) -> Result<u64> {
        self.inner.transactions.version()
    }

    pub fn ptr_eq(a: &Database, b: &Database) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.config.name)
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, ObjectSchema, Property};

    fn schema() -> Schema {
        Schema::new().class(ObjectSchema::new("IntObject").property(Property::new("intCol", DataType::Int)))
    }

    #[test]
    fn test_open_shares_instances_by_name() {
        let name = format!("shared-{}", uuid::Uuid::new_v4());
        let a = Database::open(DatabaseConfig::new(&name), schema()).unwrap();
        let b = Database::open(DatabaseConfig::new(&name), schema()).unwrap();
        assert!(Database::ptr_eq(&a, &b));

        let other = Database::open(DatabaseConfig::new(&name), Schema::new());
        assert!(matches!(other, Err(DbError::SchemaError(_))));
    }

    #[test]
    fn test_dropped_database_is_recreated() {
        let name = format!("dropped-{}", uuid::Uuid::new_v4());
        let first = Database::open(DatabaseConfig::new(&name), schema()).unwrap();
        drop(first);
        assert!(Database::open(DatabaseConfig::new(&name), Schema::new()).is_ok());
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let bad = Schema::new().class(
            ObjectSchema::new("Holder").property(Property::list("items", DataType::object("Missing"))),
        );
        assert!(Database::temporary(bad).is_err());
    }

    #[test]
    fn test_connection_limit() {
        let db = Database::open(
            DatabaseConfig::new(&format!("limited-{}", uuid::Uuid::new_v4())).max_connections(1),
            schema(),
        )
        .unwrap();
        let conn = db.connect().unwrap();
        assert!(db.connect().unwrap_err().is_illegal_state());

        conn.close().unwrap();
        assert_eq!(db.open_connections(), 0);
        assert!(db.connect().is_ok());
    }
}
