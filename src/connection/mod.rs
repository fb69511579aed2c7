pub mod config;

pub use config::DatabaseConfig;

use crate::core::{DbError, ObjectSchema, Result, Schema, Value};
use crate::facade::database::DatabaseInner;
use crate::facade::Database;
use crate::object::{ownership, Object};
use crate::query::Results;
use crate::storage::{Cell, InMemoryStorage, ObjectKey};
use crate::transaction::{Change, Transaction, TransactionInfo};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;
use tracing::{debug, info_span, trace, warn};

/// Database connection handle
///
/// A connection reads from its own snapshot of the database and is the only
/// way to write to it. It is confined to the thread that opened it: every
/// call from another thread fails with `DbError::IllegalState`, and so does
/// every call through objects and lists it manages.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    /// Unique connection ID
    id: u64,
    database: Arc<DatabaseInner>,
    thread: ThreadId,
    core: Mutex<ConnectionCore>,
}

struct ConnectionCore {
    state: ConnectionState,
    /// Snapshot reads are served from; the working copy while writing
    view: InMemoryStorage,
    /// Committed version `view` was taken from
    version: u64,
    transaction: Option<Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    InTransaction,
    Closed,
}

impl Connection {
    pub(crate) fn open(id: u64, database: Arc<DatabaseInner>) -> Result<Self> {
        let (view, version) = match database.transactions().snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                database.release_connection();
                return Err(err);
            }
        };
        debug!(conn = id, db = %database.config().name, version, "connection opened");

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                id,
                database,
                thread: std::thread::current().id(),
                core: Mutex::new(ConnectionCore {
                    state: ConnectionState::Active,
                    view,
                    version,
                    transaction: None,
                }),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn database(&self) -> Database {
        Database::from_inner(Arc::clone(&self.inner.database))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.inner.database.schema()
    }

    /// Schema of one class, for building unmanaged objects
    pub fn class(&self, name: &str) -> Result<Arc<ObjectSchema>> {
        self.schema().get(name).cloned()
    }

    pub fn ptr_eq(a: &Connection, b: &Connection) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn check_thread(&self) -> Result<()> {
        if std::thread::current().id() != self.inner.thread {
            return Err(DbError::IllegalState(format!(
                "Connection {} accessed from incorrect thread",
                self.inner.id
            )));
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ConnectionCore>> {
        self.check_thread()?;
        Ok(self.inner.core.lock()?)
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, ConnectionCore>> {
        let core = self.lock()?;
        if core.state == ConnectionState::Closed {
            return Err(DbError::IllegalState(format!(
                "Connection {} is closed",
                self.inner.id
            )));
        }
        Ok(core)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a write transaction
    ///
    /// The connection first advances to the newest committed version. Fails
    /// if this connection is already writing, if another connection holds
    /// the database's writer slot, or if the database is read-only.
    pub fn begin_write(&self) -> Result<()> {
        let _span = info_span!("begin_write", conn = self.inner.id).entered();
        let mut core = self.lock_open()?;

        if core.state == ConnectionState::InTransaction {
            return Err(DbError::IllegalState(
                "The connection is already in a write transaction".into(),
            ));
        }
        if self.inner.database.config().read_only {
            return Err(DbError::IllegalState(format!(
                "Cannot begin a write transaction on read-only database '{}'",
                self.inner.database.config().name
            )));
        }

        let transaction = self.inner.database.transactions().begin()?;
        core.view = transaction.base().clone();
        core.version = transaction.read_version();
        core.transaction = Some(transaction);
        core.state = ConnectionState::InTransaction;
        Ok(())
    }

    /// Commit the current write transaction
    pub fn commit_write(&self) -> Result<()> {
        let _span = info_span!("commit_write", conn = self.inner.id).entered();
        let mut core = self.lock_open()?;

        let mut transaction = core
            .transaction
            .take()
            .ok_or_else(|| DbError::IllegalState("No active write transaction to commit".into()))?;

        let working = core.view.clone();
        match self.inner.database.transactions().commit(&mut transaction, working) {
            Ok(version) => {
                core.version = version;
                core.state = ConnectionState::Active;
                Ok(())
            }
            Err(err) => {
                core.transaction = Some(transaction);
                Err(err)
            }
        }
    }

    /// Discard every change made since `begin_write`
    pub fn cancel_write(&self) -> Result<()> {
        let _span = info_span!("cancel_write", conn = self.inner.id).entered();
        let mut core = self.lock_open()?;
        let mut transaction = core
            .transaction
            .take()
            .ok_or_else(|| DbError::IllegalState("No active write transaction to cancel".into()))?;

        Self::rollback(&self.inner.database, &mut core, &mut transaction)
    }

    fn rollback(
        database: &DatabaseInner,
        core: &mut ConnectionCore,
        transaction: &mut Transaction,
    ) -> Result<()> {
        let discarded = transaction.change_count();
        database.transactions().rollback(transaction)?;
        core.view = transaction.base().clone();
        core.version = transaction.read_version();
        core.state = ConnectionState::Active;
        debug!(txn = %transaction.id(), discarded, "write transaction cancelled");
        Ok(())
    }

    /// Run `f` inside a write transaction: commit if it succeeds, cancel if
    /// it fails.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// conn.write(|conn| {
    ///     let obj = conn.create("StringObject", [("stringCol", "a".into())])?;
    ///     holder.list("array")?.append(obj)
    /// })?;
    /// ```
    pub fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.begin_write()?;
        match f(self) {
            Ok(value) => {
                self.commit_write()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(cancel_err) = self.cancel_write() {
                    warn!(conn = self.inner.id, error = %cancel_err, "failed to cancel write transaction");
                }
                Err(err)
            }
        }
    }

    pub fn is_in_write_transaction(&self) -> bool {
        self.lock()
            .map(|core| core.state == ConnectionState::InTransaction)
            .unwrap_or(false)
    }

    /// Diagnostics for the running write transaction
    pub fn transaction_info(&self) -> Result<Option<TransactionInfo>> {
        let core = self.lock_open()?;
        Ok(core.transaction.as_ref().map(TransactionInfo::from))
    }

    /// Advance to the newest committed version. Returns whether anything
    /// changed; always false inside a write transaction.
    pub fn refresh(&self) -> Result<bool> {
        let mut core = self.lock_open()?;
        if core.state == ConnectionState::InTransaction {
            return Ok(false);
        }
        self.advance(&mut core)
    }

    fn advance(&self, core: &mut ConnectionCore) -> Result<bool> {
        let transactions = self.inner.database.transactions();
        if transactions.version()? == core.version {
            return Ok(false);
        }
        let (view, version) = transactions.snapshot()?;
        trace!(conn = self.inner.id, from = core.version, to = version, "connection advanced");
        core.view = view;
        core.version = version;
        Ok(true)
    }

    /// Committed version the connection currently reads
    pub fn version(&self) -> Result<u64> {
        Ok(self.lock_open()?.version)
    }

    /// Close the connection. A running write transaction is cancelled, and
    /// every object and list managed through this connection is invalidated.
    pub fn close(&self) -> Result<()> {
        let mut core = self.lock()?;
        if core.state == ConnectionState::Closed {
            return Ok(());
        }

        if let Some(mut transaction) = core.transaction.take() {
            warn!(
                conn = self.inner.id,
                txn = %transaction.id(),
                "closing connection with an open write transaction; cancelling it"
            );
            Self::rollback(&self.inner.database, &mut core, &mut transaction)?;
        }
        core.state = ConnectionState::Closed;
        self.inner.database.release_connection();

        debug!(conn = self.inner.id, "connection closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock()
            .map(|core| core.state == ConnectionState::Closed)
            .unwrap_or(false)
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Add an unmanaged object, and every unmanaged object reachable from
    /// it, to the database. The same instances become managed. Adding an
    /// object this connection already manages does nothing.
    pub fn add(&self, object: &Object) -> Result<()> {
        let plan = self.mutate(|store, changes| ownership::adopt_top_level(store, self, object, changes))?;
        plan.apply(self)
    }

    /// Create and add an object of `class` with the given property values.
    pub fn create<'a>(
        &self,
        class: &str,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Object> {
        let object = Object::with_values(&self.class(class)?, values)?;
        self.add(&object)?;
        Ok(object)
    }

    /// Delete a managed object along with the embedded objects it owns.
    /// Lists drop their links to it and single links to it become null.
    pub fn delete(&self, object: &Object) -> Result<()> {
        let key = ownership::key_in(object, self)?;
        self.mutate(|store, changes| {
            let class = store.row(key)?.class_name().to_string();
            let deleted = store.delete_object(key)?;
            changes.push(Change::DeleteObject {
                class,
                key,
                cascaded: deleted.len() - 1,
            });
            Ok(())
        })
    }

    /// All top-level objects of `class`, in insertion order
    pub fn objects(&self, class: &str) -> Result<Results> {
        let schema = self.class(class)?;
        if schema.is_embedded() {
            return Err(DbError::IllegalState(format!(
                "Embedded objects of type '{}' can only be reached through their parent",
                class
            )));
        }
        Ok(Results::new(self.clone(), schema))
    }

    // ========================================================================
    // Accessor plumbing
    // ========================================================================

    /// Read from the connection's current snapshot. Outside a write
    /// transaction, auto-refreshing connections advance to the newest commit
    /// first.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&InMemoryStorage) -> Result<T>) -> Result<T> {
        let mut core = self.lock_open()?;
        if core.state == ConnectionState::Active && self.inner.database.config().auto_refresh {
            self.advance(&mut core)?;
        }
        f(&core.view)
    }

    /// Apply one mutation to the write transaction's working copy.
    ///
    /// The mutation is all-or-nothing: if `f` fails, the working copy is
    /// restored to its state before the call and nothing is recorded.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&mut InMemoryStorage, &mut Vec<Change>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock_open()?;
        let core = &mut *guard;
        let transaction = core
            .transaction
            .as_mut()
            .ok_or_else(DbError::not_in_write_transaction)?;

        let backup = core.view.clone();
        let mut changes = Vec::new();
        match f(&mut core.view, &mut changes) {
            Ok(value) => {
                trace!(conn = self.inner.id, changes = changes.len(), "mutation applied");
                transaction.record_changes(changes)?;
                Ok(value)
            }
            Err(err) => {
                core.view = backup;
                Err(err)
            }
        }
    }

    /// Whether `key` no longer names a live object: the connection was
    /// closed or the object is gone from its view. Off the owning thread the
    /// current view is inspected without advancing it, so the answer never
    /// depends on which thread asks.
    pub(crate) fn is_stale(&self, key: ObjectKey) -> bool {
        if self.check_thread().is_ok() {
            return self.read(|store| Ok(!store.contains(key))).unwrap_or(true);
        }
        let core = self.inner.core.lock().unwrap_or_else(PoisonError::into_inner);
        core.state == ConnectionState::Closed || !core.view.contains(key)
    }

    /// Turn a stored cell into a value, links into managed object handles.
    pub(crate) fn materialize(&self, store: &InMemoryStorage, cell: Cell) -> Result<Value> {
        match cell {
            Cell::Value(value) => Ok(value),
            Cell::Link(key) => {
                let schema = Arc::clone(store.row(key)?.schema());
                Ok(Value::Object(Object::managed(self.clone(), key, schema)))
            }
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // Roll back a transaction left open and give back the connection slot
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if core.state == ConnectionState::Closed {
            return;
        }
        if let Some(mut transaction) = core.transaction.take() {
            let _ = self.database.transactions().rollback(&mut transaction);
        }
        core.state = ConnectionState::Closed;
        self.database.release_connection();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("database", &self.inner.database.config().name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Property};

    fn database() -> Database {
        Database::temporary(
            Schema::new().class(
                ObjectSchema::new("IntObject").property(Property::new("intCol", DataType::Int)),
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_connection_creation() {
        let db = database();
        let conn = db.connect().unwrap();
        assert!(!conn.is_closed());
        assert!(!conn.is_in_write_transaction());
        assert_eq!(db.open_connections(), 1);
    }

    #[test]
    fn test_transaction_lifecycle() {
        let conn = database().connect().unwrap();

        conn.begin_write().unwrap();
        assert!(conn.is_in_write_transaction());
        assert!(conn.begin_write().unwrap_err().is_illegal_state());

        conn.commit_write().unwrap();
        assert!(!conn.is_in_write_transaction());
        assert!(conn.commit_write().unwrap_err().is_illegal_state());
        assert!(conn.cancel_write().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_commit_and_cancel() {
        let conn = database().connect().unwrap();

        conn.write(|conn| conn.create("IntObject", [("intCol", Value::Int(1))]))
            .unwrap();
        assert_eq!(conn.objects("IntObject").unwrap().count().unwrap(), 1);

        conn.begin_write().unwrap();
        conn.create("IntObject", [("intCol", Value::Int(2))]).unwrap();
        assert_eq!(conn.objects("IntObject").unwrap().count().unwrap(), 2);
        assert_eq!(conn.transaction_info().unwrap().unwrap().change_count, 1);
        conn.cancel_write().unwrap();

        assert_eq!(conn.objects("IntObject").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_write_cancels_on_error() {
        let conn = database().connect().unwrap();
        let result: Result<()> = conn.write(|conn| {
            conn.create("IntObject", [("intCol", Value::Int(1))])?;
            Err(DbError::IllegalState("abort".into()))
        });

        assert!(result.is_err());
        assert!(!conn.is_in_write_transaction());
        assert_eq!(conn.objects("IntObject").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_mutation_outside_write_fails() {
        let conn = database().connect().unwrap();
        let err = conn
            .create("IntObject", [("intCol", Value::Int(1))])
            .unwrap_err();
        assert_eq!(
            err,
            DbError::IllegalState("Cannot modify managed objects outside of a write transaction".into())
        );
    }

    #[test]
    fn test_read_only_database() {
        let db = Database::open(
            DatabaseConfig::new(&format!("ro-{}", uuid::Uuid::new_v4())).read_only(true),
            Schema::new(),
        )
        .unwrap();
        let conn = db.connect().unwrap();
        assert!(conn.begin_write().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_close_cancels_transaction() {
        let db = database();
        let conn = db.connect().unwrap();
        conn.begin_write().unwrap();
        conn.close().unwrap();

        assert!(conn.is_closed());
        assert!(conn.objects("IntObject").unwrap().count().is_err());
        assert!(db.connect().unwrap().begin_write().is_ok());
    }

    #[test]
    fn test_drop_releases_writer_slot() {
        let db = database();
        let conn = db.connect().unwrap();
        conn.begin_write().unwrap();
        drop(conn);

        assert_eq!(db.open_connections(), 0);
        assert!(db.connect().unwrap().begin_write().is_ok());
    }

    #[test]
    fn test_thread_confinement() {
        let conn = database().connect().unwrap();
        let moved = conn.clone();
        let err = std::thread::spawn(move || moved.begin_write().unwrap_err())
            .join()
            .unwrap();
        assert!(err.is_illegal_state());
        assert!(conn.begin_write().is_ok());
    }

    #[test]
    fn test_unknown_class() {
        let conn = database().connect().unwrap();
        assert!(matches!(conn.objects("Nope"), Err(DbError::ClassNotFound(_))));
    }
}
