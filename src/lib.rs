#![recursion_limit = "256"]
// ============================================================================
// MemoList Library
// ============================================================================
//
// An embedded, in-memory object database whose centrepiece is `List`: an
// ordered collection property that behaves the same whether its owner is a
// plain in-memory object or a stored one, and that takes part in the
// database's single-writer transactions once stored.
//
// ============================================================================

//! # Examples
//!
//! ```
//! use memolist::{DataType, Database, ObjectSchema, Property, Schema, Value};
//!
//! # fn main() -> memolist::Result<()> {
//! let schema = Schema::new().class(
//!     ObjectSchema::new("Playlist")
//!         .property(Property::new("name", DataType::String))
//!         .property(Property::list("tracks", DataType::String)),
//! );
//! let db = Database::temporary(schema)?;
//! let conn = db.connect()?;
//!
//! let playlist = conn.write(|c| c.create("Playlist", [("name", Value::from("road trip"))]))?;
//! let tracks = playlist.list("tracks")?;
//! conn.write(|_| tracks.append_all(["intro", "outro"]))?;
//! conn.write(|_| tracks.insert(1, "middle"))?;
//!
//! assert_eq!(tracks.count()?, 3);
//! assert_eq!(tracks.get(1)?, Value::from("middle"));
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod core;
pub mod facade;
pub mod list;
pub mod object;
pub mod prelude;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use core::{
    DataType, DbError, Decimal128, ElementType, ObjectId, ObjectSchema, Property, Result, Schema,
    Value,
};
pub use facade::Database;
pub use connection::{Connection, DatabaseConfig};
pub use object::Object;
pub use list::{KeyPath, List, ListIndex, ListIter, PropertySource};
pub use query::{CompareOp, Predicate, Results};
pub use transaction::TransactionInfo;
