//! Everything an application usually needs, in one import.
//!
//! ```
//! use memolist::prelude::*;
//! ```

pub use crate::connection::{Connection, DatabaseConfig};
pub use crate::core::{
    DataType, DbError, Decimal128, ElementType, ObjectId, ObjectSchema, Property, Result, Schema,
    Value,
};
pub use crate::facade::Database;
pub use crate::list::{List, ListIndex};
pub use crate::object::Object;
pub use crate::query::{Predicate, Results};
