pub mod decimal;
pub mod error;
pub mod object_id;
pub mod types;
pub mod value;

pub use decimal::Decimal128;
pub use error::{DbError, Result};
pub use object_id::ObjectId;
pub use types::{DataType, ElementType, ObjectSchema, Property, PropertyKind, Schema};
pub use value::Value;
