pub mod arena;
pub mod engine;
pub mod memory;
pub mod table;

pub use arena::{ObjectArena, ObjectKey};
pub use engine::{CollectionHandle, StorageEngine};
pub use memory::InMemoryStorage;
pub use table::{Cell, Field, ObjectRow, Owner};
