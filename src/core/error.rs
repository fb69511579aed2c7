use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Index out of range: {0}")]
    OutOfRange(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Illegal assignment: {0}")]
    IllegalAssignment(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Object type '{0}' not found in schema")]
    ClassNotFound(String),

    #[error("Property '{0}' not found on object type '{1}'")]
    PropertyNotFound(String, String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Invalid key path: {0}")]
    InvalidKeyPath(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl DbError {
    pub(crate) fn index_out_of_bounds(index: impl std::fmt::Display, count: usize) -> Self {
        Self::OutOfRange(format!(
            "Index {} is out of bounds (must be less than {})",
            index, count
        ))
    }

    pub(crate) fn invalidated(what: &str) -> Self {
        Self::IllegalState(format!(
            "{} has been invalidated: the owning object was deleted or its connection was closed",
            what
        ))
    }

    pub(crate) fn not_in_write_transaction() -> Self {
        Self::IllegalState(
            "Cannot modify managed objects outside of a write transaction".to_string(),
        )
    }

    /// True for the kinds that describe a caller mistake about positions.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange(_))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }

    pub fn is_illegal_assignment(&self) -> bool {
        matches!(self, Self::IllegalAssignment(_))
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds_message() {
        let err = DbError::index_out_of_bounds(200, 2);
        assert!(err.is_out_of_range());
        assert_eq!(
            err.to_string(),
            "Index out of range: Index 200 is out of bounds (must be less than 2)"
        );
    }

    #[test]
    fn test_poison_maps_to_lock_error() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(0));
        let cloned = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = cloned.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: DbError = lock.lock().unwrap_err().into();
        assert!(matches!(err, DbError::LockError(_)));
    }
}
