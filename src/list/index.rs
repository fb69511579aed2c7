use crate::core::{DbError, Result};

/// Integer types accepted as list positions.
///
/// Signed positions are accepted so that a negative position is reported as
/// out of range like any other bad position, instead of failing to convert.
pub trait ListIndex: Copy + std::fmt::Display {
    /// The position as `usize`, `None` if negative or unrepresentable
    fn to_index(self) -> Option<usize>;
}

macro_rules! impl_list_index {
    ($($ty:ty),*) => {$(
        impl ListIndex for $ty {
            fn to_index(self) -> Option<usize> {
                usize::try_from(self).ok()
            }
        }
    )*};
}

impl_list_index!(i32, i64, isize, u32, u64, usize);

/// Position that must name an existing element: `0 <= index < count`.
pub(crate) fn element_index<I: ListIndex>(index: I, count: usize) -> Result<usize> {
    match index.to_index() {
        Some(i) if i < count => Ok(i),
        _ => Err(DbError::index_out_of_bounds(index, count)),
    }
}

/// Position an element may be inserted at: `0 <= index <= count`.
pub(crate) fn insertion_index<I: ListIndex>(index: I, count: usize) -> Result<usize> {
    match index.to_index() {
        Some(i) if i <= count => Ok(i),
        _ => Err(DbError::index_out_of_bounds(index, count + 1)),
    }
}

/// Range that must lie within `0..=count`.
pub(crate) fn subrange<I: ListIndex>(range: std::ops::Range<I>, count: usize) -> Result<(usize, usize)> {
    let start = range.start.to_index();
    let end = range.end.to_index();
    match (start, end) {
        (Some(start), Some(end)) if start <= end && end <= count => Ok((start, end)),
        _ => Err(DbError::OutOfRange(format!(
            "Range {}..{} is out of bounds (list has {} elements)",
            range.start, range.end, count
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_index_bounds() {
        assert_eq!(element_index(1, 2).unwrap(), 1);
        assert!(element_index(2, 2).unwrap_err().is_out_of_range());
        assert!(element_index(-2, 2).unwrap_err().is_out_of_range());
        assert!(element_index(0usize, 0).is_err());
    }

    #[test]
    fn test_insertion_index_allows_end() {
        assert_eq!(insertion_index(2, 2).unwrap(), 2);
        assert!(insertion_index(200, 2).is_err());
        assert!(insertion_index(-200i64, 2).is_err());
    }

    #[test]
    fn test_negative_message_names_position() {
        let err = element_index(-2, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Index out of range: Index -2 is out of bounds (must be less than 2)"
        );
    }

    #[test]
    fn test_subrange() {
        assert_eq!(subrange(0..2, 2).unwrap(), (0, 2));
        assert_eq!(subrange(1..1, 2).unwrap(), (1, 1));
        assert!(subrange(0..3, 2).is_err());
        assert!(subrange(2..1, 2).is_err());
        assert!(subrange(-1..1, 2).is_err());
    }
}
