// ============================================================================
// Lists
// ============================================================================
//
// `List` is the one public collection type. It is backed either by an
// in-memory vector (while its owning object is unmanaged) or by an accessor
// over a stored list property. Adding the owner to a database switches the
// backing of the same instance in place; there is no way back.
//
// Positions accept any `ListIndex`, so negative positions are reported as
// out of range rather than rejected by the type system.
//
// ============================================================================

mod aggregate;
mod index;
mod iter;
mod key_path;
mod managed;
mod unmanaged;

pub use index::ListIndex;
pub use iter::ListIter;
pub use key_path::{KeyPath, PropertySource};

pub(crate) use index::element_index;
pub(crate) use managed::{ManagedList, StoredElement};
pub(crate) use unmanaged::UnmanagedList;

use crate::connection::Connection;
use crate::core::{DataType, DbError, ElementType, Result, Value};
use crate::object::Object;
use crate::query::Predicate;
use crate::storage::ObjectKey;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};

/// Operations both backings provide. Positions are already converted to
/// `usize`; each backing still checks them against its own count.
pub(crate) trait CollectionAccess {
    fn count(&self) -> Result<usize>;
    fn get(&self, index: usize) -> Result<Value>;
    fn insert(&self, index: usize, value: Value) -> Result<()>;
    fn append_all(&self, values: Vec<Value>) -> Result<()>;
    fn remove(&self, index: usize) -> Result<()>;
    fn replace(&self, index: usize, value: Value) -> Result<()>;
    fn move_item(&self, from: usize, to: usize) -> Result<()>;
    fn swap(&self, a: usize, b: usize) -> Result<()>;
    fn replace_range(&self, start: usize, end: usize, values: Vec<Value>) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn index_of(&self, value: &Value) -> Result<Option<usize>>;
    fn index_matching(&self, predicate: &Predicate) -> Result<Option<usize>>;
    fn values(&self) -> Result<Vec<Value>>;
    fn values_for_key_path(&self, path: &KeyPath) -> Result<Vec<Value>>;
    fn is_invalidated(&self) -> bool;
}

#[derive(Clone, Debug)]
enum Backing {
    Unmanaged(UnmanagedList),
    Managed(ManagedList),
}

/// Ordered collection of values or object references.
///
/// Cloning yields another handle to the same list.
#[derive(Clone)]
pub struct List {
    inner: Arc<ListInner>,
}

struct ListInner {
    element: ElementType,
    backing: Mutex<Backing>,
}

impl List {
    /// A new, empty, unmanaged list.
    pub fn new(element: ElementType) -> Self {
        Self::from_backing(element.clone(), Backing::Unmanaged(UnmanagedList::new(element)))
    }

    pub(crate) fn from_managed(list: ManagedList) -> Self {
        Self::from_backing(list.element().clone(), Backing::Managed(list))
    }

    fn from_backing(element: ElementType, backing: Backing) -> Self {
        Self {
            inner: Arc::new(ListInner {
                element,
                backing: Mutex::new(backing),
            }),
        }
    }

    /// Switch to the stored list `property` of `owner`.
    pub(crate) fn attach(&self, conn: Connection, owner: ObjectKey, property: usize) -> Result<()> {
        *self.inner.backing.lock()? = Backing::Managed(ManagedList::new(
            conn,
            owner,
            property,
            self.inner.element.clone(),
        ));
        Ok(())
    }

    pub fn element_type(&self) -> &ElementType {
        &self.inner.element
    }

    fn with_access<T>(&self, f: impl FnOnce(&dyn CollectionAccess) -> Result<T>) -> Result<T> {
        // Cloned out so no list lock is held while the backing runs
        let backing = self.inner.backing.lock()?.clone();
        match &backing {
            Backing::Unmanaged(list) => f(list),
            Backing::Managed(list) => f(list),
        }
    }

    fn position<I: ListIndex>(access: &dyn CollectionAccess, index: I) -> Result<usize> {
        match index.to_index() {
            Some(index) => Ok(index),
            None => Err(DbError::index_out_of_bounds(index, access.count()?)),
        }
    }

    fn insert_position<I: ListIndex>(access: &dyn CollectionAccess, index: I) -> Result<usize> {
        match index.to_index() {
            Some(index) => Ok(index),
            None => Err(DbError::index_out_of_bounds(index, access.count()? + 1)),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn count(&self) -> Result<usize> {
        self.with_access(|access| access.count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    pub fn get<I: ListIndex>(&self, index: I) -> Result<Value> {
        self.with_access(|access| access.get(Self::position(access, index)?))
    }

    /// Typed element at `index`
    pub fn get_as<T, I: ListIndex>(&self, index: I) -> Result<T>
    where
        T: TryFrom<Value, Error = DbError>,
    {
        T::try_from(self.get(index)?)
    }

    /// Object at `index` of a list of objects
    pub fn object<I: ListIndex>(&self, index: I) -> Result<Object> {
        self.get(index)?.into_object()
    }

    pub fn first(&self) -> Result<Option<Value>> {
        self.with_access(|access| match access.count()? {
            0 => Ok(None),
            _ => access.get(0).map(Some),
        })
    }

    pub fn last(&self) -> Result<Option<Value>> {
        self.with_access(|access| match access.count()? {
            0 => Ok(None),
            n => access.get(n - 1).map(Some),
        })
    }

    /// Every element, in order
    pub fn values(&self) -> Result<Vec<Value>> {
        self.with_access(|access| access.values())
    }

    pub fn iter(&self) -> ListIter {
        ListIter::new(self.clone())
    }

    /// Position of the first element equal to `value`
    pub fn index_of(&self, value: impl Into<Value>) -> Result<Option<usize>> {
        let value = value.into();
        self.with_access(|access| access.index_of(&value))
    }

    pub fn contains(&self, value: impl Into<Value>) -> Result<bool> {
        Ok(self.index_of(value)?.is_some())
    }

    /// Position of the first element matching `predicate`
    pub fn index_matching(&self, predicate: &Predicate) -> Result<Option<usize>> {
        self.with_access(|access| access.index_matching(predicate))
    }

    /// Values reached by following `path` from every element, flattened in
    /// list order.
    pub fn value_for_key_path(&self, path: &str) -> Result<Vec<Value>> {
        let path = KeyPath::parse(path)?;
        self.with_access(|access| access.values_for_key_path(&path))
    }

    /// The list property at the end of `path`, for every element
    pub fn lists_for_key_path(&self, path: &str) -> Result<Vec<List>> {
        let path = KeyPath::parse(path)?;
        let (init, last) = path
            .split_last()
            .ok_or_else(|| DbError::InvalidKeyPath("'self' does not name a list".into()))?;
        let owners = self.with_access(|access| access.values_for_key_path(&init))?;
        lists_of(owners, last)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn insert<I: ListIndex>(&self, index: I, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with_access(|access| access.insert(Self::insert_position(access, index)?, value))
    }

    pub fn append(&self, value: impl Into<Value>) -> Result<()> {
        self.append_all([value.into()])
    }

    /// Append every value of `values`. The source is collected before the
    /// first insertion, so appending a list's own values is well defined.
    pub fn append_all<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.with_access(|access| access.append_all(values))
    }

    /// Overwrite the element at `index`
    pub fn replace<I: ListIndex>(&self, index: I, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with_access(|access| access.replace(Self::position(access, index)?, value))
    }

    pub fn set<I: ListIndex>(&self, index: I, value: impl Into<Value>) -> Result<()> {
        self.replace(index, value)
    }

    pub fn remove<I: ListIndex>(&self, index: I) -> Result<()> {
        self.with_access(|access| access.remove(Self::position(access, index)?))
    }

    pub fn remove_last(&self) -> Result<()> {
        self.with_access(|access| match access.count()? {
            0 => Err(DbError::OutOfRange("Cannot remove the last element of an empty list".into())),
            n => access.remove(n - 1),
        })
    }

    pub fn remove_all(&self) -> Result<()> {
        self.with_access(|access| access.clear())
    }

    /// Move the element at `from` so that it ends up at `to`.
    pub fn move_item<I: ListIndex>(&self, from: I, to: I) -> Result<()> {
        self.with_access(|access| {
            let from = Self::position(access, from)?;
            let to = Self::position(access, to)?;
            access.move_item(from, to)
        })
    }

    pub fn swap_at<I: ListIndex>(&self, a: I, b: I) -> Result<()> {
        self.with_access(|access| {
            let a = Self::position(access, a)?;
            let b = Self::position(access, b)?;
            access.swap(a, b)
        })
    }

    /// Replace the elements in `range` with `values` in one step.
    pub fn replace_subrange<I: ListIndex, V: Into<Value>>(
        &self,
        range: Range<I>,
        values: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.with_access(|access| match (range.start.to_index(), range.end.to_index()) {
            (Some(start), Some(end)) => access.replace_range(start, end, values),
            _ => Err(DbError::OutOfRange(format!(
                "Range {}..{} is out of bounds (list has {} elements)",
                range.start,
                range.end,
                access.count()?
            ))),
        })
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    fn scalar_type(&self) -> Result<&DataType> {
        let data_type = &self.inner.element.data_type;
        if data_type.is_object() {
            return Err(DbError::TypeMismatch(format!(
                "List of {} needs a property to aggregate",
                data_type
            )));
        }
        Ok(data_type)
    }

    pub fn min(&self) -> Result<Option<Value>> {
        aggregate::orderable(self.scalar_type()?)?;
        aggregate::extreme(self.values()?, Ordering::Less)
    }

    pub fn max(&self) -> Result<Option<Value>> {
        aggregate::orderable(self.scalar_type()?)?;
        aggregate::extreme(self.values()?, Ordering::Greater)
    }

    /// Sum of the non-null elements; zero of the element type when empty
    pub fn sum(&self) -> Result<Value> {
        let data_type = self.scalar_type()?.clone();
        aggregate::summable(&data_type)?;
        aggregate::sum(self.values()?, &data_type)
    }

    pub fn average(&self) -> Result<Option<Value>> {
        let data_type = self.scalar_type()?.clone();
        aggregate::summable(&data_type)?;
        aggregate::average(self.values()?, &data_type)
    }

    /// Type of `property` on the elements of a list of objects. `None` when
    /// it cannot be known: an empty unmanaged list.
    fn property_type(&self, property: &str) -> Result<Option<DataType>> {
        let class = self.inner.element.data_type.class_name().ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "List of {} has no property '{}'",
                self.inner.element, property
            ))
        })?;
        let schema = match self.connection() {
            Some(conn) => conn.class(class)?,
            None => match self.first()? {
                Some(Value::Object(object)) => Arc::clone(object.schema()),
                _ => return Ok(None),
            },
        };
        let prop = schema
            .get_property(property)
            .ok_or_else(|| DbError::PropertyNotFound(property.to_string(), class.to_string()))?;
        if prop.is_list() {
            return Err(DbError::TypeMismatch(format!(
                "Cannot aggregate list property '{}'",
                property
            )));
        }
        Ok(Some(prop.data_type.clone()))
    }

    pub fn min_of(&self, property: &str) -> Result<Option<Value>> {
        if let Some(data_type) = self.property_type(property)? {
            aggregate::orderable(&data_type)?;
        }
        aggregate::extreme(self.value_for_key_path(property)?, Ordering::Less)
    }

    pub fn max_of(&self, property: &str) -> Result<Option<Value>> {
        if let Some(data_type) = self.property_type(property)? {
            aggregate::orderable(&data_type)?;
        }
        aggregate::extreme(self.value_for_key_path(property)?, Ordering::Greater)
    }

    pub fn sum_of(&self, property: &str) -> Result<Value> {
        match self.property_type(property)? {
            Some(data_type) => {
                aggregate::summable(&data_type)?;
                aggregate::sum(self.value_for_key_path(property)?, &data_type)
            }
            None => Ok(Value::Int(0)),
        }
    }

    pub fn average_of(&self, property: &str) -> Result<Option<Value>> {
        match self.property_type(property)? {
            Some(data_type) => {
                aggregate::summable(&data_type)?;
                aggregate::average(self.value_for_key_path(property)?, &data_type)
            }
            None => Ok(None),
        }
    }

    /// Elements of a scalar list in sorted order
    pub fn sorted(&self, ascending: bool) -> Result<Vec<Value>> {
        self.scalar_type()?;
        let keyed = self.values()?.into_iter().map(|v| (v.clone(), v)).collect();
        aggregate::sort_by_key(keyed, ascending)
    }

    /// Elements of a list of objects ordered by `property`
    pub fn sorted_by(&self, property: &str, ascending: bool) -> Result<Vec<Value>> {
        if let Some(data_type) = self.property_type(property)? {
            aggregate::orderable(&data_type)?;
        }
        let path = KeyPath::parse(property)?;
        let mut keyed = Vec::new();
        for value in self.values()? {
            let mut keys = value.values_at(&path)?;
            if keys.len() != 1 {
                return Err(DbError::InvalidKeyPath(format!(
                    "'{}' does not name a single value",
                    path
                )));
            }
            keyed.push((keys.remove(0), value));
        }
        aggregate::sort_by_key(keyed, ascending)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// True once the owning object was deleted or its connection closed.
    /// Unmanaged lists are never invalidated.
    pub fn is_invalidated(&self) -> bool {
        let backing = self
            .inner
            .backing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match &backing {
            Backing::Unmanaged(list) => list.is_invalidated(),
            Backing::Managed(list) => list.is_invalidated(),
        }
    }

    pub fn is_managed(&self) -> bool {
        self.connection().is_some()
    }

    /// The connection of a managed list
    pub fn connection(&self) -> Option<Connection> {
        match &*self.inner.backing.lock().ok()? {
            Backing::Managed(list) => Some(list.connection().clone()),
            Backing::Unmanaged(_) => None,
        }
    }

    /// Whether both handles are the same list instance
    pub fn ptr_eq(a: &List, b: &List) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

/// The list property `property` of every object in `owners`; nulls are skipped.
pub(crate) fn lists_of(owners: Vec<Value>, property: &str) -> Result<Vec<List>> {
    owners
        .into_iter()
        .filter(|owner| !owner.is_null())
        .map(|owner| match owner {
            Value::Object(object) => object.list(property),
            other => Err(DbError::TypeMismatch(format!(
                "Cannot read list '{}' from a {} value",
                property,
                other.type_name()
            ))),
        })
        .collect()
}

/// Element-wise equality; invalidated lists equal nothing but themselves.
impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        if List::ptr_eq(self, other) {
            return true;
        }
        match (self.values(), other.values()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = self.inner.backing.lock().map_err(|_| fmt::Error)?.clone();
        f.debug_struct("List")
            .field("element", &self.inner.element)
            .field("backing", &backing)
            .finish()
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.values() {
            Ok(values) => {
                write!(f, "List<{}> [", self.inner.element)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match value {
                        Value::Object(object) => write!(f, " <{}>", object.class_name())?,
                        value => write!(f, " {}", value)?,
                    }
                }
                write!(f, " ]")
            }
            Err(_) => write!(f, "[invalid list]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjectSchema, Property, Schema};

    fn ints() -> List {
        List::new(ElementType::new(DataType::Int))
    }

    #[test]
    fn test_primitive_operations() {
        let list = ints();
        list.append(5).unwrap();
        assert_eq!(list.first().unwrap(), Some(Value::Int(5)));
        assert_eq!(list.last().unwrap(), Some(Value::Int(5)));
        assert_eq!(list.get_as::<i64, _>(0).unwrap(), 5);

        list.append_all([6, 7, 8]).unwrap();
        assert_eq!(list.index_of(6).unwrap(), Some(1));
        assert_eq!(
            list.index_matching(&Predicate::parse("self == 7").unwrap()).unwrap(),
            Some(2)
        );
        assert_eq!(
            list.index_matching(&Predicate::parse("self == 9").unwrap()).unwrap(),
            None
        );
        assert_eq!(list.max().unwrap(), Some(Value::Int(8)));
        assert_eq!(list.min().unwrap(), Some(Value::Int(5)));
        assert_eq!(list.sum().unwrap(), Value::Int(26));
        assert_eq!(list.average().unwrap(), Some(Value::Double(6.5)));
    }

    #[test]
    fn test_empty_aggregates() {
        let list = ints();
        assert_eq!(list.min().unwrap(), None);
        assert_eq!(list.average().unwrap(), None);
        assert_eq!(list.sum().unwrap(), Value::Int(0));
        assert!(list.first().unwrap().is_none());
        assert!(!list.contains(5).unwrap());
    }

    #[test]
    fn test_optional_elements() {
        let list = List::new(ElementType::optional(DataType::Int));
        list.append_all([Some(3), None, Some(1)]).unwrap();
        assert!(list.contains(Value::Null).unwrap());
        assert_eq!(list.sum().unwrap(), Value::Int(4));
        assert_eq!(
            list.sorted(true).unwrap(),
            vec![Value::Null, Value::Int(1), Value::Int(3)]
        );
    }

    #[test]
    fn test_negative_positions_are_out_of_range() {
        let list = ints();
        list.append_all([1, 2]).unwrap();
        assert!(list.get(-1).unwrap_err().is_out_of_range());
        assert!(list.insert(-200, 3).unwrap_err().is_out_of_range());
        assert!(list.remove(-2).unwrap_err().is_out_of_range());
        assert!(list.swap_at(0, -1).unwrap_err().is_out_of_range());
        assert!(list.replace_subrange(-200..200, [3]).unwrap_err().is_out_of_range());
        assert_eq!(list.count().unwrap(), 2);
    }

    #[test]
    fn test_remove_last_on_empty() {
        let list = ints();
        assert!(list.remove_last().unwrap_err().is_out_of_range());
        list.remove_all().unwrap();
    }

    #[test]
    fn test_equality_is_by_content() {
        let a = ints();
        let b = ints();
        assert_eq!(a, b);
        a.append_all([1, 2]).unwrap();
        b.append_all([1, 2]).unwrap();
        assert_eq!(a, b);
        assert!(!List::ptr_eq(&a, &b));
        b.append(3).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_type_mismatch() {
        let list = ints();
        assert!(list.append("x").unwrap_err().is_type_mismatch());
        assert!(list.min_of("x").unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_object_aggregates_unmanaged() {
        let schema = Schema::new().class(
            ObjectSchema::new("IntObject").property(Property::new("intCol", DataType::Int)),
        );
        let class = schema.get("IntObject").unwrap();
        let list = List::new(ElementType::object("IntObject"));
        assert_eq!(list.sum_of("intCol").unwrap(), Value::Int(0));
        for i in [5, 6, 8] {
            list.append(Object::with_values(class, [("intCol", Value::Int(i))]).unwrap())
                .unwrap();
        }
        assert_eq!(list.sum_of("intCol").unwrap(), Value::Int(19));
        assert_eq!(list.max_of("intCol").unwrap(), Some(Value::Int(8)));
        assert!(list.min().unwrap_err().is_type_mismatch());
        assert!(matches!(list.sum_of("nope"), Err(DbError::PropertyNotFound(_, _))));

        let sorted = list.sorted_by("intCol", false).unwrap();
        let first = sorted[0].as_object().unwrap();
        assert_eq!(first.get("intCol").unwrap(), Value::Int(8));
        assert_eq!(
            list.value_for_key_path("intCol").unwrap(),
            vec![Value::Int(5), Value::Int(6), Value::Int(8)]
        );
    }

    #[test]
    fn test_display() {
        let list = ints();
        list.append_all([1, 2]).unwrap();
        assert_eq!(list.to_string(), "List<int> [ 1, 2 ]");
    }
}
