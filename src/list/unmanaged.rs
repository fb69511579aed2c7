use super::index::{element_index, insertion_index, subrange};
use super::{CollectionAccess, KeyPath, PropertySource};
use crate::core::{ElementType, Result, Value};
use crate::object::ownership::{self, SlotKind};
use crate::query::Predicate;
use std::sync::{Arc, Mutex};

/// In-memory backing of a list whose owner is not stored yet.
#[derive(Clone)]
pub(crate) struct UnmanagedList {
    element: ElementType,
    elements: Arc<Mutex<Vec<Value>>>,
}

impl UnmanagedList {
    pub(crate) fn new(element: ElementType) -> Self {
        Self {
            element,
            elements: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn prepare(&self, value: Value) -> Result<Value> {
        let value = self.element.validate(value)?;
        if let Value::Object(object) = &value {
            ownership::check_unmanaged_slot(object, SlotKind::ListElement)?;
        }
        Ok(value)
    }

    fn prepare_all(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        values.into_iter().map(|v| self.prepare(v)).collect()
    }

    fn snapshot(&self) -> Result<Vec<Value>> {
        Ok(self.elements.lock()?.clone())
    }
}

impl CollectionAccess for UnmanagedList {
    fn count(&self) -> Result<usize> {
        Ok(self.elements.lock()?.len())
    }

    fn get(&self, index: usize) -> Result<Value> {
        let elements = self.elements.lock()?;
        let index = element_index(index, elements.len())?;
        Ok(elements[index].clone())
    }

    fn insert(&self, index: usize, value: Value) -> Result<()> {
        let value = self.prepare(value)?;
        let mut elements = self.elements.lock()?;
        let index = insertion_index(index, elements.len())?;
        elements.insert(index, value);
        Ok(())
    }

    fn append_all(&self, values: Vec<Value>) -> Result<()> {
        let values = self.prepare_all(values)?;
        self.elements.lock()?.extend(values);
        Ok(())
    }

    fn remove(&self, index: usize) -> Result<()> {
        let mut elements = self.elements.lock()?;
        let index = element_index(index, elements.len())?;
        elements.remove(index);
        Ok(())
    }

    fn replace(&self, index: usize, value: Value) -> Result<()> {
        let value = self.prepare(value)?;
        let mut elements = self.elements.lock()?;
        let index = element_index(index, elements.len())?;
        elements[index] = value;
        Ok(())
    }

    fn move_item(&self, from: usize, to: usize) -> Result<()> {
        let mut elements = self.elements.lock()?;
        let from = element_index(from, elements.len())?;
        let to = element_index(to, elements.len())?;
        let value = elements.remove(from);
        elements.insert(to, value);
        Ok(())
    }

    fn swap(&self, a: usize, b: usize) -> Result<()> {
        let mut elements = self.elements.lock()?;
        let a = element_index(a, elements.len())?;
        let b = element_index(b, elements.len())?;
        elements.swap(a, b);
        Ok(())
    }

    fn replace_range(&self, start: usize, end: usize, values: Vec<Value>) -> Result<()> {
        let values = self.prepare_all(values)?;
        let mut elements = self.elements.lock()?;
        let (start, end) = subrange(start..end, elements.len())?;
        elements.splice(start..end, values);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.elements.lock()?.clear();
        Ok(())
    }

    fn index_of(&self, value: &Value) -> Result<Option<usize>> {
        let target = match self.element.validate(value.clone()) {
            Ok(target) => target,
            Err(_) if value.is_null() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(self.snapshot()?.iter().position(|v| *v == target))
    }

    fn index_matching(&self, predicate: &Predicate) -> Result<Option<usize>> {
        for (index, value) in self.snapshot()?.iter().enumerate() {
            if predicate.evaluate(value)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn values(&self) -> Result<Vec<Value>> {
        self.snapshot()
    }

    fn values_for_key_path(&self, path: &KeyPath) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        for value in self.snapshot()? {
            values.extend(value.values_at(path)?);
        }
        Ok(values)
    }

    fn is_invalidated(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for UnmanagedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.elements.lock().map(|e| e.len()).map_err(|_| std::fmt::Error)?;
        f.debug_struct("UnmanagedList")
            .field("element", &self.element)
            .field("count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn ints(values: &[i64]) -> UnmanagedList {
        let list = UnmanagedList::new(ElementType::new(DataType::Int));
        list.append_all(values.iter().map(|v| Value::Int(*v)).collect())
            .unwrap();
        list
    }

    #[test]
    fn test_insert_shifts_right() {
        let list = ints(&[1, 3]);
        list.insert(1, Value::Int(2)).unwrap();
        assert_eq!(list.values().unwrap(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        list.insert(3, Value::Int(4)).unwrap();
        assert!(list.insert(5, Value::Int(9)).unwrap_err().is_out_of_range());
        assert_eq!(list.count().unwrap(), 4);
    }

    #[test]
    fn test_move_and_swap() {
        let list = ints(&[1, 2, 3]);
        list.move_item(0, 2).unwrap();
        assert_eq!(list.values().unwrap(), vec![Value::Int(2), Value::Int(3), Value::Int(1)]);
        list.swap(0, 2).unwrap();
        assert_eq!(list.values().unwrap(), vec![Value::Int(1), Value::Int(3), Value::Int(2)]);
        assert!(list.move_item(0, 3).is_err());
        assert!(list.swap(3, 0).is_err());
    }

    #[test]
    fn test_replace_range_is_atomic() {
        let list = ints(&[1, 2, 3]);
        let err = list
            .replace_range(0, 1, vec![Value::Int(7), Value::from("x")])
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(list.count().unwrap(), 3);

        list.replace_range(1, 3, vec![Value::Int(9)]).unwrap();
        assert_eq!(list.values().unwrap(), vec![Value::Int(1), Value::Int(9)]);
        assert!(list.replace_range(0, 5, vec![]).is_err());
    }

    #[test]
    fn test_index_of_and_type_checks() {
        let list = ints(&[5, 6, 7]);
        assert_eq!(list.index_of(&Value::Int(6)).unwrap(), Some(1));
        assert_eq!(list.index_of(&Value::Int(9)).unwrap(), None);
        assert_eq!(list.index_of(&Value::Null).unwrap(), None);
        assert!(list.index_of(&Value::from("6")).is_err());
        assert!(list.insert(0, Value::Null).unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_index_matching() {
        let list = ints(&[5, 6, 7, 8]);
        let seven = Predicate::parse("self == 7").unwrap();
        let nine = Predicate::parse("self == 9").unwrap();
        assert_eq!(list.index_matching(&seven).unwrap(), Some(2));
        assert_eq!(list.index_matching(&nine).unwrap(), None);
    }
}
