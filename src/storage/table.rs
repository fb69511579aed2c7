use super::arena::ObjectKey;
use crate::core::{DbError, ObjectSchema, Result, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// A stored element: a scalar or a link to another row.
///
/// `Cell::Value` never holds `Value::Object`; object references are stored as
/// links and turned back into handles by the accessor that reads them.
#[derive(Debug, Clone)]
pub enum Cell {
    Value(Value),
    Link(ObjectKey),
}

impl Cell {
    pub const NULL: Cell = Cell::Value(Value::Null);

    pub fn scalar(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) => Err(DbError::TypeMismatch(
                "Object references must be stored as links".to_string(),
            )),
            value => Ok(Cell::Value(value)),
        }
    }

    pub fn link(&self) -> Option<ObjectKey> {
        match self {
            Cell::Link(key) => Some(*key),
            Cell::Value(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Value(Value::Null))
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Value(a), Cell::Value(b)) => a == b,
            (Cell::Link(a), Cell::Link(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Field {
    Value(Cell),
    List(im::Vector<Cell>),
}

/// Slot an embedded object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub parent: ObjectKey,
    pub property: usize,
}

/// Stored state of one object.
#[derive(Debug, Clone)]
pub struct ObjectRow {
    schema: Arc<ObjectSchema>,
    fields: im::Vector<Field>,
    owner: Option<Owner>,
}

impl ObjectRow {
    /// A row with every property at its initial value and every list empty.
    pub fn new(schema: Arc<ObjectSchema>, owner: Option<Owner>) -> Self {
        let fields = schema
            .properties()
            .iter()
            .map(|property| {
                if property.is_list() {
                    Field::List(im::Vector::new())
                } else {
                    match property.initial_value() {
                        Value::Object(_) => Field::Value(Cell::NULL),
                        value => Field::Value(Cell::Value(value)),
                    }
                }
            })
            .collect();
        Self {
            schema,
            fields,
            owner,
        }
    }

    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    pub fn class_name(&self) -> &str {
        self.schema.name()
    }

    pub fn owner(&self) -> Option<Owner> {
        self.owner
    }

    pub fn field(&self, property: usize) -> Result<&Field> {
        self.fields.get(property).ok_or_else(|| self.missing(property))
    }

    pub fn field_mut(&mut self, property: usize) -> Result<&mut Field> {
        let missing = self.missing(property);
        self.fields.get_mut(property).ok_or(missing)
    }

    pub fn list(&self, property: usize) -> Result<&im::Vector<Cell>> {
        match self.field(property)? {
            Field::List(cells) => Ok(cells),
            Field::Value(_) => Err(self.not_a_list(property)),
        }
    }

    pub fn list_mut(&mut self, property: usize) -> Result<&mut im::Vector<Cell>> {
        let not_a_list = self.not_a_list(property);
        match self.field_mut(property)? {
            Field::List(cells) => Ok(cells),
            Field::Value(_) => Err(not_a_list),
        }
    }

    pub fn value(&self, property: usize) -> Result<&Cell> {
        match self.field(property)? {
            Field::Value(cell) => Ok(cell),
            Field::List(_) => Err(DbError::TypeMismatch(format!(
                "Property '{}' of '{}' is a list",
                self.property_name(property),
                self.class_name()
            ))),
        }
    }

    pub fn set_value(&mut self, property: usize, cell: Cell) -> Result<Cell> {
        match self.field_mut(property)? {
            Field::Value(slot) => Ok(std::mem::replace(slot, cell)),
            Field::List(_) => Err(DbError::TypeMismatch(
                "Cannot assign a single value to a list property".to_string(),
            )),
        }
    }

    /// Every link held by this row, with the property it is held under.
    pub fn links(&self) -> Vec<(usize, ObjectKey)> {
        let mut links = Vec::new();
        for (property, field) in self.fields.iter().enumerate() {
            match field {
                Field::Value(cell) => links.extend(cell.link().map(|key| (property, key))),
                Field::List(cells) => {
                    links.extend(cells.iter().filter_map(|c| c.link()).map(|key| (property, key)))
                }
            }
        }
        links
    }

    /// Drop list entries pointing at `doomed` and null single links to them.
    /// Returns true if anything changed.
    pub fn scrub_links(&mut self, doomed: &HashSet<ObjectKey>) -> bool {
        let mut changed = false;
        for field in self.fields.iter_mut() {
            match field {
                Field::Value(cell) => {
                    if cell.link().is_some_and(|key| doomed.contains(&key)) {
                        *cell = Cell::NULL;
                        changed = true;
                    }
                }
                Field::List(cells) => {
                    let before = cells.len();
                    cells.retain(|cell| !cell.link().is_some_and(|key| doomed.contains(&key)));
                    changed |= cells.len() != before;
                }
            }
        }
        changed
    }

    fn property_name(&self, property: usize) -> &str {
        self.schema
            .properties()
            .get(property)
            .map(|p| p.name.as_str())
            .unwrap_or("?")
    }

    fn missing(&self, property: usize) -> DbError {
        DbError::PropertyNotFound(format!("#{}", property), self.class_name().to_string())
    }

    fn not_a_list(&self, property: usize) -> DbError {
        DbError::TypeMismatch(format!(
            "Property '{}' of '{}' is not a list",
            self.property_name(property),
            self.class_name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Property};

    fn schema() -> Arc<ObjectSchema> {
        Arc::new(
            ObjectSchema::new("Holder")
                .property(Property::new("name", DataType::String).default("n"))
                .property(Property::list("ints", DataType::Int))
                .property(Property::new("child", DataType::object("Holder"))),
        )
    }

    #[test]
    fn test_new_row_has_initial_values() {
        let row = ObjectRow::new(schema(), None);
        assert_eq!(row.value(0).unwrap(), &Cell::Value(Value::from("n")));
        assert!(row.list(1).unwrap().is_empty());
        assert!(row.value(2).unwrap().is_null());
    }

    #[test]
    fn test_list_access_checks_kind() {
        let mut row = ObjectRow::new(schema(), None);
        assert!(row.list(0).is_err());
        assert!(row.value(1).is_err());
        row.list_mut(1).unwrap().push_back(Cell::Value(Value::Int(3)));
        assert_eq!(row.list(1).unwrap().len(), 1);
        assert!(row.field(9).is_err());
    }

    #[test]
    fn test_scrub_links() {
        let mut arena = crate::storage::arena::ObjectArena::new();
        let target = arena.insert(ObjectRow::new(schema(), None));
        let other = arena.insert(ObjectRow::new(schema(), None));

        let mut row = ObjectRow::new(schema(), None);
        row.set_value(2, Cell::Link(target)).unwrap();
        row.list_mut(1).unwrap().push_back(Cell::Value(Value::Int(1)));

        let doomed: HashSet<ObjectKey> = [target].into_iter().collect();
        assert!(row.scrub_links(&doomed));
        assert!(row.value(2).unwrap().is_null());
        assert_eq!(row.list(1).unwrap().len(), 1);

        row.set_value(2, Cell::Link(other)).unwrap();
        assert!(!row.scrub_links(&doomed));
        assert_eq!(row.links(), vec![(2, other)]);
    }

    #[test]
    fn test_scalar_cells_reject_objects() {
        assert!(Cell::scalar(Value::Int(1)).is_ok());
        let obj = crate::object::Object::new(&schema());
        assert!(Cell::scalar(Value::Object(obj)).is_err());
    }
}
