use super::{DbError, Result, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Storage type of a property or list element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Bool,
    Float,
    Double,
    String,
    Data,
    Date,
    Decimal,
    ObjectId,
    Uuid,
    /// Link to an object of the named class.
    Object(String),
}

impl DataType {
    pub fn object(class_name: impl Into<String>) -> Self {
        Self::Object(class_name.into())
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Object(name) => Some(name),
            _ => None,
        }
    }

    /// Whether a non-null value can be stored under this type, allowing
    /// integers to widen into floating and decimal columns. Widening into a
    /// floating column still fails in `coerce` unless it is exact.
    pub fn is_compatible(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Int, Value::Int(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::Float, Value::Float(_) | Value::Int(_))
                | (Self::Double, Value::Double(_) | Value::Float(_) | Value::Int(_))
                | (Self::String, Value::String(_))
                | (Self::Data, Value::Data(_))
                | (Self::Date, Value::Date(_))
                | (Self::Decimal, Value::Decimal(_) | Value::Int(_))
                | (Self::ObjectId, Value::ObjectId(_))
                | (Self::Uuid, Value::Uuid(_))
        ) || match (self, value) {
            (Self::Object(class), Value::Object(obj)) => obj.class_name() == class,
            _ => false,
        }
    }

    /// Convert a compatible value into the exact representation of this type.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if !self.is_compatible(&value) {
            return Err(DbError::TypeMismatch(format!(
                "Expected a value of type {}, got {}",
                self,
                value.type_name()
            )));
        }
        Ok(match (self, value) {
            (Self::Float, Value::Int(i)) => {
                let widened = i as f32;
                if widened as i128 != i128::from(i) {
                    return Err(self.inexact(i));
                }
                Value::Float(widened)
            }
            (Self::Double, Value::Int(i)) => {
                let widened = i as f64;
                if widened as i128 != i128::from(i) {
                    return Err(self.inexact(i));
                }
                Value::Double(widened)
            }
            (Self::Double, Value::Float(f)) => Value::Double(f as f64),
            (Self::Decimal, Value::Int(i)) => Value::Decimal(i.into()),
            (_, value) => value,
        })
    }

    fn inexact(&self, value: i64) -> DbError {
        DbError::TypeMismatch(format!("{} cannot be stored exactly as {}", value, self))
    }

    /// Types with a total order usable by `min`/`max` and sorting.
    pub fn is_orderable(&self) -> bool {
        !matches!(self, Self::Object(_))
    }

    /// Types that `sum` and `average` accept.
    pub fn is_summable(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Double | Self::Decimal)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::String => write!(f, "string"),
            Self::Data => write!(f, "data"),
            Self::Date => write!(f, "date"),
            Self::Decimal => write!(f, "decimal128"),
            Self::ObjectId => write!(f, "objectId"),
            Self::Uuid => write!(f, "uuid"),
            Self::Object(class) => write!(f, "<{}>", class),
        }
    }
}

/// Type of the elements of a list: a storage type plus nullability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementType {
    pub data_type: DataType,
    pub nullable: bool,
}

impl ElementType {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: false,
        }
    }

    pub fn optional(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: true,
        }
    }

    pub fn object(class_name: impl Into<String>) -> Self {
        Self::new(DataType::object(class_name))
    }

    /// Check and coerce a value about to be stored in a list of this type.
    pub fn validate(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            if self.nullable {
                return Ok(Value::Null);
            }
            return Err(DbError::TypeMismatch(format!(
                "Cannot store null in a list of non-optional {}",
                self.data_type
            )));
        }
        self.data_type.coerce(value)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.data_type)
        } else {
            write!(f, "{}", self.data_type)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Value,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub data_type: DataType,
    pub kind: PropertyKind,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl Property {
    /// A single-valued property. Links to objects are always optional.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let nullable = data_type.is_object();
        Self {
            name: name.into(),
            data_type,
            kind: PropertyKind::Value,
            nullable,
            default: None,
        }
    }

    pub fn list(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            kind: PropertyKind::List,
            nullable: false,
            default: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_list(&self) -> bool {
        self.kind == PropertyKind::List
    }

    pub fn element_type(&self) -> ElementType {
        ElementType {
            data_type: self.data_type.clone(),
            nullable: self.nullable,
        }
    }

    /// Value of a freshly constructed object.
    pub fn initial_value(&self) -> Value {
        match &self.default {
            Some(value) => value.clone(),
            None if self.nullable => Value::Null,
            None => match self.data_type {
                DataType::Int => Value::Int(0),
                DataType::Bool => Value::Bool(false),
                DataType::Float => Value::Float(0.0),
                DataType::Double => Value::Double(0.0),
                DataType::String => Value::String(String::new()),
                DataType::Data => Value::Data(Vec::new()),
                DataType::Date => Value::Date(chrono::DateTime::<chrono::Utc>::default()),
                DataType::Decimal => Value::Decimal(super::Decimal128::ZERO),
                DataType::ObjectId => Value::ObjectId(super::ObjectId::from_bytes([0; 12])),
                DataType::Uuid => Value::Uuid(uuid::Uuid::nil()),
                DataType::Object(_) => Value::Null,
            },
        }
    }

    pub fn validate(&self, value: Value) -> Result<Value> {
        if value.is_null() && !self.nullable {
            return Err(DbError::TypeMismatch(format!(
                "Property '{}' of type {} cannot be null",
                self.name, self.data_type
            )));
        }
        if value.is_null() {
            return Ok(value);
        }
        self.data_type.coerce(value).map_err(|err| match err {
            DbError::TypeMismatch(msg) => {
                DbError::TypeMismatch(format!("Property '{}': {}", self.name, msg))
            }
            other => other,
        })
    }
}

/// Schema of one object class.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    name: String,
    properties: Vec<Property>,
    embedded: bool,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            embedded: false,
        }
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Mark the class as embedded: instances are owned by exactly one parent slot.
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn find_property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.find_property_index(name).map(|idx| &self.properties[idx])
    }

    pub fn property_index(&self, name: &str) -> Result<usize> {
        self.find_property_index(name)
            .ok_or_else(|| DbError::PropertyNotFound(name.to_string(), self.name.clone()))
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }
}

/// Registry of every class a database can store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    classes: BTreeMap<String, Arc<ObjectSchema>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: ObjectSchema) -> Self {
        self.classes.insert(class.name.clone(), Arc::new(class));
        self
    }

    pub fn get(&self, name: &str) -> Result<&Arc<ObjectSchema>> {
        self.classes
            .get(name)
            .ok_or_else(|| DbError::ClassNotFound(name.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ObjectSchema>> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        for class in self.classes.values() {
            let mut seen = HashSet::new();
            for property in &class.properties {
                if !seen.insert(property.name.as_str()) {
                    return Err(DbError::SchemaError(format!(
                        "Property '{}' is declared twice on '{}'",
                        property.name, class.name
                    )));
                }
                self.validate_property(class, property)?;
            }
        }
        Ok(())
    }

    fn validate_property(&self, class: &ObjectSchema, property: &Property) -> Result<()> {
        if let DataType::Object(target) = &property.data_type {
            if !self.classes.contains_key(target) {
                return Err(DbError::SchemaError(format!(
                    "Property '{}.{}' links to unknown type '{}'",
                    class.name, property.name, target
                )));
            }
            match property.kind {
                PropertyKind::List if property.nullable => {
                    return Err(DbError::SchemaError(format!(
                        "List property '{}.{}' of objects cannot be optional",
                        class.name, property.name
                    )));
                }
                PropertyKind::Value if !property.nullable => {
                    return Err(DbError::SchemaError(format!(
                        "Object property '{}.{}' must be optional",
                        class.name, property.name
                    )));
                }
                _ => {}
            }
        }
        if let Some(default) = &property.default {
            if property.is_list() || property.data_type.is_object() {
                return Err(DbError::SchemaError(format!(
                    "Property '{}.{}' cannot declare a default value",
                    class.name, property.name
                )));
            }
            property.validate(default.clone()).map_err(|err| {
                DbError::SchemaError(format!("Invalid default for '{}.{}': {}", class.name, property.name, err))
            })?;
        }
        Ok(())
    }
}
