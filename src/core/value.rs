use crate::core::{DataType, DbError, Decimal128, ObjectId, Result};
use crate::object::Object;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// One element of a list or one property value.
///
/// Object references compare by the identity of the underlying object, never
/// by the identity of the handle.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    Data(Vec<u8>),
    Date(DateTime<Utc>),
    Decimal(Decimal128),
    ObjectId(ObjectId),
    Uuid(Uuid),
    Object(Object),
}

impl Value {
    /// Total order over comparable values. Nulls sort first.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Less),
            (_, Value::Null) => Ok(Ordering::Greater),

            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::Data(a), Value::Data(b)) => Ok(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Ok(a.cmp(b)),
            (Value::ObjectId(a), Value::ObjectId(b)) => Ok(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Ok(a.cmp(b)),

            (Value::Decimal(a), Value::Int(b)) => Ok(a.cmp(&Decimal128::from(*b))),
            (Value::Int(a), Value::Decimal(b)) => Ok(Decimal128::from(*a).cmp(b)),

            // Float, Double and Int compare numerically
            (a, b) if a.is_floating() || b.is_floating() => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(compare_f64(a, b)),
                _ => Err(self.incomparable(other)),
            },

            _ => Err(self.incomparable(other)),
        }
    }

    fn incomparable(&self, other: &Value) -> DbError {
        DbError::TypeMismatch(format!(
            "Cannot compare incompatible types: {} and {}",
            self.type_name(),
            other.type_name()
        ))
    }

    fn is_floating(&self) -> bool {
        matches!(self, Value::Float(_) | Value::Double(_))
    }

    fn binary_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Data(_) => "data",
            Self::Date(_) => "date",
            Self::Decimal(_) => "decimal128",
            Self::ObjectId(_) => "objectId",
            Self::Uuid(_) => "uuid",
            Self::Object(_) => "object",
        }
    }

    /// The storage type of this value, `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(_) => DataType::Bool,
            Self::Int(_) => DataType::Int,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::Data(_) => DataType::Data,
            Self::Date(_) => DataType::Date,
            Self::Decimal(_) => DataType::Decimal,
            Self::ObjectId(_) => DataType::ObjectId,
            Self::Uuid(_) => DataType::Uuid,
            Self::Object(obj) => DataType::Object(obj.class_name().to_string()),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Float(_) | Self::Double(_) | Self::Decimal(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f as f64),
            Self::Double(d) => Some(*d),
            Self::Int(i) => Some(*i as f64),
            Self::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal128> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Int(i) => Some(Decimal128::from(*i)),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Self::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Extract an object reference, failing for anything else.
    pub fn into_object(self) -> Result<Object> {
        match self {
            Self::Object(obj) => Ok(obj),
            other => Err(DbError::TypeMismatch(format!(
                "Expected an object, got {}",
                other.type_name()
            ))),
        }
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    // NaN is equal to NaN and greater than all other values
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Data(a), Self::Data(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::ObjectId(a), Self::ObjectId(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.is_same_object(b),
            (Self::Decimal(d), Self::Int(i)) | (Self::Int(i), Self::Decimal(d)) => {
                *d == Decimal128::from(*i)
            }
            (a, b) if a.is_floating() || b.is_floating() => {
                match (a.binary_float(), b.binary_float()) {
                    (Some(a), Some(b)) => compare_f64(a, b) == Ordering::Equal,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Double(d) => write!(f, "{}", d),
            Self::String(s) => write!(f, "{}", s),
            Self::Data(d) => write!(f, "<{} bytes>", d.len()),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::ObjectId(id) => write!(f, "{}", id),
            Self::Uuid(u) => write!(f, "{}", u),
            Self::Object(obj) => write!(f, "{}", obj),
        }
    }
}

/// `From<T>` and `TryFrom<Value>` for `T` and `Option<T>`.
macro_rules! value_conversions {
    ($ty:ty, $variant:ident, $label:literal) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        }

        impl From<Option<$ty>> for Value {
            fn from(v: Option<$ty>) -> Self {
                v.map(Value::from).unwrap_or(Value::Null)
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = DbError;

            fn try_from(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(DbError::TypeMismatch(format!(
                        "Expected {}, got {}",
                        $label,
                        other.type_name()
                    ))),
                }
            }
        }

        impl TryFrom<Value> for Option<$ty> {
            type Error = DbError;

            fn try_from(value: Value) -> Result<Self> {
                match value {
                    Value::Null => Ok(None),
                    other => <$ty>::try_from(other).map(Some),
                }
            }
        }
    };
}

value_conversions!(bool, Bool, "bool");
value_conversions!(i64, Int, "int");
value_conversions!(f32, Float, "float");
value_conversions!(f64, Double, "double");
value_conversions!(String, String, "string");
value_conversions!(Vec<u8>, Data, "data");
value_conversions!(DateTime<Utc>, Date, "date");
value_conversions!(Decimal128, Decimal, "decimal128");
value_conversions!(ObjectId, ObjectId, "objectId");
value_conversions!(Uuid, Uuid, "uuid");
value_conversions!(Object, Object, "object");

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i as i64)
    }
}

impl From<Option<i32>> for Value {
    fn from(v: Option<i32>) -> Self {
        v.map(Value::from).unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Option<&str>> for Value {
    fn from(v: Option<&str>) -> Self {
        v.map(Value::from).unwrap_or(Value::Null)
    }
}

impl From<&[u8]> for Value {
    fn from(d: &[u8]) -> Self {
        Self::Data(d.to_vec())
    }
}

impl From<&Object> for Value {
    fn from(obj: &Object) -> Self {
        Self::Object(obj.clone())
    }
}

impl TryFrom<Value> for i32 {
    type Error = DbError;

    fn try_from(value: Value) -> Result<Self> {
        let wide = i64::try_from(value)?;
        i32::try_from(wide)
            .map_err(|_| DbError::TypeMismatch(format!("{} does not fit in a 32-bit int", wide)))
    }
}
