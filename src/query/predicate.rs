use super::pattern::{eval_like, escape_like};
use crate::core::{DbError, Result, Value};
use crate::list::{KeyPath, PropertySource};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// `value OP operand`. Nulls are only equal to nulls and never ordered.
    fn apply(self, value: &Value, operand: &Value) -> Result<bool> {
        match self {
            CompareOp::Eq => Ok(value == operand),
            CompareOp::Ne => Ok(value != operand),
            _ if value.is_null() || operand.is_null() => Ok(false),
            op => {
                let order = value.compare(operand)?;
                Ok(match op {
                    CompareOp::Lt => order == Ordering::Less,
                    CompareOp::Le => order != Ordering::Greater,
                    CompareOp::Gt => order == Ordering::Greater,
                    _ => order != Ordering::Less,
                })
            }
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{}", symbol)
    }
}

/// Filter over list elements or objects.
///
/// A key path that passes through a list yields several values; a leaf
/// condition holds if it holds for any of them.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        path: KeyPath,
        op: CompareOp,
        value: Value,
    },
    Like {
        path: KeyPath,
        pattern: String,
        case_insensitive: bool,
    },
    Between {
        path: KeyPath,
        low: Value,
        high: Value,
    },
    In {
        path: KeyPath,
        values: Vec<Value>,
    },
    IsNull {
        path: KeyPath,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Parse a predicate such as `"self == 7"` or
    /// `"stringCol LIKE[c] 'a%' AND intCol > 3"`.
    pub fn parse(text: &str) -> Result<Self> {
        super::parser::parse(text)
    }

    pub fn compare(path: &str, op: CompareOp, value: impl Into<Value>) -> Result<Self> {
        Ok(Predicate::Compare {
            path: KeyPath::parse(path)?,
            op,
            value: value.into(),
        })
    }

    pub fn eq(path: &str, value: impl Into<Value>) -> Result<Self> {
        Self::compare(path, CompareOp::Eq, value)
    }

    pub fn like(path: &str, pattern: &str, case_insensitive: bool) -> Result<Self> {
        Ok(Predicate::Like {
            path: KeyPath::parse(path)?,
            pattern: pattern.to_string(),
            case_insensitive,
        })
    }

    /// Strings starting with `prefix`
    pub fn begins_with(path: &str, prefix: &str, case_insensitive: bool) -> Result<Self> {
        Self::like(path, &format!("{}%", escape_like(prefix)), case_insensitive)
    }

    pub fn contains_text(path: &str, needle: &str, case_insensitive: bool) -> Result<Self> {
        Self::like(path, &format!("%{}%", escape_like(needle)), case_insensitive)
    }

    pub fn between(path: &str, low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        Ok(Predicate::Between {
            path: KeyPath::parse(path)?,
            low: low.into(),
            high: high.into(),
        })
    }

    pub fn is_in<V: Into<Value>>(path: &str, values: impl IntoIterator<Item = V>) -> Result<Self> {
        Ok(Predicate::In {
            path: KeyPath::parse(path)?,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn is_null(path: &str) -> Result<Self> {
        Ok(Predicate::IsNull {
            path: KeyPath::parse(path)?,
        })
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluate against one element or object
    pub fn evaluate(&self, source: &dyn PropertySource) -> Result<bool> {
        match self {
            Predicate::Compare { path, op, value } => {
                any(source, path, |v| op.apply(v, value))
            }
            Predicate::Like {
                path,
                pattern,
                case_insensitive,
            } => any(source, path, |v| match v {
                Value::Null => Ok(false),
                Value::String(text) => eval_like(text, pattern, !case_insensitive),
                other => Err(DbError::TypeMismatch(format!(
                    "LIKE needs a string, '{}' is a {}",
                    path,
                    other.type_name()
                ))),
            }),
            Predicate::Between { path, low, high } => any(source, path, |v| {
                Ok(CompareOp::Ge.apply(v, low)? && CompareOp::Le.apply(v, high)?)
            }),
            Predicate::In { path, values } => any(source, path, |v| Ok(values.contains(v))),
            Predicate::IsNull { path } => any(source, path, |v| Ok(v.is_null())),
            Predicate::And(a, b) => Ok(a.evaluate(source)? && b.evaluate(source)?),
            Predicate::Or(a, b) => Ok(a.evaluate(source)? || b.evaluate(source)?),
            Predicate::Not(inner) => Ok(!inner.evaluate(source)?),
        }
    }
}

fn any(
    source: &dyn PropertySource,
    path: &KeyPath,
    mut test: impl FnMut(&Value) -> Result<bool>,
) -> Result<bool> {
    for value in source.values_at(path)? {
        if test(&value)? {
            return Ok(true);
        }
    }
    Ok(false)
}

impl std::str::FromStr for Predicate {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { path, op, value } => write!(f, "{} {} {}", path, op, literal(value)),
            Predicate::Like {
                path,
                pattern,
                case_insensitive,
            } => {
                let flag = if *case_insensitive { "[c]" } else { "" };
                write!(f, "{} LIKE{} {}", path, flag, quote(pattern))
            }
            Predicate::Between { path, low, high } => {
                write!(f, "{} BETWEEN {{{}, {}}}", path, literal(low), literal(high))
            }
            Predicate::In { path, values } => {
                let items: Vec<String> = values.iter().map(literal).collect();
                write!(f, "{} IN {{{}}}", path, items.join(", "))
            }
            Predicate::IsNull { path } => write!(f, "{} == NULL", path),
            Predicate::And(a, b) => write!(f, "({} AND {})", a, b),
            Predicate::Or(a, b) => write!(f, "({} OR {})", a, b),
            Predicate::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => quote(s),
        other => other.to_string(),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}
