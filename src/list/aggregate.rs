use crate::core::{DataType, DbError, Decimal128, Result, Value};
use std::cmp::Ordering;

fn non_null(values: Vec<Value>) -> impl Iterator<Item = Value> {
    values.into_iter().filter(|v| !v.is_null())
}

fn not_numeric(value: &Value) -> DbError {
    DbError::TypeMismatch(format!("Cannot sum or average a {} value", value.type_name()))
}

pub(crate) fn orderable(data_type: &DataType) -> Result<()> {
    if data_type.is_orderable() {
        return Ok(());
    }
    Err(DbError::TypeMismatch(format!("Values of type {} have no order", data_type)))
}

pub(crate) fn summable(data_type: &DataType) -> Result<()> {
    if data_type.is_summable() {
        return Ok(());
    }
    Err(DbError::TypeMismatch(format!("Cannot sum or average values of type {}", data_type)))
}

/// Smallest (`wanted == Less`) or largest (`wanted == Greater`) non-null value
pub(crate) fn extreme(values: Vec<Value>, wanted: Ordering) -> Result<Option<Value>> {
    let mut best: Option<Value> = None;
    for value in non_null(values) {
        if let Value::Object(object) = &value {
            return Err(DbError::TypeMismatch(format!(
                "Objects of type '{}' have no order; aggregate one of their properties",
                object.class_name()
            )));
        }
        best = match best {
            Some(current) if value.compare(&current)? != wanted => Some(current),
            _ => Some(value),
        };
    }
    Ok(best)
}

/// Sum of the non-null values; the additive identity of `data_type` when
/// there are none.
pub(crate) fn sum(values: Vec<Value>, data_type: &DataType) -> Result<Value> {
    match data_type {
        DataType::Int => {
            let mut total: i64 = 0;
            for value in non_null(values) {
                let i = value.as_i64().ok_or_else(|| not_numeric(&value))?;
                total = total
                    .checked_add(i)
                    .ok_or_else(|| DbError::OutOfRange("Sum overflows a 64-bit integer".into()))?;
            }
            Ok(Value::Int(total))
        }
        DataType::Float => Ok(Value::Float(float_sum(values)?.0 as f32)),
        DataType::Double => Ok(Value::Double(float_sum(values)?.0)),
        DataType::Decimal => Ok(Value::Decimal(decimal_sum(values)?.0)),
        other => Err(DbError::TypeMismatch(format!("Cannot sum values of type {}", other))),
    }
}

/// Mean of the non-null values: a double, or a decimal for decimal input.
pub(crate) fn average(values: Vec<Value>, data_type: &DataType) -> Result<Option<Value>> {
    match data_type {
        DataType::Int | DataType::Float | DataType::Double => {
            let (total, count) = float_sum(values)?;
            Ok((count > 0).then(|| Value::Double(total / count as f64)))
        }
        DataType::Decimal => {
            let (total, count) = decimal_sum(values)?;
            if count == 0 {
                return Ok(None);
            }
            let mean = i64::try_from(count)
                .ok()
                .and_then(|n| total.checked_div_int(n))
                .ok_or_else(|| DbError::OutOfRange("Decimal average is not representable".into()))?;
            Ok(Some(Value::Decimal(mean)))
        }
        other => Err(DbError::TypeMismatch(format!("Cannot average values of type {}", other))),
    }
}

fn float_sum(values: Vec<Value>) -> Result<(f64, usize)> {
    let mut total = 0.0;
    let mut count = 0;
    for value in non_null(values) {
        total += value.as_f64().ok_or_else(|| not_numeric(&value))?;
        count += 1;
    }
    Ok((total, count))
}

fn decimal_sum(values: Vec<Value>) -> Result<(Decimal128, usize)> {
    let mut total = Decimal128::ZERO;
    let mut count = 0;
    for value in non_null(values) {
        let d = value.as_decimal().ok_or_else(|| not_numeric(&value))?;
        total = total
            .checked_add(&d)
            .ok_or_else(|| DbError::OutOfRange("Decimal sum overflows".into()))?;
        count += 1;
    }
    Ok((total, count))
}

/// Stable sort by `key`. Nulls order before every other value, so they come
/// first ascending and last descending.
pub(crate) fn sort_by_key<T>(
    mut items: Vec<(Value, T)>,
    ascending: bool,
) -> Result<Vec<T>> {
    let mut failure = None;
    items.sort_by(|(a, _), (b, _)| {
        let order = match a.compare(b) {
            Ok(order) => order,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        };
        if ascending { order } else { order.reverse() }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(items.into_iter().map(|(_, item)| item).collect()),
    }
}
