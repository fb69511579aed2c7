mod common;

use common::*;
use memolist::{CompareOp, Decimal128, List, Predicate, Value};

/// Ten objects with intCol 0..10, stringCol "s0".."s9", in a managed list
fn populated(conn: &memolist::Connection, db: &memolist::Database) -> List {
    let holder = unmanaged(db, "ListOfAllTypesObject", Vec::new());
    let array = holder.list("array").unwrap();
    for i in 0..10i64 {
        let flag = unmanaged(db, "BoolObject", vec![("boolCol", Value::Bool(i % 2 == 0))]);
        array
            .append(unmanaged(
                db,
                "AllTypesObject",
                vec![
                    ("intCol", Value::Int(i)),
                    ("doubleCol", Value::Double(i as f64 / 2.0)),
                    ("stringCol", Value::from(format!("s{}", i).as_str())),
                    ("decimalCol", Value::Decimal(Decimal128::new(i as i128, -1).unwrap())),
                    ("objectCol", Value::from(flag)),
                ],
            ))
            .unwrap();
    }
    conn.write(|c| c.add(&holder)).unwrap();
    array
}

#[test]
fn test_index_matching_on_objects() {
    let (db, conn) = open();
    let array = populated(&conn, &db);

    let find = |text: &str| array.index_matching(&Predicate::parse(text).unwrap()).unwrap();
    assert_eq!(find("intCol == 4"), Some(4));
    assert_eq!(find("intCol > 4 AND objectCol.boolCol == true"), Some(6));
    assert_eq!(find("stringCol ENDSWITH '7'"), Some(7));
    assert_eq!(find("stringCol LIKE[c] 'S_'"), Some(0));
    assert_eq!(find("doubleCol BETWEEN {2.2, 3}"), Some(5));
    assert_eq!(find("intCol IN {42, 8}"), Some(8));
    assert_eq!(find("NOT intCol < 9"), Some(9));
    assert_eq!(find("intCol == 99"), None);

    // The same predicates work on an unmanaged list
    let unmanaged_holder = unmanaged(&db, "ListOfAllTypesObject", Vec::new());
    let unmanaged_array = unmanaged_holder.list("array").unwrap();
    unmanaged_array
        .append(unmanaged(&db, "AllTypesObject", vec![("intCol", Value::Int(4))]))
        .unwrap();
    assert_eq!(
        unmanaged_array
            .index_matching(&Predicate::eq("intCol", 4).unwrap())
            .unwrap(),
        Some(0)
    );
}

#[test]
fn test_predicate_type_errors() {
    let (db, conn) = open();
    let array = populated(&conn, &db);
    let err = array
        .index_matching(&Predicate::parse("stringCol > 3").unwrap())
        .unwrap_err();
    assert!(err.is_type_mismatch());
    assert!(array
        .index_matching(&Predicate::parse("missing == 3").unwrap())
        .is_err());
}

#[test]
fn test_property_aggregates() {
    let (db, conn) = open();
    let array = populated(&conn, &db);

    assert_eq!(array.min_of("intCol").unwrap(), Some(Value::Int(0)));
    assert_eq!(array.max_of("intCol").unwrap(), Some(Value::Int(9)));
    assert_eq!(array.sum_of("intCol").unwrap(), Value::Int(45));
    assert_eq!(array.average_of("intCol").unwrap(), Some(Value::Double(4.5)));
    assert_eq!(array.sum_of("doubleCol").unwrap(), Value::Double(22.5));
    assert_eq!(
        array.sum_of("decimalCol").unwrap(),
        Value::Decimal(Decimal128::new(45, -1).unwrap())
    );
    assert_eq!(array.max_of("stringCol").unwrap(), Some(Value::from("s9")));

    assert!(array.sum_of("stringCol").unwrap_err().is_type_mismatch());
    assert!(array.sum_of("arrayCol").unwrap_err().is_type_mismatch());
    assert!(array.min().unwrap_err().is_type_mismatch());
}

#[test]
fn test_aggregates_on_empty_lists() {
    let (db, conn) = open();
    let holder = conn
        .write(|c| c.create("ListOfAllTypesObject", Vec::new()))
        .unwrap();
    let array = holder.list("array").unwrap();
    assert_eq!(array.min_of("intCol").unwrap(), None);
    assert_eq!(array.sum_of("intCol").unwrap(), Value::Int(0));
    assert_eq!(array.sum_of("doubleCol").unwrap(), Value::Double(0.0));
    assert_eq!(array.average_of("intCol").unwrap(), None);

    let primitives = unmanaged(&db, "PrimitiveListObject", Vec::new());
    let decimals = primitives.list("decimal").unwrap();
    assert_eq!(decimals.sum().unwrap(), Value::Decimal(Decimal128::ZERO));
    assert_eq!(decimals.average().unwrap(), None);
}

#[test]
fn test_primitive_aggregates_skip_nulls() {
    let (db, _conn) = open();
    let obj = unmanaged(&db, "PrimitiveListObject", Vec::new());
    let opt = obj.list("intOpt").unwrap();
    opt.append_all([Some(3), None, Some(1), None, Some(8)]).unwrap();

    assert_eq!(opt.min().unwrap(), Some(Value::Int(1)));
    assert_eq!(opt.max().unwrap(), Some(Value::Int(8)));
    assert_eq!(opt.sum().unwrap(), Value::Int(12));
    assert_eq!(opt.average().unwrap(), Some(Value::Double(4.0)));
    assert_eq!(opt.index_of(Value::Null).unwrap(), Some(1));

    let sorted = opt.sorted(true).unwrap();
    assert_eq!(
        sorted,
        vec![Value::Null, Value::Null, Value::Int(1), Value::Int(3), Value::Int(8)]
    );
    let sorted = opt.sorted(false).unwrap();
    assert_eq!(sorted[0], Value::Int(8));
    assert!(sorted[4].is_null());
}

#[test]
fn test_sorted_by_property() {
    let (db, conn) = open();
    let array = populated(&conn, &db);
    conn.write(|_| array.move_item(0, 9)).unwrap();

    let ascending = array.sorted_by("intCol", true).unwrap();
    let ints: Vec<Value> = ascending
        .iter()
        .map(|v| v.as_object().unwrap().get("intCol").unwrap())
        .collect();
    assert_eq!(ints, (0..10).map(Value::Int).collect::<Vec<_>>());

    let descending = array.sorted_by("stringCol", false).unwrap();
    assert_eq!(string_col(&descending[0]), "s9");
    // Sorting never reorders the list itself
    assert_eq!(array.get(9).unwrap().as_object().unwrap().get("intCol").unwrap(), Value::Int(0));
}

#[test]
fn test_results_filtering() {
    let (db, conn) = open();
    populated(&conn, &db);

    let all = conn.objects("AllTypesObject").unwrap();
    assert_eq!(all.count().unwrap(), 10);
    let even = all.filter(Predicate::eq("objectCol.boolCol", true).unwrap());
    assert_eq!(even.count().unwrap(), 5);
    let big_even = even.filter(Predicate::compare("intCol", CompareOp::Ge, 6).unwrap());
    assert_eq!(
        big_even.value_for_key_path("intCol").unwrap(),
        vec![Value::Int(6), Value::Int(8)]
    );
    assert_eq!(big_even.to_string(), "Results<AllTypesObject>(2)");

    // Results are live
    let extra = all.get(1).unwrap().into_object().unwrap();
    conn.write(|c| c.delete(&extra)).unwrap();
    assert_eq!(all.count().unwrap(), 9);

    // Embedded classes cannot be queried directly
    assert!(conn.objects("EmbeddedTreeObject").unwrap_err().is_illegal_state());
}

#[test]
fn test_key_path_collections() {
    let (db, conn) = open();
    let array = populated(&conn, &db);

    let flags = array.value_for_key_path("objectCol.boolCol").unwrap();
    assert_eq!(flags.len(), 10);
    assert_eq!(flags[0], Value::Bool(true));
    assert_eq!(array.value_for_key_path("self").unwrap(), array.values().unwrap());

    let nested = array.lists_for_key_path("arrayCol").unwrap();
    assert_eq!(nested.len(), 10);
    assert!(nested.iter().all(|l| l.is_managed() && l.is_empty().unwrap()));

    assert!(array.value_for_key_path("objectCol..boolCol").is_err());
    assert!(array.lists_for_key_path("intCol").is_err());
}

#[test]
fn test_decimal_extremes_in_aggregates() {
    let (db, conn) = open();
    assert!("1e2147483647".parse::<Decimal128>().unwrap_err().is_type_mismatch());
    assert!("1e-2147483647".parse::<Decimal128>().unwrap_err().is_type_mismatch());

    let big: Decimal128 = "1e6111".parse().unwrap();
    let tiny: Decimal128 = "1e-6176".parse().unwrap();
    let holder = unmanaged(&db, "PrimitiveListObject", Vec::new());
    conn.write(|c| c.add(&holder)).unwrap();
    let decimals = holder.list("decimal").unwrap();
    conn.write(|_| decimals.append_all([big, tiny])).unwrap();

    assert_eq!(decimals.max().unwrap(), Some(Value::Decimal(big)));
    assert_eq!(decimals.min().unwrap(), Some(Value::Decimal(tiny)));
    assert_eq!(
        decimals.sorted(false).unwrap(),
        vec![Value::Decimal(big), Value::Decimal(tiny)]
    );
    assert!(decimals.sum().unwrap_err().is_out_of_range());
    assert!(decimals.average().unwrap_err().is_out_of_range());
    assert_eq!(decimals.index_of(tiny).unwrap(), Some(1));
}
