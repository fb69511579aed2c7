#![allow(dead_code)]

use memolist::{
    Connection, DataType, Database, List, Object, ObjectSchema, Property, Schema, Value,
};

pub fn schema() -> Schema {
    Schema::new()
        .class(ObjectSchema::new("StringObject").property(Property::new("stringCol", DataType::String)))
        .class(ObjectSchema::new("IntObject").property(Property::new("intCol", DataType::Int)))
        .class(
            ObjectSchema::new("ArrayPropertyObject")
                .property(Property::new("name", DataType::String))
                .property(Property::list("array", DataType::object("StringObject")))
                .property(Property::list("intArray", DataType::object("IntObject"))),
        )
        .class(ObjectSchema::new("BoolObject").property(Property::new("boolCol", DataType::Bool)))
        .class(
            ObjectSchema::new("AllTypesObject")
                .property(Property::new("boolCol", DataType::Bool))
                .property(Property::new("intCol", DataType::Int).default(123i64))
                .property(Property::new("doubleCol", DataType::Double).default(12.3f64))
                .property(Property::new("stringCol", DataType::String).default("a"))
                .property(Property::new("decimalCol", DataType::Decimal))
                .property(Property::new("objectIdCol", DataType::ObjectId))
                .property(Property::new("objectCol", DataType::object("BoolObject")))
                .property(Property::list("arrayCol", DataType::object("BoolObject"))),
        )
        .class(
            ObjectSchema::new("OptionalObject")
                .property(Property::new("optIntCol", DataType::Int).optional())
                .property(Property::new("optDoubleCol", DataType::Double).optional())
                .property(Property::new("optStringCol", DataType::String).optional())
                .property(Property::new("optDecimalCol", DataType::Decimal).optional())
                .property(Property::new("optObjectIdCol", DataType::ObjectId).optional())
                .property(Property::new("optObjectCol", DataType::object("BoolObject"))),
        )
        .class(
            ObjectSchema::new("ListOfAllTypesObject")
                .property(Property::list("array", DataType::object("AllTypesObject"))),
        )
        .class(
            ObjectSchema::new("ListOfOptionalObject")
                .property(Property::list("array", DataType::object("OptionalObject"))),
        )
        .class(ObjectSchema::new("EmbeddedTreeObject").embedded().property(Property::new("value", DataType::Int)))
        .class(
            ObjectSchema::new("EmbeddedParentObject")
                .property(Property::new("object", DataType::object("EmbeddedTreeObject")))
                .property(Property::list("array", DataType::object("EmbeddedTreeObject"))),
        )
        .class(
            ObjectSchema::new("PrimitiveListObject")
                .property(Property::list("int", DataType::Int))
                .property(Property::list("intOpt", DataType::Int).optional())
                .property(Property::list("double", DataType::Double))
                .property(Property::list("string", DataType::String))
                .property(Property::list("decimal", DataType::Decimal)),
        )
}

pub fn open() -> (Database, Connection) {
    let db = Database::temporary(schema()).unwrap();
    let conn = db.connect().unwrap();
    (db, conn)
}

pub fn unmanaged(db: &Database, class: &str, values: Vec<(&str, Value)>) -> Object {
    Object::with_values(db.schema().get(class).unwrap(), values).unwrap()
}

pub fn string_object(db: &Database, value: &str) -> Object {
    unmanaged(db, "StringObject", vec![("stringCol", Value::from(value))])
}

pub fn string_col(value: &Value) -> String {
    value.as_object().unwrap().get_as::<String>("stringCol").unwrap()
}

/// How the object owning the list under test came to be
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Never added to a database
    Standalone,
    /// Built unmanaged, then added
    NewlyAdded,
    /// Created directly in the database
    NewlyCreated,
    /// Created, then looked up again through a query
    Retrieved,
}

/// An object of `class` in the given mode. Managed modes commit before
/// returning.
pub fn create_owner(db: &Database, conn: &Connection, class: &str, mode: Mode) -> Object {
    let values = || -> Vec<(&'static str, Value)> {
        if class == "ArrayPropertyObject" {
            vec![("name", Value::from("name"))]
        } else {
            Vec::new()
        }
    };
    match mode {
        Mode::Standalone => {
            let object = unmanaged(db, class, values());
            assert!(!object.is_managed());
            object
        }
        Mode::NewlyAdded => {
            let object = unmanaged(db, class, values());
            conn.write(|c| c.add(&object)).unwrap();
            assert!(object.is_managed());
            object
        }
        Mode::NewlyCreated => {
            let object = conn.write(|c| c.create(class, values())).unwrap();
            assert!(object.is_managed());
            object
        }
        Mode::Retrieved => {
            conn.write(|c| c.create(class, values())).unwrap();
            let object = conn
                .objects(class)
                .unwrap()
                .first()
                .unwrap()
                .unwrap()
                .into_object()
                .unwrap();
            assert!(object.is_managed());
            object
        }
    }
}

/// Two managed string objects plus a list of them in the given mode, with a
/// write transaction left open. Dropping the fixture commits it.
pub struct Fixture {
    pub db: Database,
    pub conn: Connection,
    pub str1: Object,
    pub str2: Object,
    pub array_object: Object,
    pub array: List,
}

impl Fixture {
    pub fn new(mode: Mode) -> Self {
        let (db, conn) = open();
        let str1 = string_object(&db, "1");
        let str2 = string_object(&db, "2");

        let array_object = create_owner(&db, &conn, "ArrayPropertyObject", mode);
        let array = array_object.list("array").unwrap();

        conn.write(|c| {
            c.add(&str1)?;
            c.add(&str2)
        })
        .unwrap();

        conn.begin_write().unwrap();
        Self {
            db,
            conn,
            str1,
            str2,
            array_object,
            array,
        }
    }

    pub fn is_managed(&self) -> bool {
        self.array_object.is_managed()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if self.conn.is_in_write_transaction() {
            let _ = self.conn.commit_write();
        }
    }
}

/// A list of embedded objects in the given mode, bare when standalone.
pub fn create_embedded_list(db: &Database, conn: &Connection, mode: Mode) -> List {
    match mode {
        Mode::Standalone => List::new(memolist::ElementType::object("EmbeddedTreeObject")),
        mode => create_owner(db, conn, "EmbeddedParentObject", mode)
            .list("array")
            .unwrap(),
    }
}

pub fn embedded(db: &Database, value: i64) -> Object {
    unmanaged(db, "EmbeddedTreeObject", vec![("value", Value::Int(value))])
}
