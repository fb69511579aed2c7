// ============================================================================
// Adoption and Embedded Ownership
// ============================================================================
//
// Adding an unmanaged object graph stores every reachable unmanaged object
// inside the running mutation. Handles are only switched to managed once the
// mutation succeeded: the plan collects them, and `apply` runs after the
// connection's working copy is released.
//
// An embedded object belongs to exactly one slot. A managed embedded object
// can never be assigned anywhere, and an unmanaged one can only be adopted
// once per mutation.
//
// ============================================================================

use super::{Object, UnmanagedField};
use crate::connection::Connection;
use crate::core::{DbError, ElementType, Result, Value};
use crate::list::List;
use crate::storage::{Cell, InMemoryStorage, ObjectKey, Owner, StorageEngine};
use crate::transaction::Change;
use std::sync::Arc;

/// Kind of slot a value is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    ListElement,
    Property,
}

impl SlotKind {
    fn embedded_reuse(self) -> DbError {
        DbError::IllegalAssignment(
            match self {
                SlotKind::ListElement => "Cannot add an existing managed embedded object to a List.",
                SlotKind::Property => "Cannot set a link to an existing managed embedded object.",
            }
            .to_string(),
        )
    }
}

/// Handles to switch to managed once a mutation succeeded
#[derive(Default)]
pub(crate) struct AdoptionPlan {
    objects: Vec<(Object, ObjectKey)>,
    lists: Vec<(List, ObjectKey, usize)>,
}

impl AdoptionPlan {
    fn planned_key(&self, object: &Object) -> Option<ObjectKey> {
        self.objects
            .iter()
            .find(|(candidate, _)| Object::ptr_eq(candidate, object))
            .map(|(_, key)| *key)
    }

    pub(crate) fn apply(self, conn: &Connection) -> Result<()> {
        for (object, key) in self.objects {
            object.attach(conn.clone(), key)?;
        }
        for (list, owner, property) in self.lists {
            list.attach(conn.clone(), owner, property)?;
        }
        Ok(())
    }
}

/// Turn `value` into a cell stored in `slot`, adopting unmanaged objects.
#[allow(clippy::too_many_arguments)]
pub(crate) fn adopt_value(
    store: &mut InMemoryStorage,
    conn: &Connection,
    value: Value,
    element: &ElementType,
    slot: Owner,
    kind: SlotKind,
    plan: &mut AdoptionPlan,
    changes: &mut Vec<Change>,
) -> Result<Cell> {
    let object = match element.validate(value)? {
        Value::Object(object) => object,
        scalar => return Cell::scalar(scalar),
    };

    if let Some(managed) = object.managed_ref()? {
        if !Connection::ptr_eq(&managed.conn, conn) {
            return Err(DbError::IllegalAssignment(
                "Cannot link to an object managed by a different connection".into(),
            ));
        }
        if !store.contains(managed.key) {
            return Err(DbError::invalidated("Object"));
        }
        if object.is_embedded() {
            return Err(kind.embedded_reuse());
        }
        return Ok(Cell::Link(managed.key));
    }

    if let Some(key) = plan.planned_key(&object) {
        if object.is_embedded() {
            return Err(kind.embedded_reuse());
        }
        return Ok(Cell::Link(key));
    }

    let owner = object.is_embedded().then_some(slot);
    adopt_object(store, conn, &object, owner, plan, changes).map(Cell::Link)
}

fn adopt_object(
    store: &mut InMemoryStorage,
    conn: &Connection,
    object: &Object,
    owner: Option<Owner>,
    plan: &mut AdoptionPlan,
    changes: &mut Vec<Change>,
) -> Result<ObjectKey> {
    let class = Arc::clone(store.schema().get(object.class_name())?);
    if !Arc::ptr_eq(&class, object.schema()) && *class != **object.schema() {
        return Err(DbError::SchemaError(format!(
            "Object of type '{}' was built from a schema this database does not use",
            object.class_name()
        )));
    }
    let fields = object
        .unmanaged_fields()?
        .ok_or_else(|| DbError::IllegalState("Object is already managed".into()))?;

    let key = store.create_object(&class, owner);
    changes.push(Change::CreateObject {
        class: class.name().to_string(),
        key,
    });
    // Registered before the fields so cycles back to this object link to it
    plan.objects.push((object.clone(), key));

    for (index, (property, field)) in class.properties().iter().zip(fields).enumerate() {
        let slot = Owner {
            parent: key,
            property: index,
        };
        let element = property.element_type();
        match field {
            UnmanagedField::Value(value) => {
                let cell = adopt_value(
                    store,
                    conn,
                    value,
                    &element,
                    slot,
                    SlotKind::Property,
                    plan,
                    changes,
                )?;
                store.set_value(key, index, cell)?;
            }
            UnmanagedField::List(list) => {
                let handle = store.open_collection(key, index)?;
                for (position, value) in list.values()?.into_iter().enumerate() {
                    let cell = adopt_value(
                        store,
                        conn,
                        value,
                        &element,
                        slot,
                        SlotKind::ListElement,
                        plan,
                        changes,
                    )?;
                    store.collection_insert(&handle, position, cell)?;
                }
                plan.lists.push((list, key, index));
            }
        }
    }

    Ok(key)
}

/// Adoption of an object passed to `Connection::add`
pub(crate) fn adopt_top_level(
    store: &mut InMemoryStorage,
    conn: &Connection,
    object: &Object,
    changes: &mut Vec<Change>,
) -> Result<AdoptionPlan> {
    if object.is_embedded() {
        return Err(DbError::IllegalAssignment(format!(
            "Embedded objects of type '{}' cannot be added directly; assign them to their parent",
            object.class_name()
        )));
    }

    let mut plan = AdoptionPlan::default();
    if let Some(managed) = object.managed_ref()? {
        if !Connection::ptr_eq(&managed.conn, conn) {
            return Err(DbError::IllegalAssignment(
                "Object is already managed by a different connection".into(),
            ));
        }
        if !store.contains(managed.key) {
            return Err(DbError::invalidated("Object"));
        }
        return Ok(plan);
    }

    adopt_object(store, conn, object, None, &mut plan, changes)?;
    Ok(plan)
}

/// Key of `object` in `conn`, which must manage it.
pub(crate) fn key_in(object: &Object, conn: &Connection) -> Result<ObjectKey> {
    match object.managed_ref()? {
        Some(managed) if Connection::ptr_eq(&managed.conn, conn) => Ok(managed.key),
        Some(_) => Err(DbError::IllegalState(
            "Object is managed by a different connection".into(),
        )),
        None => Err(DbError::IllegalState(
            "Object is not managed by a database".into(),
        )),
    }
}

/// Unmanaged containers may hold any object except a managed embedded one.
pub(crate) fn check_unmanaged_slot(object: &Object, kind: SlotKind) -> Result<()> {
    if object.is_embedded() && object.is_managed() {
        return Err(kind.embedded_reuse());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, ObjectSchema, Property, Schema};
    use crate::facade::Database;

    fn database() -> Database {
        Database::temporary(
            Schema::new()
                .class(
                    ObjectSchema::new("Parent")
                        .property(Property::new("child", DataType::object("Child")))
                        .property(Property::new("friend", DataType::object("Parent")))
                        .property(Property::list("children", DataType::object("Child"))),
                )
                .class(
                    ObjectSchema::new("Child")
                        .embedded()
                        .property(Property::new("value", DataType::Int)),
                ),
        )
        .unwrap()
    }

    #[test]
    fn test_add_adopts_nested_graph() {
        let conn = database().connect().unwrap();
        let parent = Object::new(&conn.class("Parent").unwrap());
        let child = Object::new(&conn.class("Child").unwrap());
        let listed = Object::new(&conn.class("Child").unwrap());
        parent.set("child", &child).unwrap();
        let children = parent.list("children").unwrap();
        children.append(&listed).unwrap();

        conn.write(|conn| conn.add(&parent)).unwrap();
        assert!(child.is_managed());
        assert!(listed.is_managed());
        assert!(children.is_managed());
        assert!(conn.transaction_info().unwrap().is_none());
    }

    #[test]
    fn test_self_cycle_links_to_same_object() {
        let conn = database().connect().unwrap();
        let parent = Object::new(&conn.class("Parent").unwrap());
        parent.set("friend", &parent).unwrap();

        conn.write(|conn| conn.add(&parent)).unwrap();
        let friend = parent.get("friend").unwrap().into_object().unwrap();
        assert!(friend.is_same_object(&parent));
        assert_eq!(conn.objects("Parent").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_embedded_cannot_be_added_directly() {
        let conn = database().connect().unwrap();
        let child = Object::new(&conn.class("Child").unwrap());
        conn.begin_write().unwrap();
        assert!(conn.add(&child).unwrap_err().is_illegal_assignment());
    }

    #[test]
    fn test_same_unmanaged_embedded_twice_fails_atomically() {
        let conn = database().connect().unwrap();
        let parent = Object::new(&conn.class("Parent").unwrap());
        let child = Object::new(&conn.class("Child").unwrap());
        parent.set("child", &child).unwrap();
        parent.list("children").unwrap().append(&child).unwrap();

        conn.begin_write().unwrap();
        assert!(conn.add(&parent).unwrap_err().is_illegal_assignment());
        assert!(!parent.is_managed());
        assert!(!child.is_managed());
        assert_eq!(conn.objects("Parent").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_managed_embedded_rejected_by_unmanaged_slot() {
        let conn = database().connect().unwrap();
        let parent = Object::new(&conn.class("Parent").unwrap());
        parent
            .set("child", Object::new(&conn.class("Child").unwrap()))
            .unwrap();
        conn.write(|conn| conn.add(&parent)).unwrap();

        let managed_child = parent.get("child").unwrap().into_object().unwrap();
        let other = Object::new(&conn.class("Parent").unwrap());
        assert!(other.set("child", &managed_child).unwrap_err().is_illegal_assignment());
    }

    #[test]
    fn test_key_in_requires_managing_connection() {
        let db = database();
        let conn = db.connect().unwrap();
        let other = db.connect().unwrap();
        let parent = conn.write(|conn| conn.create("Parent", [])).unwrap();

        assert!(key_in(&parent, &conn).is_ok());
        assert!(key_in(&parent, &other).unwrap_err().is_illegal_state());
        let unmanaged = Object::new(&conn.class("Parent").unwrap());
        assert!(key_in(&unmanaged, &conn).unwrap_err().is_illegal_state());
    }
}
