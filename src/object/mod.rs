// ============================================================================
// Objects
// ============================================================================
//
// An Object is a shared handle. Unmanaged objects keep their property values
// in memory; managed objects are a connection plus the key of a stored row,
// and read through the connection on every access. Adding an unmanaged
// object to a database turns the same instance (and every handle cloned
// from it) into a managed one.
//
// ============================================================================

pub mod ownership;

use crate::connection::Connection;
use crate::core::{DbError, ObjectSchema, Result, Value};
use crate::list::{KeyPath, List, ManagedList, PropertySource};
use crate::storage::{Cell, ObjectKey, Owner, StorageEngine};
use crate::transaction::Change;
use ownership::{AdoptionPlan, SlotKind};
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

struct ObjectInner {
    schema: Arc<ObjectSchema>,
    state: Mutex<ObjectState>,
}

enum ObjectState {
    Unmanaged(Vec<UnmanagedField>),
    Managed(ManagedRef),
}

/// Where a managed object lives
#[derive(Clone)]
pub(crate) struct ManagedRef {
    pub conn: Connection,
    pub key: ObjectKey,
}

#[derive(Clone)]
pub(crate) enum UnmanagedField {
    Value(Value),
    List(List),
}

impl Object {
    /// A new unmanaged object with every property at its initial value.
    pub fn new(schema: &Arc<ObjectSchema>) -> Self {
        let fields = schema
            .properties()
            .iter()
            .map(|property| {
                if property.is_list() {
                    UnmanagedField::List(List::new(property.element_type()))
                } else {
                    UnmanagedField::Value(property.initial_value())
                }
            })
            .collect();
        Self::from_state(Arc::clone(schema), ObjectState::Unmanaged(fields))
    }

    /// A new unmanaged object with the given single-valued properties set.
    pub fn with_values<'a>(
        schema: &Arc<ObjectSchema>,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Self> {
        let object = Self::new(schema);
        for (name, value) in values {
            object.set(name, value)?;
        }
        Ok(object)
    }

    pub(crate) fn managed(conn: Connection, key: ObjectKey, schema: Arc<ObjectSchema>) -> Self {
        Self::from_state(schema, ObjectState::Managed(ManagedRef { conn, key }))
    }

    fn from_state(schema: Arc<ObjectSchema>, state: ObjectState) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                schema,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.inner.schema
    }

    pub fn class_name(&self) -> &str {
        self.inner.schema.name()
    }

    pub fn is_embedded(&self) -> bool {
        self.inner.schema.is_embedded()
    }

    pub fn is_managed(&self) -> bool {
        matches!(self.managed_ref(), Ok(Some(_)))
    }

    /// The connection managing this object
    pub fn connection(&self) -> Option<Connection> {
        self.managed_ref().ok().flatten().map(|r| r.conn)
    }

    /// True once the stored object was deleted, its adding transaction was
    /// cancelled, or its connection was closed. Unmanaged objects are never
    /// invalidated.
    pub fn is_invalidated(&self) -> bool {
        match self.managed_ref() {
            Ok(Some(r)) => r.conn.is_stale(r.key),
            Ok(None) => false,
            Err(_) => true,
        }
    }

    /// Whether both handles refer to the same object: the same instance
    /// while unmanaged, the same stored row through the same connection once
    /// managed.
    pub fn is_same_object(&self, other: &Object) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        match (self.managed_ref(), other.managed_ref()) {
            (Ok(Some(a)), Ok(Some(b))) => a.key == b.key && Connection::ptr_eq(&a.conn, &b.conn),
            _ => false,
        }
    }

    pub(crate) fn ptr_eq(a: &Object, b: &Object) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn managed_ref(&self) -> Result<Option<ManagedRef>> {
        Ok(match &*self.inner.state.lock()? {
            ObjectState::Managed(r) => Some(r.clone()),
            ObjectState::Unmanaged(_) => None,
        })
    }

    pub(crate) fn unmanaged_fields(&self) -> Result<Option<Vec<UnmanagedField>>> {
        Ok(match &*self.inner.state.lock()? {
            ObjectState::Unmanaged(fields) => Some(fields.clone()),
            ObjectState::Managed(_) => None,
        })
    }

    pub(crate) fn attach(&self, conn: Connection, key: ObjectKey) -> Result<()> {
        *self.inner.state.lock()? = ObjectState::Managed(ManagedRef { conn, key });
        Ok(())
    }

    // ========================================================================
    // Property access
    // ========================================================================

    /// Value of a single-valued property
    pub fn get(&self, property: &str) -> Result<Value> {
        let index = self.inner.schema.property_index(property)?;
        match self.managed_ref()? {
            Some(r) => r
                .conn
                .read(|store| r.conn.materialize(store, store.get_value(r.key, index)?)),
            None => match self.unmanaged_field(index)? {
                UnmanagedField::Value(value) => Ok(value),
                UnmanagedField::List(_) => Err(self.is_a_list(property)),
            },
        }
    }

    /// Typed value of a single-valued property
    pub fn get_as<T>(&self, property: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = DbError>,
    {
        T::try_from(self.get(property)?)
    }

    /// Follow a dotted key path such as `"objectCol.boolCol"`. A null link
    /// along the way yields null.
    pub fn get_path(&self, path: &str) -> Result<Value> {
        let path = KeyPath::parse(path)?;
        let mut values = self.values_at(&path)?;
        if values.len() != 1 {
            return Err(DbError::InvalidKeyPath(format!(
                "'{}' passes through a list; use a list accessor instead",
                path
            )));
        }
        Ok(values.remove(0))
    }

    /// Set a single-valued property. On a managed object this requires a
    /// write transaction; an embedded object previously held by the
    /// property is deleted.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let index = self.inner.schema.property_index(property)?;
        let prop = &self.inner.schema.properties()[index];
        if prop.is_list() {
            return Err(self.is_a_list(property));
        }

        match self.managed_ref()? {
            Some(r) => {
                let plan = r.conn.mutate(|store, changes| {
                    let mut plan = AdoptionPlan::default();
                    let slot = Owner {
                        parent: r.key,
                        property: index,
                    };
                    let cell = ownership::adopt_value(
                        store,
                        &r.conn,
                        value,
                        &prop.element_type(),
                        slot,
                        SlotKind::Property,
                        &mut plan,
                        changes,
                    )?;
                    let old = store.set_value(r.key, index, cell)?;
                    store.release(&old)?;
                    changes.push(Change::SetValue {
                        key: r.key,
                        property: index,
                    });
                    Ok(plan)
                })?;
                plan.apply(&r.conn)
            }
            None => {
                let value = prop.validate(value)?;
                if let Value::Object(obj) = &value {
                    ownership::check_unmanaged_slot(obj, SlotKind::Property)?;
                }
                self.store_unmanaged(index, value)
            }
        }
    }

    /// Store an already validated value. The object may have been adopted
    /// since it was checked; the value is then refused, never dropped.
    fn store_unmanaged(&self, index: usize, value: Value) -> Result<()> {
        match &mut *self.inner.state.lock()? {
            ObjectState::Unmanaged(fields) => {
                fields[index] = UnmanagedField::Value(value);
                Ok(())
            }
            ObjectState::Managed(_) => Err(DbError::IllegalState(
                "Object became managed while being set; set it again inside a write transaction"
                    .into(),
            )),
        }
    }

    /// The list stored under `property`. Unmanaged objects hand out the same
    /// list every time; managed objects hand out a new accessor over the
    /// same stored list.
    pub fn list(&self, property: &str) -> Result<List> {
        let index = self.inner.schema.property_index(property)?;
        match self.managed_ref()? {
            Some(r) => {
                let handle = r.conn.read(|store| store.open_collection(r.key, index))?;
                Ok(List::from_managed(ManagedList::new(
                    r.conn, r.key, index, handle.element,
                )))
            }
            None => match self.unmanaged_field(index)? {
                UnmanagedField::List(list) => Ok(list),
                UnmanagedField::Value(_) => Err(DbError::TypeMismatch(format!(
                    "Property '{}' of '{}' is not a list",
                    property,
                    self.class_name()
                ))),
            },
        }
    }

    fn unmanaged_field(&self, index: usize) -> Result<UnmanagedField> {
        match &*self.inner.state.lock()? {
            ObjectState::Unmanaged(fields) => Ok(fields[index].clone()),
            ObjectState::Managed(_) => Err(DbError::IllegalState(
                "Object became managed during access".into(),
            )),
        }
    }

    fn is_a_list(&self, property: &str) -> DbError {
        DbError::TypeMismatch(format!(
            "Property '{}' of '{}' is a list; use list() to access it",
            property,
            self.class_name()
        ))
    }
}

impl PropertySource for Object {
    fn values_at(&self, path: &KeyPath) -> Result<Vec<Value>> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(vec![Value::Object(self.clone())]);
        };

        if let Some(r) = self.managed_ref()? {
            return r.conn.read(|store| {
                store
                    .resolve_path(&Cell::Link(r.key), path.segments())?
                    .into_iter()
                    .map(|cell| r.conn.materialize(store, cell))
                    .collect()
            });
        }

        let property = self
            .inner
            .schema
            .get_property(first)
            .ok_or_else(|| DbError::PropertyNotFound(first.to_string(), self.class_name().to_string()))?;
        let heads = if property.is_list() {
            self.list(first)?.values()?
        } else {
            vec![self.get(first)?]
        };

        let mut values = Vec::with_capacity(heads.len());
        for head in heads {
            values.extend(head.values_at(&rest)?);
        }
        Ok(values)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_object(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.managed_ref().ok().flatten().map(|r| r.key);
        f.debug_struct("Object")
            .field("class", &self.class_name())
            .field("key", &key)
            .finish()
    }
}

/// `Class { prop = value; ... }`, with linked objects shown by class name
impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalidated() {
            return write!(f, "[invalid object]");
        }
        write!(f, "{} {{", self.class_name())?;
        for property in self.inner.schema.properties() {
            write!(f, " {} = ", property.name)?;
            if property.is_list() {
                match self.list(&property.name).and_then(|list| list.count()) {
                    Ok(count) => write!(f, "List<{}>({})", property.element_type(), count)?,
                    Err(_) => write!(f, "<unavailable>")?,
                }
            } else {
                match self.get(&property.name) {
                    Ok(Value::Object(obj)) => write!(f, "<{}>", obj.class_name())?,
                    Ok(value) => write!(f, "{}", value)?,
                    Err(_) => write!(f, "<unavailable>")?,
                }
            }
            write!(f, ";")?;
        }
        write!(f, " }}")
    }
}
