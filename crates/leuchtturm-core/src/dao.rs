//! Persistence collaborator boundary.
//!
//! Resolvers never talk to storage directly. Each registered model is bound to
//! a [`Dao`] value, and relationship side effects go through the
//! [`Relationship`] handles it hands out.

use serde_json::Value;

use crate::error::DaoError;
use crate::types::{ModelId, Record};

pub trait Dao: Send + Sync {
    /// Persist a new record built from `fields` and return it with its id.
    fn create(&self, fields: &Record) -> Result<Record, DaoError>;

    /// Fails with [`DaoError::NotFound`] when no record has this id.
    fn get(&self, id: i64) -> Result<Record, DaoError>;

    fn all(&self) -> Result<Vec<Record>, DaoError>;

    /// Write back a changed record. Returns whether the backend reported success.
    fn update(&self, record: &Record) -> Result<bool, DaoError>;

    fn delete(&self, record: &Record) -> Result<bool, DaoError>;

    /// Relationship handle for the relation `field` of `record`.
    fn relationship<'a>(
        &'a self,
        record: &Record,
        field: &str,
    ) -> Result<Box<dyn Relationship + 'a>, DaoError>;

    /// `UPDATE ... SET changes WHERE column = value`. Returns the affected row count.
    fn update_where(&self, column: &str, value: &Value, changes: &Record)
        -> Result<u64, DaoError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    OneToOne,
    ManyToOne,
    /// Target rows carry a foreign key to the owner.
    OneToMany,
    /// Rows are linked through a pivot table.
    ManyToMany,
}

pub trait Relationship {
    fn kind(&self) -> RelationshipKind;

    /// Point `related`'s foreign key at the owner.
    fn associate(&self, related: &Record) -> Result<(), DaoError>;

    /// Add a pivot row linking the owner and `related`.
    fn attach(&self, related: &Record) -> Result<(), DaoError>;

    /// Remove every pivot row of the owner.
    fn detach(&self) -> Result<(), DaoError>;

    /// The related records.
    fn get(&self) -> Result<Vec<Record>, DaoError>;
}

/// A [`Dao`] with no storage behind it. Every call fails with
/// [`DaoError::Detached`], which is enough to derive a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached(pub ModelId);

impl Detached {
    fn fail<T>(&self) -> Result<T, DaoError> {
        Err(DaoError::Detached(self.0.clone()))
    }
}

impl Dao for Detached {
    fn create(&self, _fields: &Record) -> Result<Record, DaoError> {
        self.fail()
    }

    fn get(&self, _id: i64) -> Result<Record, DaoError> {
        self.fail()
    }

    fn all(&self) -> Result<Vec<Record>, DaoError> {
        self.fail()
    }

    fn update(&self, _record: &Record) -> Result<bool, DaoError> {
        self.fail()
    }

    fn delete(&self, _record: &Record) -> Result<bool, DaoError> {
        self.fail()
    }

    fn relationship<'a>(
        &'a self,
        _record: &Record,
        _field: &str,
    ) -> Result<Box<dyn Relationship + 'a>, DaoError> {
        self.fail()
    }

    fn update_where(
        &self,
        _column: &str,
        _value: &Value,
        _changes: &Record,
    ) -> Result<u64, DaoError> {
        self.fail()
    }
}

/// The integer id of a record, if it has one.
pub fn record_id(record: &Record) -> Option<i64> {
    record.get(crate::catalogs::ID_FIELD).and_then(Value::as_i64)
}
