//! Storage trait definitions and filter types.

use crate::error::Result;
use serde::{Serialize, de::DeserializeOwned};

/// Filter operations for querying records.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals value
    Eq,
    /// Field does not equal value
    Ne,
}

/// A filter for querying records.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Field name to filter on
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
    /// Value to compare against
    pub value: serde_json::Value,
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Ne,
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Matches records that have not been soft-deleted.
    pub fn live() -> Self {
        Self::eq("deleted_at", serde_json::Value::Null)
    }

    /// Check if a record matches this filter.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        let field_value = record.get(&self.field);

        match &self.op {
            FilterOp::Eq => match field_value {
                Some(v) => *v == self.value,
                None => self.value.is_null(),
            },
            FilterOp::Ne => match field_value {
                Some(v) => *v != self.value,
                None => !self.value.is_null(),
            },
        }
    }
}

/// Trait for records with a store-assigned numeric ID.
pub trait HasId {
    /// Get the record's unique identifier.
    fn id(&self) -> u64;

    /// Set the identifier assigned on insert.
    fn set_id(&mut self, id: u64);
}

/// Storage trait for record persistence.
pub trait Storage: Send + Sync {
    /// Insert a new record, assigning the next free ID.
    fn insert<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, record: &mut T) -> Result<u64>;

    /// Insert several records as one write; either all land or none do.
    fn insert_many<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, records: &mut [T]) -> Result<()>;

    /// Insert `record` unless a stored record matches every filter in
    /// `conflict`, checking and writing as one step.
    ///
    /// Returns `Ok(None)` on a conflict. An empty `conflict` never conflicts.
    fn insert_unless<T: Serialize + DeserializeOwned + HasId>(
        &self,
        collection: &str,
        record: &mut T,
        conflict: &[Filter],
    ) -> Result<Option<u64>>;

    /// Get a record by ID.
    fn get<T: DeserializeOwned>(&self, collection: &str, id: u64) -> Result<Option<T>>;

    /// Replace an existing record.
    fn update<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, id: u64, record: &T) -> Result<()>;

    /// Merge `changes` into the record with `id`, only if every filter in
    /// `expected` matches the stored record at write time.
    ///
    /// Returns `Ok(false)` when the record exists but the condition failed.
    /// `updated_at` is refreshed on success.
    fn patch(
        &self,
        collection: &str,
        id: u64,
        expected: &[Filter],
        changes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool>;

    /// Query records with filters.
    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>>;

    /// List all records in a collection.
    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>>;
}
