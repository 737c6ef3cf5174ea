//! Backing stores that sessions flush into.
//!
//! # Responsibility
//! - Define the document-level contract a session needs: query, count and an
//!   atomic change-set apply.
//! - Provide an in-memory store for tests and a SQLite store for durability.
//!
//! # Invariants
//! - `apply` is all-or-nothing: on error no change of the set is visible.
//! - Identifiers are unique per collection and assigned at insert time.

pub mod memory;
pub mod sqlite;

use crate::db::DbError;
use crate::model::entity::{EntityId, PropertyMap};
use crate::query::QueryBuilder;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("`{entity}` document {id} already exists")]
    Conflict { entity: &'static str, id: EntityId },
    #[error("`{entity}` document {id} does not exist")]
    Missing { entity: &'static str, id: EntityId },
    #[error("no identifier left after {last_id} for `{entity}`")]
    IdsExhausted { entity: &'static str, last_id: EntityId },
    #[error("invalid field name or alias `{0}`")]
    InvalidField(String),
    #[error("unsupported filter value for `{field}`: {value}")]
    UnsupportedValue {
        field: String,
        value: serde_json::Value,
    },
    #[error("invalid stored document data: {0}")]
    InvalidData(String),
    #[error("connection schema version {actual_version} does not match expected {expected_version}")]
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    #[error("required table `{0}` is missing")]
    MissingRequiredTable(&'static str),
    #[error("required column `{table}.{column}` is missing")]
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// A stored entity: identifier plus serialized body (without `id`).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: EntityId,
    pub body: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingInsert {
    pub entity: &'static str,
    /// Caller-provided identifier; `None` lets the store assign the next one.
    pub id: Option<EntityId>,
    pub body: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub entity: &'static str,
    pub id: EntityId,
    pub body: PropertyMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDelete {
    pub entity: &'static str,
    pub id: EntityId,
}

/// Writes computed by one flush, applied by the store in one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub inserts: Vec<PendingInsert>,
    pub updates: Vec<PendingUpdate>,
    pub deletes: Vec<PendingDelete>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Document storage contract used by [`crate::session::UnitOfWorkSession`].
pub trait DocumentStore {
    /// Returns the documents matching `query`, ordered and paginated.
    fn query(&self, query: &QueryBuilder) -> StoreResult<Vec<Document>>;

    /// Counts the documents matching `query`, ignoring limit and offset.
    fn count(&self, query: &QueryBuilder) -> StoreResult<u64>;

    /// Applies `changes` atomically and returns the identifiers of
    /// `changes.inserts`, in order.
    fn apply(&self, changes: &ChangeSet) -> StoreResult<Vec<EntityId>>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn query(&self, query: &QueryBuilder) -> StoreResult<Vec<Document>> {
        (**self).query(query)
    }

    fn count(&self, query: &QueryBuilder) -> StoreResult<u64> {
        (**self).count(query)
    }

    fn apply(&self, changes: &ChangeSet) -> StoreResult<Vec<EntityId>> {
        (**self).apply(changes)
    }
}
