//! Persistence session contract.
//!
//! # Responsibility
//! - Define the seam the façade depends on: lookups, persist/remove requests
//!   and flush.
//! - Hand out shared in-memory handles so one identifier maps to one object.
//!
//! # Invariants
//! - Within one session, every lookup of the same identifier yields the same
//!   `Managed<E>` instance (`Rc::ptr_eq`).
//! - Nothing reaches the backing store before `flush` / `flush_entity`.

mod unit_of_work;

pub use unit_of_work::UnitOfWorkSession;

use crate::model::entity::{Entity, EntityError, EntityId};
use crate::query::{Filter, QueryBuilder};
use crate::store::StoreError;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

/// Session-owned handle to an entity instance.
pub type Managed<E> = Rc<RefCell<E>>;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error("`{entity}` instance is not managed by this session")]
    Detached { entity: &'static str },
    #[error("another `{entity}` instance with id {id} is already managed")]
    IdentityConflict { entity: &'static str, id: EntityId },
    #[error("`{entity}` instance is currently borrowed")]
    Borrowed { entity: &'static str },
    #[error("collection `{entity}` is managed under a different type")]
    TypeMismatch { entity: &'static str },
}

/// Wraps a fresh entity in a session handle.
pub fn managed<E: Entity>(entity: E) -> Managed<E> {
    Rc::new(RefCell::new(entity))
}

/// Mutably borrows a handle, reporting an outstanding borrow as an error.
pub fn borrow_mut<E: Entity>(entity: &Managed<E>) -> SessionResult<RefMut<'_, E>> {
    entity
        .try_borrow_mut()
        .map_err(|_| SessionError::Borrowed { entity: E::NAME })
}

/// Persistence context tracking pending changes for one unit of work.
pub trait Session {
    /// Returns the first entity matching `filter`, resolved through the
    /// identity map.
    fn find_one_by<E: Entity>(&self, filter: &Filter) -> SessionResult<Option<Managed<E>>>;

    /// Runs a composed query and resolves every row through the identity map.
    fn execute<E: Entity>(&self, query: &QueryBuilder) -> SessionResult<Vec<Managed<E>>>;

    /// Counts rows matching `query`, ignoring pagination.
    fn count(&self, query: &QueryBuilder) -> SessionResult<u64>;

    /// Factory for blank, not yet persisted instances.
    fn create<E: Entity>(&self) -> Managed<E> {
        managed(E::default())
    }

    /// Schedules `entity` for insertion, or keeps it managed if it already is.
    fn persist<E: Entity>(&self, entity: &Managed<E>) -> SessionResult<()>;

    /// Schedules `entity` for deletion at the next flush.
    fn remove<E: Entity>(&self, entity: &Managed<E>) -> SessionResult<()>;

    /// Writes every pending change.
    fn flush(&self) -> SessionResult<()>;

    /// Writes only the pending changes of `entity`.
    fn flush_entity<E: Entity>(&self, entity: &Managed<E>) -> SessionResult<()>;

    /// Returns whether `entity` is managed or scheduled for insertion.
    fn contains<E: Entity>(&self, entity: &Managed<E>) -> bool;
}
