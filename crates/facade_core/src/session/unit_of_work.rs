//! Identity-mapped unit of work over a [`DocumentStore`].
//!
//! # Responsibility
//! - Keep one in-memory instance per `(collection, id)` for the session
//!   lifetime.
//! - Track scheduled inserts, scheduled removals and dirty managed entities.
//! - Turn pending work into one [`ChangeSet`] per flush.
//!
//! # Invariants
//! - A managed entity is dirty when its serialized body differs from the
//!   snapshot taken at load or at its last flush.
//! - Session state is only updated after the store accepted the change set.

use super::{borrow_mut, managed, Managed, Session, SessionError, SessionResult};
use crate::model::entity::{Entity, EntityId, PropertyMap};
use crate::query::{Filter, QueryBuilder};
use crate::store::{
    ChangeSet, Document, DocumentStore, PendingDelete, PendingInsert, PendingUpdate, StoreError,
};
use log::{debug, error, info};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use uuid::Uuid;

const LOOKUP_ALIAS: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EntityKey {
    entity: &'static str,
    id: EntityId,
}

/// Type-erased view of a `Managed<E>` held by the unit of work.
trait Tracked {
    fn entity_name(&self) -> &'static str;
    fn instance(&self) -> *const ();
    fn current_id(&self) -> SessionResult<Option<EntityId>>;
    fn body(&self) -> SessionResult<PropertyMap>;
    fn assign_id(&self, id: EntityId) -> SessionResult<()>;
    fn ensure_writable(&self) -> SessionResult<()>;
    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> Tracked for Managed<E> {
    fn entity_name(&self) -> &'static str {
        E::NAME
    }

    fn instance(&self) -> *const () {
        Rc::as_ptr(self).cast()
    }

    fn current_id(&self) -> SessionResult<Option<EntityId>> {
        let entity = self
            .try_borrow()
            .map_err(|_| SessionError::Borrowed { entity: E::NAME })?;
        Ok(entity.id())
    }

    fn body(&self) -> SessionResult<PropertyMap> {
        let entity = self
            .try_borrow()
            .map_err(|_| SessionError::Borrowed { entity: E::NAME })?;
        Ok(entity.to_body()?)
    }

    fn assign_id(&self, id: EntityId) -> SessionResult<()> {
        borrow_mut(self)?.set_id(id);
        Ok(())
    }

    fn ensure_writable(&self) -> SessionResult<()> {
        borrow_mut(self).map(drop)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct TrackedEntry {
    handle: Box<dyn Tracked>,
    original: PropertyMap,
}

#[derive(Default)]
struct UnitOfWork {
    identity_map: BTreeMap<EntityKey, TrackedEntry>,
    scheduled_inserts: Vec<Box<dyn Tracked>>,
    scheduled_removals: BTreeSet<EntityKey>,
}

impl UnitOfWork {
    /// Key of `entity` when this exact instance is identity-mapped.
    fn managed_key<E: Entity>(&self, entity: &Managed<E>) -> SessionResult<Option<EntityKey>> {
        let Some(id) = entity.current_id()? else {
            return Ok(None);
        };
        let key = EntityKey {
            entity: E::NAME,
            id,
        };
        match self.identity_map.get(&key) {
            Some(entry) if entry.handle.instance() == entity.instance() => Ok(Some(key)),
            Some(_) => Err(SessionError::IdentityConflict {
                entity: E::NAME,
                id,
            }),
            None => Ok(None),
        }
    }

    fn scheduled_insert_position(&self, instance: *const ()) -> Option<usize> {
        self.scheduled_inserts
            .iter()
            .position(|tracked| tracked.instance() == instance)
    }
}

/// Request-scoped session backed by any [`DocumentStore`].
///
/// Pass `&store` to share one store between several sessions.
pub struct UnitOfWorkSession<S> {
    id: Uuid,
    store: S,
    state: RefCell<UnitOfWork>,
}

impl<S: DocumentStore> UnitOfWorkSession<S> {
    pub fn new(store: S) -> Self {
        let id = Uuid::new_v4();
        debug!("event=session_open module=session status=ok session_id={id}");
        Self {
            id,
            store,
            state: RefCell::new(UnitOfWork::default()),
        }
    }

    /// Correlation id used in this session's log events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of scheduled inserts and removals; dirty entities are not counted.
    pub fn pending_count(&self) -> usize {
        let state = self.state.borrow();
        state.scheduled_inserts.len() + state.scheduled_removals.len()
    }

    /// Detaches every entity and drops all pending work.
    pub fn clear(&self) {
        let dropped = self.pending_count();
        *self.state.borrow_mut() = UnitOfWork::default();
        debug!(
            "event=session_clear module=session status=ok session_id={} dropped_pending={dropped}",
            self.id
        );
    }

    fn resolve<E: Entity>(&self, document: Document) -> SessionResult<Managed<E>> {
        let key = EntityKey {
            entity: E::NAME,
            id: document.id,
        };
        let mut state = self.state.borrow_mut();

        if let Some(entry) = state.identity_map.get(&key) {
            return entry
                .handle
                .as_any()
                .downcast_ref::<Managed<E>>()
                .map(Rc::clone)
                .ok_or(SessionError::TypeMismatch { entity: E::NAME });
        }

        let entity = managed(E::hydrate(document.id, &document.body)?);
        let original = entity.body()?;
        state.identity_map.insert(
            key,
            TrackedEntry {
                handle: Box::new(Rc::clone(&entity)),
                original,
            },
        );
        Ok(entity)
    }

    fn flush_scoped(&self, scope: Option<*const ()>) -> SessionResult<()> {
        let mut state = self.state.borrow_mut();
        let in_scope = |instance: *const ()| scope.map_or(true, |only| only == instance);

        let mut changes = ChangeSet::default();
        let mut inserted = Vec::new();
        for (index, tracked) in state.scheduled_inserts.iter().enumerate() {
            if !in_scope(tracked.instance()) {
                continue;
            }
            tracked.ensure_writable()?;
            changes.inserts.push(PendingInsert {
                entity: tracked.entity_name(),
                id: tracked.current_id()?,
                body: tracked.body()?,
            });
            inserted.push(index);
        }

        for (key, entry) in &state.identity_map {
            if !in_scope(entry.handle.instance()) {
                continue;
            }
            if state.scheduled_removals.contains(key) {
                changes.deletes.push(PendingDelete {
                    entity: key.entity,
                    id: key.id,
                });
                continue;
            }
            let body = entry.handle.body()?;
            if body != entry.original {
                changes.updates.push(PendingUpdate {
                    entity: key.entity,
                    id: key.id,
                    body,
                });
            }
        }

        if changes.is_empty() {
            debug!(
                "event=session_flush module=session status=noop session_id={} scoped={}",
                self.id,
                scope.is_some()
            );
            return Ok(());
        }

        let (insert_count, update_count, delete_count) = (
            changes.inserts.len(),
            changes.updates.len(),
            changes.deletes.len(),
        );
        let assigned = self.store.apply(&changes).map_err(|err| {
            error!(
                "event=session_flush module=session status=error session_id={} error={err}",
                self.id
            );
            err
        })?;
        if assigned.len() != insert_count {
            return Err(StoreError::InvalidData(format!(
                "store assigned {} ids for {insert_count} inserts",
                assigned.len()
            ))
            .into());
        }

        let ChangeSet {
            inserts,
            updates,
            deletes,
        } = changes;

        let bodies = inserts.into_iter().map(|insert| insert.body);
        for ((index, id), original) in inserted.into_iter().zip(assigned).zip(bodies).rev() {
            let tracked = state.scheduled_inserts.remove(index);
            tracked.assign_id(id)?;
            let key = EntityKey {
                entity: tracked.entity_name(),
                id,
            };
            state.identity_map.insert(
                key,
                TrackedEntry {
                    handle: tracked,
                    original,
                },
            );
        }

        for update in updates {
            let key = EntityKey {
                entity: update.entity,
                id: update.id,
            };
            if let Some(entry) = state.identity_map.get_mut(&key) {
                entry.original = update.body;
            }
        }

        for delete in deletes {
            let key = EntityKey {
                entity: delete.entity,
                id: delete.id,
            };
            state.identity_map.remove(&key);
            state.scheduled_removals.remove(&key);
        }

        info!(
            "event=session_flush module=session status=ok session_id={} scoped={} inserts={insert_count} updates={update_count} deletes={delete_count}",
            self.id,
            scope.is_some()
        );
        Ok(())
    }
}

impl<S: DocumentStore> Session for UnitOfWorkSession<S> {
    fn find_one_by<E: Entity>(&self, filter: &Filter) -> SessionResult<Option<Managed<E>>> {
        let query = QueryBuilder::new(E::NAME, LOOKUP_ALIAS)
            .filter(filter)
            .limit(1);
        let document = self.store.query(&query)?.into_iter().next();
        document.map(|document| self.resolve(document)).transpose()
    }

    fn execute<E: Entity>(&self, query: &QueryBuilder) -> SessionResult<Vec<Managed<E>>> {
        self.store
            .query(query)?
            .into_iter()
            .map(|document| self.resolve(document))
            .collect()
    }

    fn count(&self, query: &QueryBuilder) -> SessionResult<u64> {
        Ok(self.store.count(query)?)
    }

    fn persist<E: Entity>(&self, entity: &Managed<E>) -> SessionResult<()> {
        let mut state = self.state.borrow_mut();

        if let Some(key) = state.managed_key(entity)? {
            if state.scheduled_removals.remove(&key) {
                debug!(
                    "event=session_persist module=session status=removal_cancelled session_id={} entity={} id={}",
                    self.id, key.entity, key.id
                );
            }
            return Ok(());
        }

        if state.scheduled_insert_position(entity.instance()).is_some() {
            return Ok(());
        }

        state.scheduled_inserts.push(Box::new(Rc::clone(entity)));
        debug!(
            "event=session_persist module=session status=scheduled session_id={} entity={}",
            self.id,
            E::NAME
        );
        Ok(())
    }

    fn remove<E: Entity>(&self, entity: &Managed<E>) -> SessionResult<()> {
        let mut state = self.state.borrow_mut();

        if let Some(position) = state.scheduled_insert_position(entity.instance()) {
            state.scheduled_inserts.remove(position);
            debug!(
                "event=session_remove module=session status=insert_cancelled session_id={} entity={}",
                self.id,
                E::NAME
            );
            return Ok(());
        }

        let Some(key) = state.managed_key(entity)? else {
            if entity.current_id()?.is_some() {
                return Err(SessionError::Detached { entity: E::NAME });
            }
            debug!(
                "event=session_remove module=session status=noop session_id={} entity={} reason=new_entity",
                self.id,
                E::NAME
            );
            return Ok(());
        };
        state.scheduled_removals.insert(key);
        debug!(
            "event=session_remove module=session status=scheduled session_id={} entity={} id={}",
            self.id, key.entity, key.id
        );
        Ok(())
    }

    fn flush(&self) -> SessionResult<()> {
        self.flush_scoped(None)
    }

    fn flush_entity<E: Entity>(&self, entity: &Managed<E>) -> SessionResult<()> {
        self.flush_scoped(Some(entity.instance()))
    }

    fn contains<E: Entity>(&self, entity: &Managed<E>) -> bool {
        let state = self.state.borrow();
        matches!(state.managed_key(entity), Ok(Some(_)))
            || state.scheduled_insert_position(entity.instance()).is_some()
    }
}
