//! Entity access façade.
//!
//! # Responsibility
//! - Expose the fixed verb set callers use per entity type: lookup,
//!   find-or-create, removal, save/flush, validation and query composition.
//! - Translate "not found" and "invalid" outcomes into [`FacadeError`] values
//!   carrying an HTTP status and payload.
//!
//! # Invariants
//! - Identifier lookups always go through `find_one_by({"id": ..})`, so the
//!   session's identity map decides which instance is returned.
//! - The façade never writes to storage itself; durability happens on flush.

mod input;
mod worker;

pub use input::{FindOrCreateInput, OnMissing, Target};
pub use worker::QueryWorker;

use crate::config::{FacadeConfig, FlushPolicy};
use crate::error::{FacadeError, FacadeResult};
use crate::model::entity::{Entity, EntityMetadata, ID_FIELD};
use crate::query::{Filter, QueryBuilder};
use crate::session::{borrow_mut, Managed, Session};
use crate::validation::RuleSet;
use input::truthy_id;
use log::{debug, warn};
use serde_json::Value;
use std::fmt::{Debug, Formatter};

/// Verb surface over one entity type `E`, borrowing a request-scoped session.
pub struct EntityFacade<'s, E, S> {
    session: &'s S,
    config: FacadeConfig,
    rules: RuleSet<E>,
}

impl<E: Entity, S> Debug for EntityFacade<'_, E, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityFacade")
            .field("entity", &E::NAME)
            .field("config", &self.config)
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl<'s, E: Entity, S: Session> EntityFacade<'s, E, S> {
    /// Creates a façade with the default configuration.
    pub fn new(session: &'s S) -> Self {
        Self::with_config(session, FacadeConfig::default())
    }

    /// Creates a façade; `E::rules()` is resolved once here.
    pub fn with_config(session: &'s S, config: FacadeConfig) -> Self {
        Self {
            session,
            config,
            rules: E::rules(),
        }
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn session(&self) -> &'s S {
        self.session
    }

    pub fn metadata(&self) -> EntityMetadata {
        E::metadata()
    }

    pub fn entity_name(&self) -> &'static str {
        E::NAME
    }

    /// Returns a blank instance from the session factory. It is not persisted.
    pub fn create_entity(&self) -> Managed<E> {
        self.session.create::<E>()
    }

    /// Checks `entity` against every registered rule.
    ///
    /// # Errors
    /// - `FacadeError::Validation` with all violation messages, in rule order.
    pub fn validate(&self, entity: &E) -> FacadeResult<()> {
        let violations = self.rules.validate(entity);
        if violations.is_empty() {
            return Ok(());
        }

        warn!(
            "event=entity_validate module=facade status=rejected entity={} violations={}",
            E::NAME,
            violations.len()
        );
        Err(FacadeError::Validation(violations))
    }

    /// Resolves `target` to an entity.
    ///
    /// An entity handle is returned unchanged; an identifier is looked up
    /// through [`Self::find_one_by`].
    pub fn find(
        &self,
        target: impl Into<Target<E>>,
        on_missing: OnMissing,
    ) -> FacadeResult<Option<Managed<E>>> {
        match target.into() {
            Target::Entity(entity) => Ok(Some(entity)),
            Target::Id(id) => self.find_one_by(&Filter::by_id(id), on_missing),
        }
    }

    /// Returns the first entity matching every equality entry of `filter`.
    pub fn find_one_by(
        &self,
        filter: &Filter,
        on_missing: OnMissing,
    ) -> FacadeResult<Option<Managed<E>>> {
        match (self.session.find_one_by::<E>(filter)?, on_missing) {
            (Some(entity), _) => Ok(Some(entity)),
            (None, OnMissing::ReturnNone) => Ok(None),
            (None, OnMissing::Abort) => {
                debug!(
                    "event=entity_find module=facade status=not_found entity={} filter_keys={}",
                    E::NAME,
                    filter.iter().map(|(field, _)| field).collect::<Vec<_>>().join(",")
                );
                Err(self.not_found())
            }
        }
    }

    /// Resolves loosely typed input to an entity, creating one when needed.
    ///
    /// - `Null` → `None`.
    /// - `Serialized` → decoded as JSON and resolved again.
    /// - `Id` → `find(id, OnMissing::Abort)`.
    /// - `Properties` → the entity named by a truthy `id`, or a blank one,
    ///   with every entry bulk-assigned.
    ///
    /// # Errors
    /// - `InvalidArgument` for undecodable text, decoded values of another
    ///   shape, non-integer identifiers or properties of the wrong type.
    /// - `NotFound` when a referenced identifier does not exist.
    pub fn find_or_create(
        &self,
        input: impl Into<FindOrCreateInput>,
    ) -> FacadeResult<Option<Managed<E>>> {
        match input.into() {
            FindOrCreateInput::Null => Ok(None),
            FindOrCreateInput::Serialized(text) => {
                let decoded: Value = serde_json::from_str(&text).map_err(|err| {
                    FacadeError::InvalidArgument(format!(
                        "find_or_create input is neither null, an identifier nor a record: {err}"
                    ))
                })?;
                self.find_or_create(FindOrCreateInput::try_from(decoded)?)
            }
            FindOrCreateInput::Id(id) => self.find(id, OnMissing::Abort),
            FindOrCreateInput::Properties(properties) => {
                let entity = match truthy_id(properties.get(ID_FIELD))? {
                    Some(id) => self.require(id)?,
                    None => self.create_entity(),
                };
                borrow_mut(&entity)?
                    .assign(&properties)
                    .map_err(|err| FacadeError::InvalidArgument(err.to_string()))?;
                Ok(Some(entity))
            }
        }
    }

    /// Resolves `target` and schedules it for deletion at the next flush.
    pub fn remove(&self, target: impl Into<Target<E>>) -> FacadeResult<Managed<E>> {
        let entity = self.require(target)?;
        self.session.remove(&entity)?;
        Ok(entity)
    }

    /// Runs the `pre_save` hook and hands `entity` to the session.
    pub fn save(&self, entity: &Managed<E>) -> FacadeResult<&Self> {
        borrow_mut(entity)?.pre_save();
        self.session.persist(entity)?;
        Ok(self)
    }

    /// Writes pending changes: everything for `None`, or the given entity's
    /// changes under [`FlushPolicy::PerEntity`].
    pub fn flush(&self, entity: Option<&Managed<E>>) -> FacadeResult<&Self> {
        match (entity, self.config.flush_policy) {
            (Some(entity), FlushPolicy::PerEntity) => self.session.flush_entity(entity)?,
            _ => self.session.flush()?,
        }
        Ok(self)
    }

    /// Fresh builder over this entity's collection, aliased per config.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(E::NAME, self.config.query_alias.as_str())
    }

    /// Runs a builder obtained from [`Self::query`].
    pub fn execute(&self, query: &QueryBuilder) -> FacadeResult<Vec<Managed<E>>> {
        if query.collection() != E::NAME {
            return Err(FacadeError::InvalidArgument(format!(
                "query over `{}` cannot load `{}` entities",
                query.collection(),
                E::NAME
            )));
        }
        Ok(self.session.execute(query)?)
    }

    pub fn create_query_worker(&self) -> QueryWorker<'s, E, S> {
        QueryWorker::new(self.session, self.query())
    }

    /// Deferred query over every record of this entity type.
    pub fn find_all(&self) -> QueryWorker<'s, E, S> {
        self.create_query_worker()
    }

    fn require(&self, target: impl Into<Target<E>>) -> FacadeResult<Managed<E>> {
        self.find(target, OnMissing::Abort)?
            .ok_or_else(|| self.not_found())
    }

    fn not_found(&self) -> FacadeError {
        FacadeError::NotFound {
            entity: E::NAME,
            message: self.config.not_found_message.clone(),
        }
    }
}
