//! Deferred "all records" query.

use crate::error::FacadeResult;
use crate::model::entity::Entity;
use crate::query::{Comparison, Filter, QueryBuilder, SortDirection};
use crate::session::{Managed, Session, SessionError};
use serde_json::Value;
use std::marker::PhantomData;

/// Lazy, re-executable query over one entity collection.
///
/// Building a worker runs nothing; every terminal call (`get_result`,
/// `get_one_or_none`, `count`, `to_array`) queries the session again.
pub struct QueryWorker<'s, E, S> {
    session: &'s S,
    query: QueryBuilder,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity, S: Session> QueryWorker<'s, E, S> {
    pub(crate) fn new(session: &'s S, query: QueryBuilder) -> Self {
        Self {
            session,
            query,
            _entity: PhantomData,
        }
    }

    /// Adds one equality condition per filter entry.
    pub fn filter(mut self, filter: &Filter) -> Self {
        self.query = self.query.filter(filter);
        self
    }

    pub fn and_where(
        mut self,
        field: impl Into<String>,
        comparison: Comparison,
        value: impl Into<Value>,
    ) -> Self {
        self.query = self.query.and_where(field, comparison, value);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query = self.query.order_by(field, direction);
        self
    }

    /// Restricts results to one 1-based page; page 0 is treated as page 1.
    pub fn paginate(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.query = self
            .query
            .limit(per_page)
            .offset((page - 1).saturating_mul(per_page));
        self
    }

    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn get_result(&self) -> FacadeResult<Vec<Managed<E>>> {
        Ok(self.session.execute(&self.query)?)
    }

    pub fn get_one_or_none(&self) -> FacadeResult<Option<Managed<E>>> {
        let query = self.query.clone().limit(1);
        Ok(self.session.execute(&query)?.into_iter().next())
    }

    /// Number of matching records, ignoring pagination.
    pub fn count(&self) -> FacadeResult<u64> {
        Ok(self.session.count(&self.query)?)
    }

    /// Serializes every result, `id` included.
    pub fn to_array(&self) -> FacadeResult<Vec<Value>> {
        self.get_result()?
            .iter()
            .map(|handle| -> FacadeResult<Value> {
                let entity = handle
                    .try_borrow()
                    .map_err(|_| SessionError::Borrowed { entity: E::NAME })?;
                Ok(Value::Object(entity.to_properties()?))
            })
            .collect()
    }
}
