//! In-memory document store.
//!
//! Used as the substitute backing store in tests and for throwaway sessions.
//! Writes are staged on a copy of the collections and swapped in only when
//! the whole change set succeeds.

use super::{ChangeSet, Document, DocumentStore, StoreError, StoreResult};
use crate::model::entity::{EntityId, PropertyMap};
use crate::query::QueryBuilder;
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct Collection {
    last_id: EntityId,
    documents: BTreeMap<EntityId, PropertyMap>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RefCell<BTreeMap<&'static str, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a stored body, bypassing any session.
    pub fn get(&self, entity: &str, id: EntityId) -> Option<PropertyMap> {
        self.collections
            .borrow()
            .get(entity)
            .and_then(|collection| collection.documents.get(&id).cloned())
    }

    /// Number of stored documents in one collection.
    pub fn len(&self, entity: &str) -> usize {
        self.collections
            .borrow()
            .get(entity)
            .map_or(0, |collection| collection.documents.len())
    }

    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    fn matching(&self, query: &QueryBuilder) -> Vec<Document> {
        let collections = self.collections.borrow();
        let Some(collection) = collections.get(query.collection()) else {
            return Vec::new();
        };

        let mut hits: Vec<(EntityId, &PropertyMap)> = collection
            .documents
            .iter()
            .filter(|(id, body)| query.matches(**id, body))
            .map(|(id, body)| (*id, body))
            .collect();
        hits.sort_by(|left, right| query.compare(*left, *right));

        hits.into_iter()
            .map(|(id, body)| Document {
                id,
                body: body.clone(),
            })
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    fn query(&self, query: &QueryBuilder) -> StoreResult<Vec<Document>> {
        let offset = usize::try_from(query.first_result()).unwrap_or(usize::MAX);
        let limit = query
            .max_results()
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(self
            .matching(query)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn count(&self, query: &QueryBuilder) -> StoreResult<u64> {
        Ok(self.matching(query).len() as u64)
    }

    fn apply(&self, changes: &ChangeSet) -> StoreResult<Vec<EntityId>> {
        let mut staged = self.collections.borrow().clone();
        let mut assigned = Vec::with_capacity(changes.inserts.len());

        for insert in &changes.inserts {
            let collection = staged.entry(insert.entity).or_default();
            let id = match insert.id {
                Some(id) => id,
                None => collection
                    .last_id
                    .checked_add(1)
                    .ok_or(StoreError::IdsExhausted {
                        entity: insert.entity,
                        last_id: collection.last_id,
                    })?,
            };
            if collection.documents.contains_key(&id) {
                return Err(StoreError::Conflict {
                    entity: insert.entity,
                    id,
                });
            }
            collection.last_id = collection.last_id.max(id);
            collection.documents.insert(id, insert.body.clone());
            assigned.push(id);
        }

        for update in &changes.updates {
            let slot = staged
                .get_mut(update.entity)
                .and_then(|collection| collection.documents.get_mut(&update.id))
                .ok_or(StoreError::Missing {
                    entity: update.entity,
                    id: update.id,
                })?;
            *slot = update.body.clone();
        }

        for delete in &changes.deletes {
            if let Some(collection) = staged.get_mut(delete.entity) {
                collection.documents.remove(&delete.id);
            }
        }

        *self.collections.borrow_mut() = staged;
        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::query::{QueryBuilder, SortDirection};
    use crate::store::{ChangeSet, DocumentStore, PendingInsert, PendingUpdate, StoreError};
    use serde_json::json;

    fn insert(name: &str) -> PendingInsert {
        PendingInsert {
            entity: "contact",
            id: None,
            body: json!({ "name": name }).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn inserts_receive_sequential_ids() {
        let store = MemoryStore::new();
        let ids = store
            .apply(&ChangeSet {
                inserts: vec![insert("a"), insert("b")],
                ..ChangeSet::default()
            })
            .unwrap();

        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.len("contact"), 2);
    }

    #[test]
    fn failed_change_set_leaves_store_untouched() {
        let store = MemoryStore::new();
        store
            .apply(&ChangeSet {
                inserts: vec![insert("a")],
                ..ChangeSet::default()
            })
            .unwrap();

        let err = store
            .apply(&ChangeSet {
                inserts: vec![insert("b")],
                updates: vec![PendingUpdate {
                    entity: "contact",
                    id: 99,
                    body: Default::default(),
                }],
                ..ChangeSet::default()
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::Missing { id: 99, .. }));
        assert_eq!(store.len("contact"), 1);
    }

    #[test]
    fn query_applies_order_offset_and_limit() {
        let store = MemoryStore::new();
        store
            .apply(&ChangeSet {
                inserts: vec![insert("c"), insert("a"), insert("b")],
                ..ChangeSet::default()
            })
            .unwrap();

        let query = QueryBuilder::new("contact", "t")
            .order_by("name", SortDirection::Desc)
            .offset(1)
            .limit(1);
        let docs = store.query(&query).unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].body["name"], "b");
        assert_eq!(store.count(&query).unwrap(), 3);
    }
}
