mod common;

use common::{contact, factory, Contact};
use facade_core::session::managed;
use facade_core::{
    EntityFacade, FacadeConfig, FacadeError, FlushPolicy, MemoryStore, OnMissing, Session,
    SessionError, StoreError, UnitOfWorkSession,
};
use std::rc::Rc;

#[test]
fn save_is_deferred_until_flush() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let person = managed(contact("Ana", "ana@example.com", 30));

    facade.save(&person).unwrap();
    assert!(store.is_empty("contact"));
    assert_eq!(person.borrow().id, None);
    assert_eq!(session.pending_count(), 1);

    facade.flush(None).unwrap();
    assert_eq!(store.len("contact"), 1);
    assert_eq!(person.borrow().id, Some(1));
    assert_eq!(session.pending_count(), 0);
}

#[test]
fn save_runs_pre_save_hook() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let person = managed(contact("Ana Maria", "ana@example.com", 30));

    facade.save(&person).unwrap().flush(None).unwrap();

    assert_eq!(person.borrow().slug, "ana-maria");
    assert_eq!(store.get("contact", 1).unwrap()["slug"], "ana-maria");
}

#[test]
fn remove_is_durable_only_after_flush() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    facade
        .save(&managed(contact("Ana", "ana@example.com", 30)))
        .unwrap()
        .flush(None)
        .unwrap();

    let removed = facade.remove(1_i64).unwrap();
    assert_eq!(removed.borrow().name, "Ana");
    assert_eq!(store.len("contact"), 1);

    facade.flush(None).unwrap();
    assert!(store.is_empty("contact"));

    let fresh = UnitOfWorkSession::new(&store);
    let reader = EntityFacade::<Contact, _>::new(&fresh);
    assert!(reader.find(1_i64, OnMissing::ReturnNone).unwrap().is_none());
}

#[test]
fn remove_of_missing_id_aborts() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);

    let err = facade.remove(12_i64).unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn remove_of_unsaved_entity_cancels_its_insert() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let person = managed(contact("Ana", "ana@example.com", 30));

    facade.save(&person).unwrap();
    facade.remove(&person).unwrap();
    facade.flush(None).unwrap();

    assert!(store.is_empty("contact"));
}

#[test]
fn remove_of_detached_entity_is_rejected() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);

    let mut stray = contact("Ana", "ana@example.com", 30);
    stray.id = Some(3);

    let err = facade.remove(&managed(stray)).unwrap_err();
    assert!(matches!(
        err,
        FacadeError::Session(SessionError::Detached { entity: "contact" })
    ));
}

#[test]
fn remove_of_never_saved_entity_is_ignored() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let mut properties = serde_json::Map::new();
    properties.insert("name".to_string(), serde_json::json!("x"));

    let created = facade.find_or_create(properties).unwrap().unwrap();
    let removed = facade.remove(&created).unwrap();
    facade.flush(None).unwrap();

    assert!(Rc::ptr_eq(&created, &removed));
    assert!(!session.contains(&created));
    assert!(store.is_empty("contact"));
}

#[test]
fn saving_a_removed_entity_cancels_the_removal() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    facade
        .save(&managed(contact("Ana", "ana@example.com", 30)))
        .unwrap()
        .flush(None)
        .unwrap();

    let person = facade.remove(1_i64).unwrap();
    facade.save(&person).unwrap().flush(None).unwrap();

    assert_eq!(store.len("contact"), 1);
}

#[test]
fn modified_managed_entities_are_written_on_flush() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    facade
        .save(&managed(contact("Ana", "ana@example.com", 30)))
        .unwrap()
        .flush(None)
        .unwrap();

    let reader_session = UnitOfWorkSession::new(&store);
    let reader = EntityFacade::<Contact, _>::new(&reader_session);
    let person = reader.find(1_i64, OnMissing::Abort).unwrap().unwrap();
    person.borrow_mut().age = 31;
    assert_eq!(store.get("contact", 1).unwrap()["age"], 30);

    reader.flush(None).unwrap();
    assert_eq!(store.get("contact", 1).unwrap()["age"], 31);
}

#[test]
fn scoped_flush_writes_only_the_given_entity() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let first = managed(contact("Ana", "ana@example.com", 30));
    let second = managed(contact("Bo", "bo@example.com", 41));

    facade.save(&first).unwrap().save(&second).unwrap();
    facade.flush(Some(&second)).unwrap();

    assert_eq!(store.len("contact"), 1);
    assert_eq!(second.borrow().id, Some(1));
    assert_eq!(first.borrow().id, None);
    assert!(session.contains(&first));

    facade.flush(None).unwrap();
    assert_eq!(store.len("contact"), 2);
}

#[test]
fn everything_policy_ignores_the_flush_scope() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let config = FacadeConfig::default().with_flush_policy(FlushPolicy::Everything);
    let facade = EntityFacade::<Contact, _>::with_config(&session, config);
    let first = managed(contact("Ana", "ana@example.com", 30));
    let second = managed(contact("Bo", "bo@example.com", 41));

    facade.save(&first).unwrap().save(&second).unwrap();
    facade.flush(Some(&second)).unwrap();

    assert_eq!(store.len("contact"), 2);
}

#[test]
fn failed_flush_writes_nothing_and_keeps_work_pending() {
    let store = MemoryStore::new();
    {
        let session = UnitOfWorkSession::new(&store);
        let facade = EntityFacade::<Contact, _>::new(&session);
        let mut existing = contact("Ana", "ana@example.com", 30);
        existing.id = Some(5);
        facade.save(&managed(existing)).unwrap().flush(None).unwrap();
    }

    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let fresh = managed(contact("Bo", "bo@example.com", 41));
    let mut clashing = contact("Cy", "cy@example.com", 52);
    clashing.id = Some(5);

    facade.save(&fresh).unwrap();
    facade.save(&managed(clashing)).unwrap();
    let err = facade.flush(None).unwrap_err();

    assert!(matches!(
        err,
        FacadeError::Session(SessionError::Store(StoreError::Conflict {
            entity: "contact",
            id: 5
        }))
    ));
    assert_eq!(store.len("contact"), 1);
    assert_eq!(fresh.borrow().id, None);
    assert_eq!(session.pending_count(), 2);
}

#[test]
fn clear_detaches_everything() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let person = managed(contact("Ana", "ana@example.com", 30));
    facade.save(&person).unwrap();

    session.clear();
    facade.flush(None).unwrap();

    assert!(!session.contains(&person));
    assert!(store.is_empty("contact"));
}

#[test]
fn factory_fixtures_persist_with_sequential_ids() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let handles: Vec<_> = factory()
        .make_many::<Contact>(3)
        .into_iter()
        .map(managed)
        .collect();

    for handle in &handles {
        facade.validate(&handle.borrow()).unwrap();
        facade.save(handle).unwrap();
    }
    facade.flush(None).unwrap();

    let ids: Vec<_> = handles.iter().map(|handle| handle.borrow().id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn exhausted_identifier_space_is_an_error() {
    let store = MemoryStore::new();
    let session = UnitOfWorkSession::new(&store);
    let facade = EntityFacade::<Contact, _>::new(&session);
    let mut last = contact("Ana", "ana@example.com", 30);
    last.id = Some(i64::MAX);
    facade.save(&managed(last)).unwrap().flush(None).unwrap();

    let fresh = managed(contact("Bo", "bo@example.com", 41));
    facade.save(&fresh).unwrap();
    let err = facade.flush(None).unwrap_err();

    assert!(matches!(
        err,
        FacadeError::Session(SessionError::Store(StoreError::IdsExhausted {
            entity: "contact",
            last_id: i64::MAX
        }))
    ));
    assert_eq!(store.len("contact"), 1);
    assert_eq!(fresh.borrow().id, None);
}
