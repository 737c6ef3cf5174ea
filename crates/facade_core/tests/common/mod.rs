//! Shared test entities and the fixture factory.
#![allow(dead_code)]

use facade_core::validation::{email, not_blank, range};
use facade_core::{Entity, EntityId, RuleSet};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStub {
    pub id: Option<EntityId>,
    pub attr1: String,
    pub attr2: i64,
}

fn stub_attr1(stub: &EntityStub) -> &str {
    &stub.attr1
}

fn stub_attr2(stub: &EntityStub) -> i64 {
    stub.attr2
}

impl Entity for EntityStub {
    const NAME: &'static str = "entity_stub";

    fn fields() -> &'static [&'static str] {
        &["attr1", "attr2"]
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn rules() -> RuleSet<Self> {
        RuleSet::new()
            .with(not_blank("attr1", stub_attr1))
            .with(range("attr2", 0, 999_999, stub_attr2))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Option<EntityId>,
    pub name: String,
    pub email: String,
    pub age: i64,
    #[serde(default)]
    pub slug: String,
}

fn contact_name(contact: &Contact) -> &str {
    &contact.name
}

fn contact_email(contact: &Contact) -> &str {
    &contact.email
}

fn contact_age(contact: &Contact) -> i64 {
    contact.age
}

impl Entity for Contact {
    const NAME: &'static str = "contact";

    fn fields() -> &'static [&'static str] {
        &["name", "email", "age"]
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn rules() -> RuleSet<Self> {
        RuleSet::new()
            .with(not_blank("name", contact_name))
            .with(email("email", contact_email))
            .with(range("age", 0, 150, contact_age))
    }

    fn pre_save(&mut self) {
        self.slug = self.name.trim().to_lowercase().replace(' ', "-");
    }
}

pub fn contact(name: &str, email: &str, age: i64) -> Contact {
    Contact {
        id: None,
        name: name.to_string(),
        email: email.to_string(),
        age,
        slug: String::new(),
    }
}

type Builder = Box<dyn Fn() -> Box<dyn Any>>;

/// Registry of per-type builders producing randomized fixtures.
#[derive(Default)]
pub struct FixtureFactory {
    builders: HashMap<TypeId, Builder>,
}

impl FixtureFactory {
    pub fn register<T: 'static>(&mut self, builder: impl Fn() -> T + 'static) {
        self.builders
            .insert(TypeId::of::<T>(), Box::new(move || -> Box<dyn Any> { Box::new(builder()) }));
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.builders.contains_key(&TypeId::of::<T>())
    }

    pub fn make<T: 'static>(&self) -> T {
        let builder = self
            .builders
            .get(&TypeId::of::<T>())
            .unwrap_or_else(|| panic!("no fixture registered for {}", std::any::type_name::<T>()));
        *builder()
            .downcast::<T>()
            .expect("fixture builder returned a different type")
    }

    pub fn make_many<T: 'static>(&self, count: usize) -> Vec<T> {
        (0..count).map(|_| self.make()).collect()
    }
}

pub fn random_word() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}

pub fn random_number() -> i64 {
    rand::thread_rng().gen_range(0..1_000_000)
}

/// Factory with the default fixtures of this test suite.
pub fn factory() -> FixtureFactory {
    let mut factory = FixtureFactory::default();
    factory.register(|| EntityStub {
        id: None,
        attr1: random_word(),
        attr2: random_number(),
    });
    factory.register(|| {
        let name = random_word();
        let email = format!("{name}@example.com");
        contact(&name, &email, random_number() % 100)
    });
    factory
}
