//! Contact record managed by the CLI.

use facade_core::validation::{email, not_blank, range};
use facade_core::{Entity, EntityId, RuleSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub age: i64,
}

fn name(contact: &Contact) -> &str {
    &contact.name
}

fn email_address(contact: &Contact) -> &str {
    &contact.email
}

fn age(contact: &Contact) -> i64 {
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
            .with(not_blank("name", name))
            .with(email("email", email_address))
            .with(range("age", 0, 150, age))
    }

    fn pre_save(&mut self) {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
    }
}
