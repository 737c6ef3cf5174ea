//! Entity trait, identifiers and bulk property assignment.
//!
//! # Responsibility
//! - Describe what the façade needs from a domain record: a collection name,
//!   an identifier, field metadata, validation rules and a blank constructor.
//! - Convert entities to and from the property maps stored as documents.
//!
//! # Invariants
//! - `id` is never part of a stored body; stores keep it as a separate column.
//! - Bulk assignment only touches fields listed in `Entity::fields()`.

use crate::validation::RuleSet;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Store-assigned identifier of a persisted entity.
pub type EntityId = i64;

/// Property bag used for bulk assignment and stored document bodies.
pub type PropertyMap = Map<String, Value>;

/// Name of the identifier property in serialized entities and filters.
pub const ID_FIELD: &str = "id";

pub type EntityResult<T> = Result<T, EntityError>;

#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("failed to serialize `{entity}`: {source}")]
    Serialize {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{entity}` does not serialize to a property map")]
    NotAnObject { entity: &'static str },
    #[error("cannot assign properties onto `{entity}`: {source}")]
    Assign {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored `{entity}` document {id} cannot be decoded: {source}")]
    Hydrate {
        entity: &'static str,
        id: EntityId,
        #[source]
        source: serde_json::Error,
    },
}

/// Introspection data exposed by [`Entity::metadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Collection name, also used as the entity name in errors and logs.
    pub name: &'static str,
    /// Assignable fields, excluding `id`.
    pub fields: &'static [&'static str],
}

/// A persistable domain record.
///
/// Blank instances come from `Default`; the serde representation must be a
/// JSON object carrying the identifier under [`ID_FIELD`].
pub trait Entity: Serialize + DeserializeOwned + Default + 'static {
    /// Collection name shared by every instance of this type.
    const NAME: &'static str;

    /// Assignable fields, excluding `id`.
    fn fields() -> &'static [&'static str];

    fn id(&self) -> Option<EntityId>;

    fn set_id(&mut self, id: EntityId);

    /// Validation rules registered for this entity type.
    fn rules() -> RuleSet<Self> {
        RuleSet::new()
    }

    /// Hook invoked by the façade right before the entity is handed to the
    /// session for persistence.
    fn pre_save(&mut self) {}

    fn metadata() -> EntityMetadata {
        EntityMetadata {
            name: Self::NAME,
            fields: Self::fields(),
        }
    }

    /// Serializes the entity, `id` included.
    fn to_properties(&self) -> EntityResult<PropertyMap> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(EntityError::NotAnObject { entity: Self::NAME }),
            Err(source) => Err(EntityError::Serialize {
                entity: Self::NAME,
                source,
            }),
        }
    }

    /// Serializes the entity without `id`, as stored in a document body.
    fn to_body(&self) -> EntityResult<PropertyMap> {
        let mut properties = self.to_properties()?;
        properties.remove(ID_FIELD);
        Ok(properties)
    }

    /// Bulk-assigns every known field of `properties` onto this entity.
    ///
    /// `id` and keys outside `fields()` are skipped. On error the entity is
    /// left untouched.
    fn assign(&mut self, properties: &PropertyMap) -> EntityResult<()> {
        let fields = Self::fields();
        let mut merged = self.to_properties()?;

        for (key, value) in properties {
            if key == ID_FIELD {
                continue;
            }
            if !fields.contains(&key.as_str()) {
                debug!(
                    "event=entity_assign module=model status=skip entity={} field={key}",
                    Self::NAME
                );
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }

        *self = serde_json::from_value(Value::Object(merged)).map_err(|source| {
            EntityError::Assign {
                entity: Self::NAME,
                source,
            }
        })?;
        Ok(())
    }

    /// Rebuilds an entity from a stored document.
    fn hydrate(id: EntityId, body: &PropertyMap) -> EntityResult<Self> {
        let mut properties = body.clone();
        properties.insert(ID_FIELD.to_string(), Value::from(id));
        serde_json::from_value(Value::Object(properties)).map_err(|source| EntityError::Hydrate {
            entity: Self::NAME,
            id,
            source,
        })
    }
}
