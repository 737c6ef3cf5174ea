//! Argument types of the façade verbs.

use crate::error::{FacadeError, FacadeResult};
use crate::model::entity::{EntityId, PropertyMap};
use crate::session::Managed;
use serde_json::{Number, Value};
use std::rc::Rc;

/// What to do when a lookup finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMissing {
    /// Fail with a 404 `FacadeError::NotFound`.
    #[default]
    Abort,
    /// Return `None`.
    ReturnNone,
}

/// An identifier to look up, or an already materialized entity.
#[derive(Debug)]
pub enum Target<E> {
    Id(EntityId),
    Entity(Managed<E>),
}

impl<E> From<EntityId> for Target<E> {
    fn from(value: EntityId) -> Self {
        Self::Id(value)
    }
}

impl<E> From<Managed<E>> for Target<E> {
    fn from(value: Managed<E>) -> Self {
        Self::Entity(value)
    }
}

impl<E> From<&Managed<E>> for Target<E> {
    fn from(value: &Managed<E>) -> Self {
        Self::Entity(Rc::clone(value))
    }
}

/// Input accepted by `find_or_create`: nothing, a serialized record, a bare
/// identifier or a property map.
#[derive(Debug, Clone, PartialEq)]
pub enum FindOrCreateInput {
    Null,
    Serialized(String),
    Id(EntityId),
    Properties(PropertyMap),
}

impl<T: Into<FindOrCreateInput>> From<Option<T>> for FindOrCreateInput {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<EntityId> for FindOrCreateInput {
    fn from(value: EntityId) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for FindOrCreateInput {
    fn from(value: &str) -> Self {
        Self::Serialized(value.to_string())
    }
}

impl From<String> for FindOrCreateInput {
    fn from(value: String) -> Self {
        Self::Serialized(value)
    }
}

impl From<PropertyMap> for FindOrCreateInput {
    fn from(value: PropertyMap) -> Self {
        Self::Properties(value)
    }
}

impl TryFrom<Value> for FindOrCreateInput {
    type Error = FacadeError;

    fn try_from(value: Value) -> FacadeResult<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::String(text) => Ok(Self::Serialized(text)),
            Value::Number(number) => integral_id(&number).map(Self::Id).ok_or_else(|| {
                FacadeError::InvalidArgument(format!("`{number}` is not an integer identifier"))
            }),
            Value::Object(properties) => Ok(Self::Properties(properties)),
            other @ (Value::Bool(_) | Value::Array(_)) => Err(FacadeError::InvalidArgument(
                format!("expected null, string, integer or object, got `{other}`"),
            )),
        }
    }
}

/// Reads the `id` entry of a property map with loose truthiness: absent,
/// `null`, `false`, `0`, `""` and `"0"` mean "no identifier".
pub(crate) fn truthy_id(value: Option<&Value>) -> FacadeResult<Option<EntityId>> {
    let invalid = |value: &Value| {
        FacadeError::InvalidArgument(format!("`{value}` is not a valid identifier"))
    };

    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(value @ Value::Number(number)) => match integral_id(number) {
            Some(0) => Ok(None),
            Some(id) => Ok(Some(id)),
            None => Err(invalid(value)),
        },
        Some(value @ Value::String(text)) => match text.trim() {
            "" | "0" => Ok(None),
            trimmed => match parse_numeric_id(trimmed) {
                Some(0) => Ok(None),
                Some(id) => Ok(Some(id)),
                None => Err(invalid(value)),
            },
        },
        Some(other) => Err(invalid(other)),
    }
}

/// Integer value of `number`, accepting integral floats such as `7.0`.
fn integral_id(number: &Number) -> Option<EntityId> {
    number.as_i64().or_else(|| number.as_f64().and_then(integral_float))
}

fn parse_numeric_id(text: &str) -> Option<EntityId> {
    match text.parse::<EntityId>() {
        Ok(id) => Some(id),
        Err(_) => text.parse::<f64>().ok().and_then(integral_float),
    }
}

fn integral_float(real: f64) -> Option<EntityId> {
    let in_range = real >= EntityId::MIN as f64 && real < EntityId::MAX as f64;
    (real.fract() == 0.0 && in_range).then_some(real as EntityId)
}

#[cfg(test)]
mod tests {
    use super::{truthy_id, FindOrCreateInput};
    use crate::error::FacadeError;
    use serde_json::json;

    #[test]
    fn value_conversion_covers_the_four_shapes() {
        assert_eq!(
            FindOrCreateInput::try_from(json!(null)).unwrap(),
            FindOrCreateInput::Null
        );
        assert_eq!(
            FindOrCreateInput::try_from(json!("{}")).unwrap(),
            FindOrCreateInput::Serialized("{}".to_string())
        );
        assert_eq!(
            FindOrCreateInput::try_from(json!(42)).unwrap(),
            FindOrCreateInput::Id(42)
        );
        assert_eq!(
            FindOrCreateInput::try_from(json!(42.0)).unwrap(),
            FindOrCreateInput::Id(42)
        );
        assert!(matches!(
            FindOrCreateInput::try_from(json!({"name": "x"})).unwrap(),
            FindOrCreateInput::Properties(_)
        ));
    }

    #[test]
    fn value_conversion_rejects_other_shapes() {
        for value in [json!(true), json!([1, 2]), json!(4.5)] {
            assert!(matches!(
                FindOrCreateInput::try_from(value),
                Err(FacadeError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn truthy_id_follows_loose_truthiness() {
        assert_eq!(truthy_id(None).unwrap(), None);
        assert_eq!(truthy_id(Some(&json!(0))).unwrap(), None);
        assert_eq!(truthy_id(Some(&json!("0"))).unwrap(), None);
        assert_eq!(truthy_id(Some(&json!(""))).unwrap(), None);
        assert_eq!(truthy_id(Some(&json!(false))).unwrap(), None);
        assert_eq!(truthy_id(Some(&json!(7))).unwrap(), Some(7));
        assert_eq!(truthy_id(Some(&json!("12"))).unwrap(), Some(12));
        assert_eq!(truthy_id(Some(&json!(7.0))).unwrap(), Some(7));
        assert_eq!(truthy_id(Some(&json!("7.0"))).unwrap(), Some(7));
        assert_eq!(truthy_id(Some(&json!(0.0))).unwrap(), None);
        assert!(truthy_id(Some(&json!("7.5"))).is_err());
        assert!(truthy_id(Some(&json!("NaN"))).is_err());
        assert!(truthy_id(Some(&json!(1e300))).is_err());
        assert!(truthy_id(Some(&json!("abc"))).is_err());
        assert!(truthy_id(Some(&json!(true))).is_err());
    }

    #[test]
    fn optional_values_map_none_to_null() {
        assert_eq!(FindOrCreateInput::from(None::<i64>), FindOrCreateInput::Null);
        assert_eq!(FindOrCreateInput::from(Some(3_i64)), FindOrCreateInput::Id(3));
    }
}
