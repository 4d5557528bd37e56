use std::any::Any;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use crate::shape::{PresenceView, Reflect, Shape, TypeInfo};

/// A request field that distinguishes "not sent" from "sent as null".
///
/// `Absent` fields produce no query pairs and no JSON key. `Null` fields
/// produce no query pairs and an explicit `null` in JSON. `Raw` replaces the
/// typed value with an arbitrary JSON payload, emitted verbatim.
///
/// Struct fields of this type should be declared with
/// `#[serde(default, skip_serializing_if = "Presence::is_absent")]` when the
/// struct also derives serde traits, so that serde and the codec agree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Presence<T> {
    #[default]
    Absent,
    Null,
    Present(T),
    Raw(Value),
}

impl<T> Presence<T> {
    pub fn omit() -> Self {
        Self::Absent
    }

    pub fn null() -> Self {
        Self::Null
    }

    pub fn value(value: T) -> Self {
        Self::Present(value)
    }

    /// Sends `raw` instead of any typed value.
    pub fn raw(raw: impl Into<Value>) -> Self {
        Self::Raw(raw.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Self::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<T> for Presence<T> {
    fn from(value: T) -> Self {
        Self::Present(value)
    }
}

impl<T: Serialize> Serialize for Presence<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent | Self::Null => serializer.serialize_none(),
            Self::Present(value) => value.serialize(serializer),
            Self::Raw(raw) => raw.serialize(serializer),
        }
    }
}

/// A missing key never reaches this impl; pair it with `#[serde(default)]`
/// to decode absence as [`Presence::Absent`].
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Presence<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Self::Present(value),
            None => Self::Null,
        })
    }
}

impl<T: Reflect> Reflect for Presence<T> {
    fn shape() -> Shape {
        Shape::Presence {
            inner: TypeInfo::of::<T>(),
            view: presence_view::<T>,
        }
    }
}

fn presence_view<T: Reflect>(value: &dyn Any) -> PresenceView<'_> {
    match value.downcast_ref::<Presence<T>>() {
        Some(Presence::Present(inner)) => PresenceView::Present(inner),
        Some(Presence::Raw(raw)) => PresenceView::Raw(raw),
        Some(Presence::Null) => PresenceView::Null,
        Some(Presence::Absent) | None => PresenceView::Absent,
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::Presence;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Update {
        #[serde(default, skip_serializing_if = "Presence::is_absent")]
        title: Presence<String>,
    }

    #[test]
    fn serde_keeps_three_states_apart() {
        let absent: Update = serde_json::from_value(json!({})).expect("absent");
        assert_eq!(absent.title, Presence::Absent);

        let null: Update = serde_json::from_value(json!({ "title": null })).expect("null");
        assert_eq!(null.title, Presence::Null);

        let value: Update = serde_json::from_value(json!({ "title": "x" })).expect("value");
        assert_eq!(value.title, Presence::value("x".to_owned()));

        assert_eq!(serde_json::to_value(&absent).expect("ser"), json!({}));
        assert_eq!(
            serde_json::to_value(&null).expect("ser"),
            json!({ "title": null })
        );
    }

    #[test]
    fn raw_override_serializes_verbatim() {
        let update = Update {
            title: Presence::raw(json!({ "x": 1 })),
        };
        assert_eq!(
            serde_json::to_value(&update).expect("ser"),
            json!({ "title": { "x": 1 } })
        );
    }
}
