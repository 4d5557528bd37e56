//! JSON body encoding and decoding.
//!
//! Encoding runs through compiled procedures that honor field tags and
//! presence wrappers. Decoding is serde-driven; types registered in the
//! [`UnionRegistry`] resolve through it, both at the root and, via
//! [`crate::union::deserialize`], inside other types.
//!
//! Encoding reads wire names from `json:"..."` field tags while decoding
//! goes through the type's `Deserialize` impl. A type used in both
//! directions declares each wire name twice, once in its tag and once as a
//! serde rename, and the two must agree:
//!
//! ```ignore
//! #[derive(Deserialize)]
//! struct Session {
//!     #[serde(rename = "parentID", default)]
//!     parent_id: Option<String>,
//! }
//!
//! // .field("parent_id", r#"json:"parentID""#, |session| &session.parent_id)
//! ```
//!
//! `Presence<T>` fields additionally need
//! `#[serde(default, skip_serializing_if = "Presence::is_absent")]`.

use std::any::{type_name, Any};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::cache::Gate;
use crate::codec::{format_time, Codec, StructField};
use crate::context::{DateFormat, EncodeContext};
use crate::error::CodecError;
use crate::shape::{PresenceView, Reflect, Shape, StructShape, TimeFn, TypeInfo};
use crate::tag::TagTarget;
use crate::union::UnionRegistry;

/// Compiled JSON procedure. `Ok(None)` means "omit": an empty optional or an
/// absent presence wrapper.
pub(crate) type JsonEncoder =
    Arc<dyn Fn(&Codec, &dyn Any) -> Result<Option<Value>, CodecError> + Send + Sync>;

pub fn to_value<T: Reflect>(value: &T) -> Result<Value, CodecError> {
    Codec::global().to_json_value(value, EncodeContext::default())
}

pub fn to_vec<T: Reflect>(value: &T) -> Result<Vec<u8>, CodecError> {
    Codec::global().to_json_vec(value, EncodeContext::default())
}

pub fn to_string<T: Reflect>(value: &T) -> Result<String, CodecError> {
    let body = to_value(value)?;
    serde_json::to_string(&body).map_err(CodecError::Serialize)
}

pub fn from_value<T: DeserializeOwned + 'static>(value: Value) -> Result<T, CodecError> {
    let registry = UnionRegistry::global();
    if registry.contains::<T>() {
        return registry.resolve::<T>(value);
    }
    serde_json::from_value(value).map_err(|source| CodecError::malformed(type_name::<T>(), source))
}

pub fn from_slice<T: DeserializeOwned + 'static>(bytes: &[u8]) -> Result<T, CodecError> {
    let registry = UnionRegistry::global();
    if registry.contains::<T>() {
        let raw: Value = serde_json::from_slice(bytes)
            .map_err(|source| CodecError::malformed(type_name::<T>(), source))?;
        return registry.resolve::<T>(raw);
    }
    serde_json::from_slice(bytes).map_err(|source| CodecError::malformed(type_name::<T>(), source))
}

pub fn from_str<T: DeserializeOwned + 'static>(input: &str) -> Result<T, CodecError> {
    from_slice(input.as_bytes())
}

pub(crate) fn placeholder(gate: Arc<Gate<JsonEncoder>>) -> JsonEncoder {
    Arc::new(move |codec, value| {
        let resolved = gate
            .wait()
            .unwrap_or_else(|_| codec.json_encoder(gate.type_info(), gate.context()));
        resolved(codec, value)
    })
}

pub(crate) fn compile(codec: &Codec, ty: TypeInfo, context: EncodeContext) -> JsonEncoder {
    let shape = ty.shape();
    if let Shape::Time(read) = shape {
        return time_encoder(read, context.date_format);
    }
    if !context.is_root() {
        if let Some(hook) = ty.hooks().json {
            return Arc::new(move |_, value| hook(value).map(Some));
        }
    }

    let context = context.nested();
    match shape {
        Shape::Scalar(read) => Arc::new(move |_, value| match read(value) {
            Some(scalar) => scalar.to_json().map(Some),
            None => Ok(None),
        }),
        Shape::Time(read) => time_encoder(read, context.date_format),
        Shape::Pointer { elem, deref } => {
            let inner = codec.json_encoder(elem, context);
            Arc::new(move |codec, value| match deref(value) {
                Some(target) => inner(codec, target),
                None => Ok(None),
            })
        }
        Shape::Presence { inner, view } => {
            let inner = codec.json_encoder(inner, context);
            Arc::new(move |codec, value| match view(value) {
                PresenceView::Absent => Ok(None),
                PresenceView::Null => Ok(Some(Value::Null)),
                PresenceView::Present(target) => {
                    Ok(Some(inner(codec, target)?.unwrap_or(Value::Null)))
                }
                PresenceView::Raw(raw) => Ok(Some(raw.clone())),
            })
        }
        Shape::Struct(shape) => struct_encoder(codec, &shape, context),
        Shape::Seq { elem, items } => {
            let inner = codec.json_encoder(elem, context);
            Arc::new(move |codec, value| {
                let mut array = Vec::new();
                for item in items(value) {
                    array.push(inner(codec, item)?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(array)))
            })
        }
        Shape::Map {
            key: key_ty,
            value: value_ty,
            entries,
        } => {
            let key_encoder = codec.json_encoder(key_ty, context);
            let value_encoder = codec.json_encoder(value_ty, context);
            Arc::new(move |codec, value| {
                let mut object = Map::new();
                for (entry_key, entry_value) in entries(value) {
                    let rendered = match key_encoder(codec, entry_key)? {
                        Some(Value::String(key)) => key,
                        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => scalar.to_string(),
                        other => {
                            return Err(CodecError::NonPrimitiveMapKey {
                                type_name: key_ty.name(),
                                found: describe(other.as_ref()).to_owned(),
                            })
                        }
                    };
                    let encoded = value_encoder(codec, entry_value)?;
                    object.insert(rendered, encoded.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Object(object)))
            })
        }
        Shape::Dynamic(target) => Arc::new(move |codec, value| match target(value) {
            Some(dynamic) => {
                let encoder = codec.json_encoder(dynamic.type_info(), context);
                encoder(codec, dynamic.as_any())
            }
            None => Ok(None),
        }),
    }
}

fn time_encoder(read: TimeFn, format: DateFormat) -> JsonEncoder {
    Arc::new(move |_, value| match read(value) {
        Some(timestamp) => Ok(Some(Value::String(format_time(timestamp, format)?))),
        None => Ok(None),
    })
}

struct CompiledField {
    field: StructField,
    encoder: JsonEncoder,
}

fn struct_encoder(codec: &Codec, shape: &StructShape, context: EncodeContext) -> JsonEncoder {
    let fields: Vec<CompiledField> = StructField::collect(shape, TagTarget::Json)
        .into_iter()
        .map(|field| CompiledField {
            encoder: codec.json_encoder(field.ty, field.context(context)),
            field,
        })
        .collect();

    Arc::new(move |codec, value| {
        let mut object = Map::new();
        for CompiledField { field, encoder } in &fields {
            let encoded = match (field.get)(value) {
                Some(target) => encoder(codec, target)?,
                None => None,
            };
            let Some(encoded) = encoded else {
                if field.tag.required {
                    return Err(CodecError::required(field.tag.name.as_str()));
                }
                continue;
            };
            if field.tag.omit_empty && is_empty(&encoded) {
                continue;
            }
            if field.tag.inline {
                match encoded {
                    Value::Object(entries) => object.extend(entries),
                    _ => {
                        return Err(CodecError::InlineNotObject {
                            field: field.tag.name.clone(),
                        })
                    }
                }
                continue;
            }
            object.insert(field.tag.name.clone(), encoded);
        }
        Ok(Some(Value::Object(object)))
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
    }
}

fn describe(value: Option<&Value>) -> &'static str {
    match value {
        None => "nothing",
        Some(Value::Null) => "null",
        Some(Value::Array(_)) => "an array",
        Some(Value::Object(_)) => "an object",
        Some(_) => "a scalar",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{describe, is_empty};

    #[test]
    fn emptiness_follows_zero_values() {
        for value in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(is_empty(&value), "{value} should be empty");
        }
        for value in [json!(true), json!(1), json!("x"), json!([0]), json!({ "a": null })] {
            assert!(!is_empty(&value), "{value} should not be empty");
        }
    }

    #[test]
    fn describe_names_non_scalar_keys() {
        assert_eq!(describe(None), "nothing");
        assert_eq!(describe(Some(&json!({ "a": 1 }))), "an object");
        assert_eq!(describe(Some(&json!([1]))), "an array");
    }
}
