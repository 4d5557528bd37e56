//! Query-string encoding.
//!
//! Values flatten into an ordered list of [`Pair`]s. Struct fields follow
//! declaration order, sequences follow the configured [`ArrayFormat`] and
//! nested keys follow the configured [`NestedFormat`].

use std::any::Any;
use std::sync::Arc;

use url::form_urlencoded;

use crate::cache::Gate;
use crate::codec::{format_time, Codec, StructField};
use crate::context::{ArrayFormat, DateFormat, EncodeContext, NestedFormat};
use crate::error::CodecError;
use crate::shape::{ItemsFn, PresenceView, Reflect, Shape, StructShape, TimeFn, TypeInfo};
use crate::tag::TagTarget;

/// One flattened `key=value` entry of a query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for Pair {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

/// Compiled query procedure: `(codec, key, value) -> pairs`.
pub(crate) type QueryEncoder =
    Arc<dyn Fn(&Codec, &str, &dyn Any) -> Result<Vec<Pair>, CodecError> + Send + Sync>;

/// Encodes `value` with the process-wide codec and default settings.
pub fn encode<T: Reflect>(value: &T) -> Result<Vec<Pair>, CodecError> {
    Codec::global().encode_query(value, "", EncodeContext::default())
}

/// Encodes `value` and renders the result as a percent-encoded query string.
pub fn to_string<T: Reflect>(value: &T, context: EncodeContext) -> Result<String, CodecError> {
    let pairs = Codec::global().encode_query(value, "", context)?;
    Ok(to_query_string(&pairs))
}

/// Percent-encodes `pairs` in order, keeping duplicate keys.
pub fn to_query_string(pairs: &[Pair]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for pair in pairs {
        serializer.append_pair(&pair.key, &pair.value);
    }
    serializer.finish()
}

pub(crate) fn placeholder(gate: Arc<Gate<QueryEncoder>>) -> QueryEncoder {
    Arc::new(move |codec, key, value| {
        let resolved = gate
            .wait()
            .unwrap_or_else(|_| codec.query_encoder(gate.type_info(), gate.context()));
        resolved(codec, key, value)
    })
}

pub(crate) fn compile(codec: &Codec, ty: TypeInfo, context: EncodeContext) -> QueryEncoder {
    let shape = ty.shape();
    if let Shape::Time(read) = shape {
        return time_encoder(read, context.date_format);
    }
    if !context.is_root() {
        if let Some(hook) = ty.hooks().query {
            return Arc::new(move |_, key, value| hook(value, key));
        }
    }

    let context = context.nested();
    match shape {
        Shape::Scalar(read) => Arc::new(move |_, key, value| {
            Ok(read(value)
                .map(|scalar| vec![Pair::new(key, scalar.to_query_value())])
                .unwrap_or_default())
        }),
        Shape::Time(read) => time_encoder(read, context.date_format),
        Shape::Pointer { elem, deref } => {
            let inner = codec.query_encoder(elem, context);
            Arc::new(move |codec, key, value| match deref(value) {
                Some(target) => inner(codec, key, target),
                None => Ok(Vec::new()),
            })
        }
        Shape::Presence { inner, view } => {
            let inner = codec.query_encoder(inner, context);
            Arc::new(move |codec, key, value| match view(value) {
                PresenceView::Absent | PresenceView::Null => Ok(Vec::new()),
                PresenceView::Present(target) => inner(codec, key, target),
                PresenceView::Raw(raw) => {
                    let encoder = codec.query_encoder(TypeInfo::of::<serde_json::Value>(), context);
                    encoder(codec, key, raw)
                }
            })
        }
        Shape::Struct(shape) => struct_encoder(codec, &shape, context),
        Shape::Seq { elem, items } => seq_encoder(codec, elem, items, context),
        Shape::Map {
            key: key_ty,
            value: value_ty,
            entries,
        } => {
            let key_encoder = codec.query_encoder(key_ty, context);
            let value_encoder = codec.query_encoder(value_ty, context);
            let nested = context.nested_format;
            Arc::new(move |codec, key, value| {
                let mut pairs = Vec::new();
                for (entry_key, entry_value) in entries(value) {
                    let rendered = match key_encoder(codec, "", entry_key)?.as_slice() {
                        [single] => single.value.clone(),
                        other => {
                            return Err(CodecError::NonPrimitiveMapKey {
                                type_name: key_ty.name(),
                                found: format!("{} pairs", other.len()),
                            })
                        }
                    };
                    let entry_key = nested.join(key, &rendered);
                    pairs.extend(value_encoder(codec, &entry_key, entry_value)?);
                }
                Ok(pairs)
            })
        }
        Shape::Dynamic(target) => Arc::new(move |codec, key, value| match target(value) {
            Some(dynamic) => {
                let encoder = codec.query_encoder(dynamic.type_info(), context);
                encoder(codec, key, dynamic.as_any())
            }
            None => Ok(Vec::new()),
        }),
    }
}

fn time_encoder(read: TimeFn, format: DateFormat) -> QueryEncoder {
    Arc::new(move |_, key, value| match read(value) {
        Some(timestamp) => Ok(vec![Pair::new(key, format_time(timestamp, format)?)]),
        None => Ok(Vec::new()),
    })
}

struct CompiledField {
    field: StructField,
    encoder: QueryEncoder,
}

fn struct_encoder(
    codec: &Codec,
    shape: &StructShape,
    context: EncodeContext,
) -> QueryEncoder {
    let fields: Vec<CompiledField> = StructField::collect(shape, TagTarget::Query)
        .into_iter()
        .map(|field| {
            let field_context = field.context(context);
            CompiledField {
                encoder: codec.query_encoder(field.ty, field_context),
                field,
            }
        })
        .collect();
    let nested = context.nested_format;

    Arc::new(move |codec, key, value| {
        let mut pairs = Vec::new();
        for CompiledField { field, encoder } in &fields {
            let child_key = field_key(nested, key, field);
            let Some(target) = (field.get)(value) else {
                continue;
            };
            let mut encoded = encoder(codec, &child_key, target)?;
            if field.tag.omit_empty {
                encoded.retain(|pair| !pair.value.is_empty());
            }
            if encoded.is_empty() && field.tag.required {
                return Err(CodecError::required(child_key));
            }
            pairs.append(&mut encoded);
        }
        Ok(pairs)
    })
}

fn field_key(nested: NestedFormat, parent: &str, field: &StructField) -> String {
    if field.tag.inline {
        parent.to_owned()
    } else {
        nested.join(parent, &field.tag.name)
    }
}

fn seq_encoder(
    codec: &Codec,
    elem: TypeInfo,
    items: ItemsFn,
    context: EncodeContext,
) -> QueryEncoder {
    let inner = codec.query_encoder(elem, context);
    match context.array_format {
        ArrayFormat::Comma => Arc::new(move |codec, key, value| {
            let mut joined = Vec::new();
            for item in items(value) {
                joined.extend(inner(codec, "", item)?.into_iter().map(|pair| pair.value));
            }
            if joined.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![Pair::new(key, joined.join(","))])
        }),
        ArrayFormat::Repeat => Arc::new(move |codec, key, value| {
            let mut pairs = Vec::new();
            for item in items(value) {
                pairs.extend(inner(codec, key, item)?);
            }
            Ok(pairs)
        }),
        ArrayFormat::Brackets => Arc::new(move |codec, key, value| {
            let key = format!("{key}[]");
            let mut pairs = Vec::new();
            for item in items(value) {
                pairs.extend(inner(codec, &key, item)?);
            }
            Ok(pairs)
        }),
        ArrayFormat::Indices => Arc::new(|_, key, _| {
            Err(CodecError::UnsupportedArrayFormat {
                format: ArrayFormat::Indices.as_str(),
                key: key.to_owned(),
            })
        }),
    }
}
