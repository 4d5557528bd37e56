use once_cell::sync::Lazy;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::cache::EncoderCache;
use crate::context::{DateFormat, EncodeContext};
use crate::error::CodecError;
use crate::json::{self, JsonEncoder};
use crate::query::{self, Pair, QueryEncoder};
use crate::shape::{compose, FieldGetter, Reflect, Shape, StructShape, TypeInfo};
use crate::tag::{self, FieldTag, TagTarget};

static GLOBAL: Lazy<Codec> = Lazy::new(Codec::new);

/// Owner of the compiled encoder caches.
///
/// Most callers use [`Codec::global`]. A private instance starts with empty
/// caches, which is what tests observing compilation counts want.
pub struct Codec {
    query: EncoderCache<QueryEncoder>,
    json: EncoderCache<JsonEncoder>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    pub fn new() -> Self {
        Self {
            query: EncoderCache::new(query::placeholder),
            json: EncoderCache::new(json::placeholder),
        }
    }

    /// Process-wide instance, created on first use.
    pub fn global() -> &'static Codec {
        &GLOBAL
    }

    /// Flattens `value` into query pairs nested under `root_key`.
    ///
    /// An empty `root_key` puts top-level fields at the root of the query.
    pub fn encode_query<T: Reflect>(
        &self,
        value: &T,
        root_key: &str,
        context: EncodeContext,
    ) -> Result<Vec<Pair>, CodecError> {
        let encoder = self.query_encoder(TypeInfo::of::<T>(), context.as_root());
        encoder(self, root_key, value)
    }

    /// Encodes `value` as a JSON body. A root that encodes to nothing becomes
    /// `null`.
    pub fn to_json_value<T: Reflect>(
        &self,
        value: &T,
        context: EncodeContext,
    ) -> Result<Value, CodecError> {
        let encoder = self.json_encoder(TypeInfo::of::<T>(), context.as_root());
        Ok(encoder(self, value)?.unwrap_or(Value::Null))
    }

    pub fn to_json_vec<T: Reflect>(
        &self,
        value: &T,
        context: EncodeContext,
    ) -> Result<Vec<u8>, CodecError> {
        let body = self.to_json_value(value, context)?;
        serde_json::to_vec(&body).map_err(CodecError::Serialize)
    }

    /// How many times an encoder for `T` was compiled, over both wire formats
    /// and every context.
    pub fn compilations<T: Reflect>(&self) -> usize {
        let ty = TypeInfo::of::<T>();
        self.query.compilations(ty) + self.json.compilations(ty)
    }

    pub(crate) fn query_encoder(&self, ty: TypeInfo, context: EncodeContext) -> QueryEncoder {
        self.query
            .get_or_compile(ty, context, || query::compile(self, ty, context))
    }

    pub(crate) fn json_encoder(&self, ty: TypeInfo, context: EncodeContext) -> JsonEncoder {
        self.json
            .get_or_compile(ty, context, || json::compile(self, ty, context))
    }
}

/// A struct field resolved for one wire format: tag parsed, embedded
/// structs expanded in place.
#[derive(Clone)]
pub(crate) struct StructField {
    pub(crate) tag: FieldTag,
    pub(crate) ty: TypeInfo,
    pub(crate) get: FieldGetter,
}

impl StructField {
    pub(crate) fn collect(shape: &StructShape, target: TagTarget) -> Vec<Self> {
        let mut fields = Vec::new();
        collect_into(shape, target, None, &mut fields);
        fields
    }

    /// Context for this field's encoder; a `format` tag only affects the
    /// field it is declared on.
    pub(crate) fn context(&self, context: EncodeContext) -> EncodeContext {
        match self.tag.date_format {
            Some(date_format) => context.with_date_format(date_format),
            None => context,
        }
    }
}

fn collect_into(
    shape: &StructShape,
    target: TagTarget,
    prefix: Option<&FieldGetter>,
    out: &mut Vec<StructField>,
) {
    for field in shape.fields() {
        let get = match prefix {
            Some(outer) => compose(outer.clone(), field.get.clone()),
            None => field.get.clone(),
        };

        if field.is_embedded() {
            if let Shape::Struct(embedded) = field.type_info().shape() {
                collect_into(&embedded, target, Some(&get), out);
                continue;
            }
        }

        let Some(tag) = tag::parse(field.tag(), target, field.name()) else {
            continue;
        };
        out.push(StructField {
            tag,
            ty: field.type_info(),
            get,
        });
    }
}

pub(crate) fn format_time(
    timestamp: OffsetDateTime,
    format: DateFormat,
) -> Result<String, CodecError> {
    match format {
        DateFormat::DateTime => timestamp.format(&Rfc3339).map_err(CodecError::TimeFormat),
        DateFormat::Date => Ok(format!(
            "{:04}-{:02}-{:02}",
            timestamp.year(),
            u8::from(timestamp.month()),
            timestamp.day()
        )),
    }
}
