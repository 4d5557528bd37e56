//! Decode-time resolution of polymorphic (union) types.
//!
//! An abstract type `A` registers an ordered list of [`Variant`]s, each
//! naming the raw JSON shape it accepts, an optional discriminator value and
//! the concrete type to decode into. Resolution narrows by shape first, then
//! by discriminator, and requires exactly one survivor.
//!
//! Registration happens once per abstract type, before the first decode that
//! needs it. It is safe to register from many threads; a later registration
//! of the same abstract type replaces the earlier one.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::de::{self, Deserialize, DeserializeOwned, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::CodecError;

static GLOBAL: Lazy<UnionRegistry> = Lazy::new(UnionRegistry::new);

/// Structural class of a raw JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonShape {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

impl JsonShape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Bool,
            Value::Null => Self::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for JsonShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type DecodeFn<A> = fn(Value) -> Result<A, CodecError>;

/// One concrete alternative of the abstract type `A`.
pub struct Variant<A> {
    shape: JsonShape,
    discriminator: Option<Value>,
    fallback: bool,
    type_name: &'static str,
    decode: DecodeFn<A>,
}

impl<A> Clone for Variant<A> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            discriminator: self.discriminator.clone(),
            fallback: self.fallback,
            type_name: self.type_name,
            decode: self.decode,
        }
    }
}

impl<A> fmt::Debug for Variant<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("shape", &self.shape)
            .field("discriminator", &self.discriminator)
            .field("fallback", &self.fallback)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl<A: 'static> Variant<A> {
    /// Matches any raw value of `shape`.
    pub fn new<T>(shape: JsonShape) -> Self
    where
        T: DeserializeOwned + Into<A> + 'static,
    {
        Self {
            shape,
            discriminator: None,
            fallback: false,
            type_name: type_name::<T>(),
            decode: decode_variant::<T, A>,
        }
    }

    /// Matches raw values of `shape` whose discriminator field equals
    /// `value`.
    pub fn tagged<T>(shape: JsonShape, value: impl Into<Value>) -> Self
    where
        T: DeserializeOwned + Into<A> + 'static,
    {
        Self {
            discriminator: Some(value.into()),
            ..Self::new::<T>(shape)
        }
    }

    /// Used when no other variant of `shape` survives discriminator
    /// filtering, e.g. for discriminator values added server-side later.
    pub fn fallback<T>(shape: JsonShape) -> Self
    where
        T: DeserializeOwned + Into<A> + 'static,
    {
        Self {
            fallback: true,
            ..Self::new::<T>(shape)
        }
    }

    pub fn shape(&self) -> JsonShape {
        self.shape
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

fn decode_variant<T, A>(raw: Value) -> Result<A, CodecError>
where
    T: DeserializeOwned + Into<A> + 'static,
{
    serde_json::from_value::<T>(raw)
        .map(Into::into)
        .map_err(|source| CodecError::malformed(type_name::<T>(), source))
}

struct UnionEntry<A> {
    discriminator: Option<&'static str>,
    variants: Vec<Variant<A>>,
}

/// Table from abstract type to its variants.
pub struct UnionRegistry {
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Default for UnionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registry consulted by [`crate::json`] decoding and [`deserialize`].
    pub fn global() -> &'static UnionRegistry {
        &GLOBAL
    }

    /// Adds or replaces the variants of `A`.
    ///
    /// Two variants accepting the same shape and discriminator value could
    /// never be told apart, so such a list is rejected.
    pub fn register<A: 'static>(
        &self,
        discriminator: Option<&'static str>,
        variants: Vec<Variant<A>>,
    ) -> Result<(), CodecError> {
        for (index, variant) in variants.iter().enumerate() {
            let duplicate = variants[..index].iter().any(|earlier| {
                earlier.shape == variant.shape
                    && earlier.fallback == variant.fallback
                    && earlier.discriminator == variant.discriminator
            });
            if duplicate {
                return Err(CodecError::AmbiguousVariants {
                    type_name: type_name::<A>(),
                    shape: variant.shape,
                    discriminator: variant.discriminator.as_ref().map(render),
                });
            }
        }

        debug!(
            type_name = type_name::<A>(),
            discriminator = discriminator.unwrap_or("<none>"),
            variants = variants.len(),
            "registering union"
        );
        let entry: Arc<dyn Any + Send + Sync> = Arc::new(UnionEntry {
            discriminator,
            variants,
        });
        self.entries.write().insert(TypeId::of::<A>(), entry);
        Ok(())
    }

    pub fn contains<A: 'static>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<A>())
    }

    /// Selects the variant of `A` matching `raw` and decodes into it.
    pub fn resolve<A: 'static>(&self, raw: Value) -> Result<A, CodecError> {
        let entry = self.entry::<A>().ok_or(CodecError::UnregisteredUnion {
            type_name: type_name::<A>(),
        })?;

        let shape = JsonShape::of(&raw);
        let mut candidates: Vec<&Variant<A>> = entry
            .variants
            .iter()
            .filter(|variant| variant.shape == shape && !variant.fallback)
            .collect();
        let fallback = entry
            .variants
            .iter()
            .find(|variant| variant.shape == shape && variant.fallback);

        let mut observed = None;
        if let Some(key) = entry.discriminator {
            if candidates.len() > 1 || fallback.is_some() {
                observed = raw.get(key).cloned();
                candidates.retain(|variant| match (&variant.discriminator, &observed) {
                    (Some(expected), Some(found)) => scalar_eq(expected, found),
                    _ => false,
                });
            }
        }

        if candidates.is_empty() {
            if let Some(fallback) = fallback {
                candidates.push(fallback);
            }
        }

        match candidates.as_slice() {
            [variant] => (variant.decode)(raw),
            _ => Err(CodecError::UnresolvableVariant {
                type_name: type_name::<A>(),
                shape,
                discriminator: observed.as_ref().map(render),
                candidates: candidates.len(),
            }),
        }
    }

    fn entry<A: 'static>(&self) -> Option<Arc<UnionEntry<A>>> {
        let entry = self.entries.read().get(&TypeId::of::<A>()).cloned()?;
        entry.downcast::<UnionEntry<A>>().ok()
    }
}

/// `Deserialize` body for abstract types registered in the global registry:
///
/// ```ignore
/// impl<'de> Deserialize<'de> for SessionError {
///     fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
///         apiwire::union::deserialize(deserializer)
///     }
/// }
/// ```
pub fn deserialize<'de, A, D>(deserializer: D) -> Result<A, D::Error>
where
    A: 'static,
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    UnionRegistry::global()
        .resolve::<A>(raw)
        .map_err(de::Error::custom)
}

/// Discriminators compare by value: numbers numerically, everything else
/// structurally.
fn scalar_eq(expected: &Value, found: &Value) -> bool {
    match (expected, found) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => expected == found,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
