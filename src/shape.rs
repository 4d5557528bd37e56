//! Static shape descriptions for encodable types.
//!
//! Every encodable type implements [`Reflect`] and describes itself with one
//! [`Shape`] variant. The encoder compilers dispatch on that description once
//! per type and context; values are then reached through the type-erased
//! accessors stored in the shape.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::CodecError;
use crate::query::Pair;

/// A type the codec can compile an encoder for.
pub trait Reflect: DynReflect {
    fn shape() -> Shape
    where
        Self: Sized;

    /// Custom marshal capabilities. Consulted for every value except the one
    /// handed to the codec at the root of an encode call.
    fn hooks() -> Hooks
    where
        Self: Sized,
    {
        Hooks::default()
    }
}

/// Object-safe half of [`Reflect`], used to redispatch dynamic values.
pub trait DynReflect: Any + Send + Sync {
    fn type_info(&self) -> TypeInfo;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Reflect> DynReflect for T {
    fn type_info(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Identity and shape constructor of a [`Reflect`] type.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
    shape: fn() -> Shape,
    hooks: fn() -> Hooks,
}

impl TypeInfo {
    pub fn of<T: Reflect>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            shape: T::shape,
            hooks: T::hooks,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> Shape {
        (self.shape)()
    }

    pub fn hooks(&self) -> Hooks {
        (self.hooks)()
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeInfo").field(&self.name).finish()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

pub type QueryHook = fn(&dyn Any, &str) -> Result<Vec<Pair>, CodecError>;
pub type JsonHook = fn(&dyn Any) -> Result<Value, CodecError>;

/// Custom marshal capabilities of a type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hooks {
    /// Produces the pairs for a value under the given key.
    pub query: Option<QueryHook>,
    /// Produces the JSON body for a value.
    pub json: Option<JsonHook>,
}

/// A primitive value read out of a scalar-shaped type.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar<'a> {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(&'a str),
}

impl Scalar<'_> {
    /// Rendering used in query strings.
    pub fn to_query_value(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Uint(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Str(value) => (*value).to_owned(),
        }
    }

    pub fn to_json(&self) -> Result<Value, CodecError> {
        Ok(match self {
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::from(*value),
            Self::Uint(value) => Value::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .ok_or(CodecError::NonFiniteFloat { value: *value })?,
            Self::Str(value) => Value::String((*value).to_owned()),
        })
    }
}

pub type ScalarFn = for<'a> fn(&'a dyn Any) -> Option<Scalar<'a>>;
pub type TimeFn = fn(&dyn Any) -> Option<OffsetDateTime>;
pub type DerefFn = for<'a> fn(&'a dyn Any) -> Option<&'a dyn Any>;
pub type ItemsFn = for<'a> fn(&'a dyn Any) -> Vec<&'a dyn Any>;
pub type EntriesFn = for<'a> fn(&'a dyn Any) -> Vec<(&'a dyn Any, &'a dyn Any)>;
pub type DynamicFn = for<'a> fn(&'a dyn Any) -> Option<&'a dyn DynReflect>;
pub type PresenceFn = for<'a> fn(&'a dyn Any) -> PresenceView<'a>;

/// Accessor from a struct value to one of its fields.
pub type FieldGetter = Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;

/// Structural kind of a type, with type-erased accessors for its values.
pub enum Shape {
    Scalar(ScalarFn),
    /// A timestamp; rendered with the active date format.
    Time(TimeFn),
    /// `Option`, `Box` and other single-slot indirections. `None` encodes as
    /// nothing.
    Pointer { elem: TypeInfo, deref: DerefFn },
    Struct(StructShape),
    Seq { elem: TypeInfo, items: ItemsFn },
    Map {
        key: TypeInfo,
        value: TypeInfo,
        entries: EntriesFn,
    },
    /// A value whose concrete type is only known at runtime.
    Dynamic(DynamicFn),
    /// A tri-state field wrapper with an optional raw override.
    Presence { inner: TypeInfo, view: PresenceFn },
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Time(_) => "time",
            Self::Pointer { .. } => "pointer",
            Self::Struct(_) => "struct",
            Self::Seq { .. } => "seq",
            Self::Map { .. } => "map",
            Self::Dynamic(_) => "dynamic",
            Self::Presence { .. } => "presence",
        }
    }
}

/// Observed state of a presence wrapper.
pub enum PresenceView<'a> {
    Absent,
    Null,
    Present(&'a dyn Any),
    Raw(&'a Value),
}

/// One declared struct field.
#[derive(Clone)]
pub struct FieldShape {
    pub(crate) name: &'static str,
    pub(crate) tag: &'static str,
    pub(crate) ty: TypeInfo,
    pub(crate) embedded: bool,
    pub(crate) get: FieldGetter,
}

impl FieldShape {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn type_info(&self) -> TypeInfo {
        self.ty
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }
}

/// Declared fields of a struct, in declaration order.
#[derive(Clone, Default)]
pub struct StructShape {
    pub(crate) fields: Vec<FieldShape>,
}

impl StructShape {
    pub fn builder<S: Reflect>() -> StructBuilder<S> {
        StructBuilder {
            fields: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }
}

/// Declares the fields of `S`.
///
/// ```
/// use apiwire::{Reflect, Shape, StructShape};
///
/// struct Page {
///     limit: Option<u32>,
/// }
///
/// impl Reflect for Page {
///     fn shape() -> Shape {
///         StructShape::builder::<Self>()
///             .field("limit", r#"query:"limit" json:"limit""#, |page| &page.limit)
///             .build()
///     }
/// }
/// ```
pub struct StructBuilder<S> {
    fields: Vec<FieldShape>,
    _marker: PhantomData<fn() -> S>,
}

impl<S: Reflect> StructBuilder<S> {
    pub fn field<F: Reflect>(
        mut self,
        name: &'static str,
        tag: &'static str,
        get: fn(&S) -> &F,
    ) -> Self {
        self.fields.push(FieldShape {
            name,
            tag,
            ty: TypeInfo::of::<F>(),
            embedded: false,
            get: field_getter(get),
        });
        self
    }

    /// Declares an embedded struct whose fields are encoded as if they were
    /// declared on `S` at this position.
    pub fn embed<F: Reflect>(mut self, name: &'static str, get: fn(&S) -> &F) -> Self {
        self.fields.push(FieldShape {
            name,
            tag: "",
            ty: TypeInfo::of::<F>(),
            embedded: true,
            get: field_getter(get),
        });
        self
    }

    pub fn build(self) -> Shape {
        Shape::Struct(StructShape {
            fields: self.fields,
        })
    }
}

fn field_getter<S: Reflect, F: Reflect>(get: fn(&S) -> &F) -> FieldGetter {
    erase(move |value: &dyn Any| value.downcast_ref::<S>().map(|owner| get(owner) as &dyn Any))
}

/// Pins the closure to a higher-ranked signature before boxing it.
fn erase<G>(getter: G) -> FieldGetter
where
    G: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(getter)
}

/// Chains two accessors; used to reach fields of embedded structs.
pub(crate) fn compose(outer: FieldGetter, inner: FieldGetter) -> FieldGetter {
    erase(move |value: &dyn Any| outer(value).and_then(|owner| inner(owner)))
}
