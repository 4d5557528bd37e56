//! [`Reflect`] for primitives, std containers, timestamps and raw JSON.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use time::{Date, OffsetDateTime};

use crate::error::CodecError;
use crate::shape::{DynReflect, Hooks, Reflect, Scalar, Shape, TypeInfo};

macro_rules! reflect_signed {
    ($($ty:ty),* $(,)?) => {$(
        impl Reflect for $ty {
            fn shape() -> Shape {
                Shape::Scalar(|value| value.downcast_ref::<$ty>().map(|v| Scalar::Int(*v as i64)))
            }
        }
    )*};
}

macro_rules! reflect_unsigned {
    ($($ty:ty),* $(,)?) => {$(
        impl Reflect for $ty {
            fn shape() -> Shape {
                Shape::Scalar(|value| value.downcast_ref::<$ty>().map(|v| Scalar::Uint(*v as u64)))
            }
        }
    )*};
}

reflect_signed!(i8, i16, i32, i64, isize);
reflect_unsigned!(u8, u16, u32, u64, usize);

impl Reflect for f32 {
    fn shape() -> Shape {
        Shape::Scalar(|value| {
            value
                .downcast_ref::<f32>()
                .map(|v| Scalar::Float(f64::from(*v)))
        })
    }
}

impl Reflect for f64 {
    fn shape() -> Shape {
        Shape::Scalar(|value| value.downcast_ref::<f64>().map(|v| Scalar::Float(*v)))
    }
}

impl Reflect for bool {
    fn shape() -> Shape {
        Shape::Scalar(|value| value.downcast_ref::<bool>().map(|v| Scalar::Bool(*v)))
    }
}

impl Reflect for String {
    fn shape() -> Shape {
        Shape::Scalar(|value| {
            value
                .downcast_ref::<String>()
                .map(|v| Scalar::Str(v.as_str()))
        })
    }
}

impl Reflect for &'static str {
    fn shape() -> Shape {
        Shape::Scalar(|value| value.downcast_ref::<&'static str>().map(|v| Scalar::Str(v)))
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn shape() -> Shape {
        Shape::Pointer {
            elem: TypeInfo::of::<T>(),
            deref: deref_option::<T>,
        }
    }
}

fn deref_option<T: Reflect>(value: &dyn Any) -> Option<&dyn Any> {
    value
        .downcast_ref::<Option<T>>()?
        .as_ref()
        .map(|inner| inner as &dyn Any)
}

impl<T: Reflect> Reflect for Box<T> {
    fn shape() -> Shape {
        Shape::Pointer {
            elem: TypeInfo::of::<T>(),
            deref: deref_box::<T>,
        }
    }
}

fn deref_box<T: Reflect>(value: &dyn Any) -> Option<&dyn Any> {
    value
        .downcast_ref::<Box<T>>()
        .map(|inner| inner.as_ref() as &dyn Any)
}

impl<T: Reflect> Reflect for Arc<T> {
    fn shape() -> Shape {
        Shape::Pointer {
            elem: TypeInfo::of::<T>(),
            deref: deref_arc::<T>,
        }
    }
}

fn deref_arc<T: Reflect>(value: &dyn Any) -> Option<&dyn Any> {
    value
        .downcast_ref::<Arc<T>>()
        .map(|inner| inner.as_ref() as &dyn Any)
}

impl<T: Reflect> Reflect for Vec<T> {
    fn shape() -> Shape {
        Shape::Seq {
            elem: TypeInfo::of::<T>(),
            items: vec_items::<T>,
        }
    }
}

fn vec_items<T: Reflect>(value: &dyn Any) -> Vec<&dyn Any> {
    value
        .downcast_ref::<Vec<T>>()
        .map(|items| items.iter().map(|item| item as &dyn Any).collect())
        .unwrap_or_default()
}

impl<K, V> Reflect for HashMap<K, V>
where
    K: Reflect + Eq + Hash,
    V: Reflect,
{
    fn shape() -> Shape {
        Shape::Map {
            key: TypeInfo::of::<K>(),
            value: TypeInfo::of::<V>(),
            entries: hash_map_entries::<K, V>,
        }
    }
}

fn hash_map_entries<K, V>(value: &dyn Any) -> Vec<(&dyn Any, &dyn Any)>
where
    K: Reflect + Eq + Hash,
    V: Reflect,
{
    value
        .downcast_ref::<HashMap<K, V>>()
        .map(|map| {
            map.iter()
                .map(|(key, value)| (key as &dyn Any, value as &dyn Any))
                .collect()
        })
        .unwrap_or_default()
}

impl<K, V> Reflect for BTreeMap<K, V>
where
    K: Reflect + Ord,
    V: Reflect,
{
    fn shape() -> Shape {
        Shape::Map {
            key: TypeInfo::of::<K>(),
            value: TypeInfo::of::<V>(),
            entries: btree_map_entries::<K, V>,
        }
    }
}

fn btree_map_entries<K, V>(value: &dyn Any) -> Vec<(&dyn Any, &dyn Any)>
where
    K: Reflect + Ord,
    V: Reflect,
{
    value
        .downcast_ref::<BTreeMap<K, V>>()
        .map(|map| {
            map.iter()
                .map(|(key, value)| (key as &dyn Any, value as &dyn Any))
                .collect()
        })
        .unwrap_or_default()
}

impl Reflect for OffsetDateTime {
    fn shape() -> Shape {
        Shape::Time(|value| value.downcast_ref::<OffsetDateTime>().copied())
    }
}

/// Dates encode as midnight UTC of that day.
impl Reflect for Date {
    fn shape() -> Shape {
        Shape::Time(|value| {
            value
                .downcast_ref::<Date>()
                .map(|date| date.midnight().assume_utc())
        })
    }
}

impl Reflect for Number {
    fn shape() -> Shape {
        Shape::Scalar(|value| {
            let number = value.downcast_ref::<Number>()?;
            if let Some(unsigned) = number.as_u64() {
                Some(Scalar::Uint(unsigned))
            } else if let Some(signed) = number.as_i64() {
                Some(Scalar::Int(signed))
            } else {
                number.as_f64().map(Scalar::Float)
            }
        })
    }
}

impl Reflect for Map<String, Value> {
    fn shape() -> Shape {
        Shape::Map {
            key: TypeInfo::of::<String>(),
            value: TypeInfo::of::<Value>(),
            entries: |value| {
                value
                    .downcast_ref::<Map<String, Value>>()
                    .map(|map| {
                        map.iter()
                            .map(|(key, value)| (key as &dyn Any, value as &dyn Any))
                            .collect()
                    })
                    .unwrap_or_default()
            },
        }
    }
}

/// Raw JSON redispatches to the Rust type of whatever it holds; `null`
/// encodes as nothing in a query. Below the root, JSON bodies carry it
/// verbatim, explicit nulls included.
impl Reflect for Value {
    fn shape() -> Shape {
        Shape::Dynamic(json_value_target)
    }

    fn hooks() -> Hooks {
        Hooks {
            query: None,
            json: Some(json_value_verbatim),
        }
    }
}

fn json_value_verbatim(value: &dyn Any) -> Result<Value, CodecError> {
    Ok(value.downcast_ref::<Value>().cloned().unwrap_or(Value::Null))
}

fn json_value_target(value: &dyn Any) -> Option<&dyn DynReflect> {
    match value.downcast_ref::<Value>()? {
        Value::Null => None,
        Value::Bool(inner) => Some(inner as &dyn DynReflect),
        Value::Number(inner) => Some(inner as &dyn DynReflect),
        Value::String(inner) => Some(inner as &dyn DynReflect),
        Value::Array(inner) => Some(inner as &dyn DynReflect),
        Value::Object(inner) => Some(inner as &dyn DynReflect),
    }
}
