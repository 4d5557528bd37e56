//! Typed value codec for an HTTP API client.
//!
//! Converts in-memory values to URL query pairs and JSON bodies, and decodes
//! JSON responses including polymorphic (union) payloads. Transport, retry,
//! auth and SSE framing live elsewhere; this crate performs no I/O.
//!
//! # Encoding
//! Types describe themselves through [`Reflect`]. On first use the [`Codec`]
//! compiles an encoder for each `(type, context)` pair and caches it; later
//! calls reuse the compiled procedure. Self-referential types are supported.
//!
//! # Decoding
//! Decoding is serde-driven. Abstract types registered in the
//! [`UnionRegistry`] are resolved by raw JSON shape and discriminator value.

#![allow(clippy::type_complexity)]

mod cache;
mod codec;
pub mod context;
pub mod error;
mod impls;
pub mod json;
pub mod presence;
pub mod query;
pub mod shape;
pub mod tag;
pub mod union;

pub use codec::Codec;
pub use context::{ArrayFormat, DateFormat, EncodeContext, NestedFormat};
pub use error::CodecError;
pub use presence::Presence;
pub use query::Pair;
pub use shape::{DynReflect, Hooks, Reflect, Scalar, Shape, StructShape, TypeInfo};
pub use tag::{FieldTag, TagTarget};
pub use union::{JsonShape, UnionRegistry, Variant};
