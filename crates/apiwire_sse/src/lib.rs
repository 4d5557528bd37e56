//! `text/event-stream` framing on top of the `apiwire` body codec.
//!
//! The decoder only splits frames and joins `data:` lines; every payload is
//! decoded with [`apiwire::json`], so union-typed events resolve exactly like
//! response bodies do.

pub mod error;
pub mod sse;

pub use error::SseError;
pub use sse::{SseDecoder, DONE_SENTINEL, EVENT_STREAM_CONTENT_TYPE};
