use apiwire::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SseError {
    #[error("event {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: CodecError,
    },

    #[error("unsupported content type '{0}'; expected text/event-stream")]
    UnsupportedContentType(String),
}

impl SseError {
    #[must_use]
    pub fn decode(index: usize, source: CodecError) -> Self {
        Self::Decode { index, source }
    }

    /// The codec failure behind a decode error, if any.
    pub fn codec_error(&self) -> Option<&CodecError> {
        match self {
            Self::Decode { source, .. } => Some(source),
            Self::UnsupportedContentType(_) => None,
        }
    }
}
