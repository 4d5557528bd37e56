use thiserror::Error;

use crate::union::JsonShape;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported configuration: array format '{format}' cannot be encoded (key '{key}')")]
    UnsupportedArrayFormat { format: &'static str, key: String },

    #[error("non-primitive map key of type {type_name}: key encoded to {found}")]
    NonPrimitiveMapKey {
        type_name: &'static str,
        found: String,
    },

    #[error("non-finite float {value} cannot be represented in JSON")]
    NonFiniteFloat { value: f64 },

    #[error("inline field '{field}' must encode to a JSON object")]
    InlineNotObject { field: String },

    #[error("required field '{field}' is missing")]
    RequiredField { field: String },

    #[error("encoder compilation for {type_name} was aborted")]
    CompilationFailed { type_name: &'static str },

    #[error("type {type_name} has no registered union variants")]
    UnregisteredUnion { type_name: &'static str },

    #[error(
        "unresolvable union variant for {type_name}: shape {shape}, discriminator {}, {candidates} candidate(s)",
        .discriminator.as_deref().unwrap_or("<none>")
    )]
    UnresolvableVariant {
        type_name: &'static str,
        shape: JsonShape,
        discriminator: Option<String>,
        candidates: usize,
    },

    #[error("union {type_name} registers more than one {shape} variant for discriminator {}", .discriminator.as_deref().unwrap_or("<none>"))]
    AmbiguousVariants {
        type_name: &'static str,
        shape: JsonShape,
        discriminator: Option<String>,
    },

    #[error("malformed input for {target} at {location}: {source}")]
    Malformed {
        target: &'static str,
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize JSON body: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to format timestamp: {0}")]
    TimeFormat(#[source] time::error::Format),
}

impl CodecError {
    #[must_use]
    pub fn required(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Wraps a `serde_json` decode failure, keeping the line/column it reports.
    #[must_use]
    pub fn malformed(target: &'static str, source: serde_json::Error) -> Self {
        let location = if source.line() == 0 {
            "value root".to_owned()
        } else {
            format!("line {} column {}", source.line(), source.column())
        };
        Self::Malformed {
            target,
            location,
            source,
        }
    }
}
