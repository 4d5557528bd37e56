//! Per-call encoding settings.

use std::env;
use std::fmt;

/// How timestamps are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateFormat {
    /// RFC 3339 timestamp, e.g. `2024-05-01T10:00:00Z`.
    #[default]
    DateTime,
    /// Calendar date only, e.g. `2024-05-01`.
    Date,
}

impl DateFormat {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "date-time" => Self::DateTime,
            "date" => Self::Date,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DateTime => "date-time",
            Self::Date => "date",
        }
    }
}

/// How a nested object key is rendered in a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NestedFormat {
    /// `parent.child`
    Dots,
    /// `parent[child]`
    #[default]
    Brackets,
}

impl NestedFormat {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "dots" => Self::Dots,
            "brackets" => Self::Brackets,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dots => "dots",
            Self::Brackets => "brackets",
        }
    }

    /// Combines a parent key and a child subkey into one flat query key.
    ///
    /// This is the only place composite key shape is decided; struct fields
    /// and map entries both go through it.
    pub fn join(&self, parent: &str, child: &str) -> String {
        if parent.is_empty() {
            return child.to_owned();
        }
        match self {
            Self::Dots => format!("{parent}.{child}"),
            Self::Brackets => format!("{parent}[{child}]"),
        }
    }
}

/// How a sequence is rendered in a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArrayFormat {
    /// `ids=1,2,3`
    #[default]
    Comma,
    /// `ids=1&ids=2&ids=3`
    Repeat,
    /// `ids[]=1&ids[]=2&ids[]=3`
    Brackets,
    /// `ids[0]=1&ids[1]=2`; not supported, every encode call fails.
    Indices,
}

impl ArrayFormat {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "comma" => Self::Comma,
            "repeat" => Self::Repeat,
            "brackets" => Self::Brackets,
            "indices" => Self::Indices,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comma => "comma",
            Self::Repeat => "repeat",
            Self::Brackets => "brackets",
            Self::Indices => "indices",
        }
    }
}

/// Immutable settings for one encode call.
///
/// Every field takes part in encoder cache identity: the same type compiled
/// under two different contexts yields two independent procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodeContext {
    pub(crate) root: bool,
    pub date_format: DateFormat,
    pub nested_format: NestedFormat,
    pub array_format: ArrayFormat,
}

impl Default for EncodeContext {
    fn default() -> Self {
        Self {
            root: true,
            date_format: DateFormat::default(),
            nested_format: NestedFormat::default(),
            array_format: ArrayFormat::default(),
        }
    }
}

impl EncodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `APIWIRE_ARRAY_FORMAT`, `APIWIRE_NESTED_FORMAT`
    /// and `APIWIRE_DATE_FORMAT`. Unknown values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            array_format: env_setting("APIWIRE_ARRAY_FORMAT", ArrayFormat::parse)
                .unwrap_or(defaults.array_format),
            nested_format: env_setting("APIWIRE_NESTED_FORMAT", NestedFormat::parse)
                .unwrap_or(defaults.nested_format),
            date_format: env_setting("APIWIRE_DATE_FORMAT", DateFormat::parse)
                .unwrap_or(defaults.date_format),
            ..defaults
        }
    }

    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    pub fn with_nested_format(mut self, nested_format: NestedFormat) -> Self {
        self.nested_format = nested_format;
        self
    }

    pub fn with_array_format(mut self, array_format: ArrayFormat) -> Self {
        self.array_format = array_format;
        self
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub(crate) fn as_root(mut self) -> Self {
        self.root = true;
        self
    }

    pub(crate) fn nested(mut self) -> Self {
        self.root = false;
        self
    }
}

impl fmt::Display for EncodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "root={} date={} nested={} array={}",
            self.root,
            self.date_format.as_str(),
            self.nested_format.as_str(),
            self.array_format.as_str()
        )
    }
}

fn env_setting<T>(key: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    env::var(key)
        .ok()
        .and_then(|value| parse(value.trim().to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::{ArrayFormat, DateFormat, EncodeContext, NestedFormat};

    #[test]
    fn join_uses_subkey_at_root() {
        assert_eq!(NestedFormat::Dots.join("", "limit"), "limit");
        assert_eq!(NestedFormat::Brackets.join("", "limit"), "limit");
    }

    #[test]
    fn join_renders_dots_and_brackets() {
        assert_eq!(NestedFormat::Dots.join("outer", "A"), "outer.A");
        assert_eq!(NestedFormat::Brackets.join("outer", "A"), "outer[A]");
        assert_eq!(
            NestedFormat::Brackets.join("outer[inner]", "A"),
            "outer[inner][A]"
        );
    }

    #[test]
    fn formats_parse_their_own_names() {
        for format in [
            ArrayFormat::Comma,
            ArrayFormat::Repeat,
            ArrayFormat::Brackets,
            ArrayFormat::Indices,
        ] {
            assert_eq!(ArrayFormat::parse(format.as_str()), Some(format));
        }
        for format in [NestedFormat::Dots, NestedFormat::Brackets] {
            assert_eq!(NestedFormat::parse(format.as_str()), Some(format));
        }
        for format in [DateFormat::Date, DateFormat::DateTime] {
            assert_eq!(DateFormat::parse(format.as_str()), Some(format));
        }
        assert_eq!(ArrayFormat::parse("csv"), None);
    }

    #[test]
    fn builder_overrides_defaults_and_keeps_root() {
        let context = EncodeContext::new()
            .with_array_format(ArrayFormat::Repeat)
            .with_nested_format(NestedFormat::Dots)
            .with_date_format(DateFormat::Date);

        assert!(context.is_root());
        assert_eq!(context.array_format, ArrayFormat::Repeat);
        assert_eq!(context.nested_format, NestedFormat::Dots);
        assert_eq!(context.date_format, DateFormat::Date);
        assert!(!context.nested().is_root());
        assert_ne!(context, context.nested());
    }

    #[test]
    fn from_env_overrides_known_values_only() {
        std::env::set_var("APIWIRE_ARRAY_FORMAT", " Repeat ");
        std::env::set_var("APIWIRE_NESTED_FORMAT", "sideways");
        std::env::set_var("APIWIRE_DATE_FORMAT", "date");

        let context = EncodeContext::from_env();

        std::env::remove_var("APIWIRE_ARRAY_FORMAT");
        std::env::remove_var("APIWIRE_NESTED_FORMAT");
        std::env::remove_var("APIWIRE_DATE_FORMAT");

        assert_eq!(context.array_format, ArrayFormat::Repeat);
        assert_eq!(context.nested_format, NestedFormat::Brackets);
        assert_eq!(context.date_format, DateFormat::Date);
        assert!(context.is_root());
    }
}
