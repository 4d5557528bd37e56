//! Field tag parsing.
//!
//! Fields carry a tag string in the familiar struct-tag layout, one quoted
//! entry per wire format plus an optional date format:
//!
//! ```text
//! query:"created_at" json:"created_at,required" format:"date"
//! ```
//!
//! Recognized modifiers after the name are `inline`, `required` and
//! `omitempty`. Unknown modifiers are ignored.

use crate::context::DateFormat;

/// Wire format a tag entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagTarget {
    Query,
    Json,
}

impl TagTarget {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Json => "json",
        }
    }
}

/// Parsed wire metadata for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTag {
    pub name: String,
    pub inline: bool,
    pub required: bool,
    pub omit_empty: bool,
    /// `None` inherits the enclosing context's date format.
    pub date_format: Option<DateFormat>,
}

/// Parses the tag of `field` for `target`.
///
/// Returns `None` when the field is skipped for that format: there is no
/// entry for the target, or the name is `-` without `inline`.
pub fn parse(tag: &str, target: TagTarget, field: &str) -> Option<FieldTag> {
    let raw = lookup(tag, target.key())?;
    let mut parts = raw.split(',');
    let name = parts.next().unwrap_or_default().trim();

    let mut parsed = FieldTag {
        name: if name.is_empty() {
            field.to_owned()
        } else {
            name.to_owned()
        },
        inline: false,
        required: false,
        omit_empty: false,
        date_format: lookup(tag, "format").and_then(|value| DateFormat::parse(value.trim())),
    };

    for modifier in parts {
        match modifier.trim() {
            "inline" => parsed.inline = true,
            "required" => parsed.required = true,
            "omitempty" => parsed.omit_empty = true,
            _ => {}
        }
    }

    if name == "-" && !parsed.inline {
        return None;
    }
    Some(parsed)
}

/// Finds the quoted value stored under `key`, without unescaping it.
pub fn lookup<'a>(tag: &'a str, key: &str) -> Option<&'a str> {
    let mut rest = tag;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }

        let colon = rest.find(':')?;
        let name = &rest[..colon];
        let after = rest[colon + 1..].strip_prefix('"')?;
        let end = closing_quote(after)?;
        let value = &after[..end];
        rest = &after[end + 1..];

        if name == key {
            return Some(value);
        }
    }
}

fn closing_quote(value: &str) -> Option<usize> {
    let mut escaped = false;
    for (index, ch) in value.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(index),
            _ => escaped = false,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{lookup, parse, FieldTag, TagTarget};
    use crate::context::DateFormat;

    #[test]
    fn lookup_finds_each_entry() {
        let tag = r#"query:"limit" json:"limit,omitempty"  format:"date""#;
        assert_eq!(lookup(tag, "query"), Some("limit"));
        assert_eq!(lookup(tag, "json"), Some("limit,omitempty"));
        assert_eq!(lookup(tag, "format"), Some("date"));
        assert_eq!(lookup(tag, "yaml"), None);
    }

    #[test]
    fn lookup_handles_escaped_quotes_and_garbage() {
        assert_eq!(lookup(r#"json:"a\"b" query:"q""#, "query"), Some("q"));
        assert_eq!(lookup("query", "query"), None);
        assert_eq!(lookup(r#"query:"unterminated"#, "query"), None);
        assert_eq!(lookup("", "query"), None);
    }

    #[test]
    fn parse_reads_modifiers_per_target() {
        let tag = r#"query:"ids,omitempty" json:"ids,required""#;
        assert_eq!(
            parse(tag, TagTarget::Query, "ids"),
            Some(FieldTag {
                name: "ids".to_owned(),
                inline: false,
                required: false,
                omit_empty: true,
                date_format: None,
            })
        );
        let json = parse(tag, TagTarget::Json, "ids").expect("json tag");
        assert!(json.required);
        assert!(!json.omit_empty);
    }

    #[test]
    fn parse_skips_dash_and_untagged_fields() {
        assert_eq!(parse(r#"query:"-""#, TagTarget::Query, "secret"), None);
        assert_eq!(parse(r#"json:"name""#, TagTarget::Query, "name"), None);

        let inline = parse(r#"query:"-,inline""#, TagTarget::Query, "options").expect("inline");
        assert!(inline.inline);
    }

    #[test]
    fn parse_falls_back_to_field_name() {
        let tag = parse(r#"json:",required""#, TagTarget::Json, "session_id").expect("tag");
        assert_eq!(tag.name, "session_id");
        assert!(tag.required);
    }

    #[test]
    fn parse_reads_date_format_override() {
        let date = parse(r#"query:"since" format:"date""#, TagTarget::Query, "since");
        assert_eq!(date.and_then(|tag| tag.date_format), Some(DateFormat::Date));

        let full = parse(r#"query:"since" format:"date-time""#, TagTarget::Query, "since");
        assert_eq!(full.and_then(|tag| tag.date_format), Some(DateFormat::DateTime));

        let unknown = parse(r#"query:"since" format:"unix""#, TagTarget::Query, "since");
        assert_eq!(unknown.and_then(|tag| tag.date_format), None);
    }
}
