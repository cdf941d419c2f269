//! Forward conversion: FieldValue → PostgreSQL value
//!
//! [`convert`] is the single entry point shared by the bulk and delta paths.
//! Bulk loads take the [`Converted::Value`] form; delta statements take the
//! [`Converted::Literal`] form, which is already quoted for embedding into
//! SQL text.

use chrono::{DateTime, SecondsFormat, Utc};
use content_core::{AssetFile, FieldValue};

/// Error raised while converting a field value.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// A nested object could not be encoded as JSON text
    #[error("Failed to encode object field as JSON: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// PostgreSQL column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// Text value
    Text(String),
    /// Array of text values (PostgreSQL text[])
    TextArray(Vec<String>),
    /// Timestamp with timezone
    Timestamp(DateTime<Utc>),
}

/// Result of converting one raw field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Converted {
    /// Value handed to the driver as-is
    Value(ColumnValue),
    /// Quoted SQL literal for statement text
    Literal(String),
    /// Asset file; the caller lifts it into `url`, `file_name` and
    /// `content_type` columns
    Asset(AssetFile),
}

/// Convert a raw field value.
///
/// With `quote_for_template` the result is a SQL literal ready to be
/// interpolated into generated SQL text; otherwise it is a plain value for
/// driver-side binding. Assets are returned decoded in both modes.
pub fn convert(value: &FieldValue, quote_for_template: bool) -> Result<Converted, ConvertError> {
    if let FieldValue::Asset(file) = value {
        return Ok(Converted::Asset(file.clone()));
    }

    let column = to_column_value(value)?;
    if quote_for_template {
        Ok(Converted::Literal(column.to_sql_literal()))
    } else {
        Ok(Converted::Value(column))
    }
}

/// Convert a raw field value into the value stored in its column.
///
/// Links store the linked id, lists become text arrays (recursing per
/// element) and objects become JSON text.
pub fn to_column_value(value: &FieldValue) -> Result<ColumnValue, ConvertError> {
    Ok(match value {
        FieldValue::Null => ColumnValue::Null,
        FieldValue::Text(s) => ColumnValue::Text(s.clone()),
        FieldValue::Bool(b) => ColumnValue::Bool(*b),
        FieldValue::Int(i) => ColumnValue::Int(*i),
        FieldValue::Float(f) => ColumnValue::Float(*f),
        FieldValue::Link(link) => ColumnValue::Text(link.sys_id.clone()),
        FieldValue::LinkList(links) => {
            ColumnValue::TextArray(links.iter().map(|l| l.sys_id.clone()).collect())
        }
        FieldValue::List(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                if let Some(text) = element_text(item)? {
                    elements.push(text);
                }
            }
            ColumnValue::TextArray(elements)
        }
        FieldValue::Asset(file) => ColumnValue::Text(serde_json::to_string(file)?),
        FieldValue::Object(obj) => ColumnValue::Text(serde_json::to_string(obj)?),
    })
}

/// Text form of a list element. Null elements are dropped.
fn element_text(item: &FieldValue) -> Result<Option<String>, ConvertError> {
    Ok(match to_column_value(item)? {
        ColumnValue::Null => None,
        ColumnValue::Bool(b) => Some(b.to_string()),
        ColumnValue::Int(i) => Some(i.to_string()),
        ColumnValue::Float(f) => Some(f.to_string()),
        ColumnValue::Text(s) => Some(s),
        ColumnValue::TextArray(nested) => Some(serde_json::to_string(&nested)?),
        ColumnValue::Timestamp(ts) => Some(format_timestamp(&ts)),
    })
}

impl ColumnValue {
    /// Render as a SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            ColumnValue::Null => "NULL".to_string(),
            ColumnValue::Bool(true) => "TRUE".to_string(),
            ColumnValue::Bool(false) => "FALSE".to_string(),
            ColumnValue::Int(i) => i.to_string(),
            ColumnValue::Float(f) if f.is_finite() => f.to_string(),
            ColumnValue::Float(f) => quote_literal(&non_finite(*f)),
            ColumnValue::Text(s) => quote_literal(s),
            ColumnValue::TextArray(items) => quote_literal(&array_text(items)),
            ColumnValue::Timestamp(ts) => quote_literal(&format_timestamp(ts)),
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl From<Option<DateTime<Utc>>> for ColumnValue {
    fn from(ts: Option<DateTime<Utc>>) -> Self {
        ts.map_or(ColumnValue::Null, ColumnValue::Timestamp)
    }
}

/// Quote a string as a SQL literal, doubling embedded quotes. Strings with
/// backslashes use the escape-string form so they survive regardless of
/// `standard_conforming_strings`.
pub fn quote_literal(s: &str) -> String {
    let escaped = s.replace('\'', "''");
    if s.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}

/// Quote an identifier.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// PostgreSQL array input syntax: `{"a","b"}`.
fn array_text(items: &[String]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| format!("\"{}\"", item.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", elements.join(","))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_finite(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_sign_positive() {
        "Infinity".to_string()
    } else {
        "-Infinity".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use content_core::Link;
    use serde_json::json;

    fn literal(value: FieldValue) -> String {
        match convert(&value, true).unwrap() {
            Converted::Literal(s) => s,
            other => panic!("expected literal, got {other:?}"),
        }
    }

    fn bound(value: FieldValue) -> ColumnValue {
        match convert(&value, false).unwrap() {
            Converted::Value(v) => v,
            other => panic!("expected value, got {other:?}"),
        }
    }

    #[test]
    fn test_link() {
        let link = FieldValue::Link(Link::new("abc", "Entry"));
        assert_eq!(bound(link.clone()), ColumnValue::Text("abc".into()));
        assert_eq!(literal(link), "'abc'");
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(literal(FieldValue::Text("O'Neil".into())), "'O''Neil'");
        assert_eq!(literal(FieldValue::Text(r"a\b".into())), r"E'a\\b'");
        assert_eq!(bound(FieldValue::Text("O'Neil".into())), ColumnValue::Text("O'Neil".into()));
    }

    #[test]
    fn test_scalars() {
        assert_eq!(literal(FieldValue::Int(42)), "42");
        assert_eq!(literal(FieldValue::Float(1.5)), "1.5");
        assert_eq!(literal(FieldValue::Float(f64::NAN)), "'NaN'");
        assert_eq!(literal(FieldValue::Bool(true)), "TRUE");
        assert_eq!(literal(FieldValue::Null), "NULL");
    }

    #[test]
    fn test_lists() {
        let links = FieldValue::LinkList(vec![Link::new("a", "Entry"), Link::new("b", "Entry")]);
        assert_eq!(
            bound(links.clone()),
            ColumnValue::TextArray(vec!["a".into(), "b".into()])
        );
        assert_eq!(literal(links), r#"'{"a","b"}'"#);

        let scalars = FieldValue::List(vec![
            FieldValue::Text("x\"y".into()),
            FieldValue::Int(3),
            FieldValue::Null,
            FieldValue::Text("it's".into()),
        ]);
        assert_eq!(literal(scalars), r#"E'{"x\\"y","3","it''s"}'"#);
    }

    #[test]
    fn test_list_of_objects_recurses() {
        let list = FieldValue::List(vec![FieldValue::Object(json!({ "k": 1 }))]);
        assert_eq!(
            bound(list),
            ColumnValue::TextArray(vec![r#"{"k":1}"#.to_string()])
        );
    }

    #[test]
    fn test_object_is_json_text() {
        let obj = FieldValue::Object(json!({ "a": [1, 2] }));
        assert_eq!(bound(obj.clone()), ColumnValue::Text(r#"{"a":[1,2]}"#.into()));
        assert_eq!(literal(obj), r#"'{"a":[1,2]}'"#);
    }

    #[test]
    fn test_asset_is_decoded_in_both_modes() {
        let file = AssetFile {
            url: "//x/a.png".into(),
            file_name: "a.png".into(),
            content_type: "image/png".into(),
        };
        for quote in [false, true] {
            assert_eq!(
                convert(&FieldValue::Asset(file.clone()), quote).unwrap(),
                Converted::Asset(file.clone())
            );
        }
    }

    #[test]
    fn test_timestamp_literal() {
        let ts: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        assert_eq!(
            ColumnValue::Timestamp(ts).to_sql_literal(),
            "'2024-05-01T12:00:00.000Z'"
        );
        assert_eq!(ColumnValue::from(None), ColumnValue::Null);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("blog_post_en"), "\"blog_post_en\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
