//! Content-type definitions.
//!
//! Content types arrive in the canonical form produced by the schema
//! transform layer: an id plus an ordered list of field definitions.

use serde::{Deserialize, Serialize};

/// Locale used when none is configured or none is marked default.
pub const DEFAULT_LOCALE: &str = "en";

/// Canonical field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Short text
    Text,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Long text
    Longtext,
    /// Single link to another item
    Link,
    /// List of scalars or links
    List,
    /// Arbitrary nested object
    Object,
}

/// A single field of a content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field id as it appears in item payloads
    pub id: String,

    /// Field type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Content type the field links to (links and lists of links)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target_type: Option<String>,

    /// Omitted fields never produce a column
    #[serde(default)]
    pub omitted: bool,
}

impl FieldDef {
    /// Create a field definition.
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            field_type,
            link_target_type: None,
            omitted: false,
        }
    }

    /// Create a list-of-links field targeting `target`.
    pub fn link_list(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_type: FieldType::List,
            link_target_type: Some(target.into()),
            omitted: false,
        }
    }

    /// Mark the field omitted.
    pub fn omitted(mut self) -> Self {
        self.omitted = true;
        self
    }

    /// A list field with a link target is stored in a reference table
    /// rather than as a column.
    pub fn is_reference_list(&self) -> bool {
        self.field_type == FieldType::List
            && self
                .link_target_type
                .as_deref()
                .is_some_and(|t| !t.is_empty())
    }
}

/// A content type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentType {
    /// Content type id
    pub id: String,

    /// Fields in declaration order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ContentType {
    /// Create a content type.
    pub fn new(id: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a field by id.
    pub fn field(&self, id: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Fields that are not omitted, in declaration order.
    pub fn active_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.omitted)
    }

    /// The fixed synthetic field set used for assets.
    pub fn asset() -> Self {
        Self::new(
            "_asset",
            vec![
                FieldDef::new("title", FieldType::Text),
                FieldDef::new("description", FieldType::Longtext),
                FieldDef::new("file", FieldType::Object),
            ],
        )
    }
}

/// A locale of the content space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Locale code, e.g. `en-US`
    pub code: String,

    /// Whether this is the space default
    #[serde(default)]
    pub default: bool,
}

impl Locale {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            default: false,
        }
    }
}

/// Resolve the default locale code (lowercased).
///
/// The locale flagged default wins; otherwise [`DEFAULT_LOCALE`] if it is
/// listed; otherwise the first listed locale.
pub fn default_locale(locales: &[Locale]) -> String {
    let mut has_builtin = false;
    for locale in locales {
        let code = locale.code.to_lowercase();
        if locale.default {
            return code;
        }
        if code == DEFAULT_LOCALE {
            has_builtin = true;
        }
    }

    match locales.first() {
        Some(first) if !has_builtin => first.code.to_lowercase(),
        _ => DEFAULT_LOCALE.to_string(),
    }
}
