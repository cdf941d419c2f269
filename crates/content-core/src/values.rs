//! Raw field values.
//!
//! Every raw JSON value found under `fields.<id>.<locale>` is classified into
//! a [`FieldValue`] once, when the item is ingested. Downstream code matches
//! on the variant instead of sniffing the JSON shape again.

use crate::error::ContentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::trace;

/// Link to another content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Stable id of the linked item
    pub sys_id: String,
    /// `Entry` or `Asset`
    pub linked_type: String,
}

impl Link {
    pub fn new(sys_id: impl Into<String>, linked_type: impl Into<String>) -> Self {
        Self {
            sys_id: sys_id.into(),
            linked_type: linked_type.into(),
        }
    }

    /// Recognize `{ "sys": { "type": "Link", "id": .., "linkType": .. } }`.
    fn from_object(obj: &Map<String, JsonValue>) -> Option<Self> {
        let sys = obj.get("sys")?.as_object()?;
        if sys.get("type")?.as_str()? != "Link" {
            return None;
        }
        let id = sys.get("id")?.as_str()?;
        let linked_type = sys
            .get("linkType")
            .and_then(JsonValue::as_str)
            .unwrap_or("Entry");
        Some(Self::new(id, linked_type))
    }
}

/// The file sub-object of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFile {
    pub url: String,
    pub file_name: String,
    pub content_type: String,
}

impl AssetFile {
    /// Shape-checked constructor: `url`, `fileName` and `contentType` must
    /// all be present and be strings.
    pub fn from_object(obj: &Map<String, JsonValue>) -> Result<Self, ContentError> {
        fn required<'a>(
            obj: &'a Map<String, JsonValue>,
            key: &'static str,
        ) -> Result<&'a str, ContentError> {
            obj.get(key)
                .and_then(JsonValue::as_str)
                .ok_or(ContentError::AssetShape(key))
        }

        Ok(Self {
            url: required(obj, "url")?.to_string(),
            file_name: required(obj, "fileName")?.to_string(),
            content_type: required(obj, "contentType")?.to_string(),
        })
    }
}

/// A raw field value for one locale.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// JSON null
    Null,
    /// String scalar
    Text(String),
    /// Boolean scalar
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Non-integral number
    Float(f64),
    /// Link to another item
    Link(Link),
    /// Array whose every element is a link
    LinkList(Vec<Link>),
    /// Any other array; elements are classified recursively
    List(Vec<FieldValue>),
    /// Asset file sub-object
    Asset(AssetFile),
    /// Generic nested object
    Object(JsonValue),
}

impl FieldValue {
    /// Classify a raw JSON value.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(b),
            JsonValue::String(s) => FieldValue::Text(s),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Text(n.to_string())
                }
            }
            JsonValue::Array(arr) => {
                let links: Option<Vec<Link>> = arr
                    .iter()
                    .map(|v| v.as_object().and_then(Link::from_object))
                    .collect();
                match links {
                    Some(links) if !links.is_empty() => FieldValue::LinkList(links),
                    _ => FieldValue::List(arr.into_iter().map(FieldValue::from_json).collect()),
                }
            }
            JsonValue::Object(obj) => {
                if obj.contains_key("sys") {
                    if let Some(link) = Link::from_object(&obj) {
                        return FieldValue::Link(link);
                    }
                } else if obj.contains_key("fileName") {
                    match AssetFile::from_object(&obj) {
                        Ok(file) => return FieldValue::Asset(file),
                        Err(e) => trace!("Keeping asset-like object as JSON: {e}"),
                    }
                }
                FieldValue::Object(JsonValue::Object(obj))
            }
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Links carried by this value: the link itself, every element of a
    /// link list, or the link elements of a mixed list.
    pub fn links(&self) -> Vec<&Link> {
        match self {
            Self::Link(link) => vec![link],
            Self::LinkList(links) => links.iter().collect(),
            Self::List(items) => items
                .iter()
                .filter_map(|item| match item {
                    Self::Link(link) => Some(link),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        Self::from_json(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Link> for FieldValue {
    fn from(link: Link) -> Self {
        Self::Link(link)
    }
}
