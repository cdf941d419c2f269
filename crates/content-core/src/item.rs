//! Content items: entries, assets and deletion markers.

use crate::error::ContentError;
use crate::values::FieldValue;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Field id → locale code → value.
pub type LocalizedFields = BTreeMap<String, BTreeMap<String, FieldValue>>;

/// Discriminates the four item shapes delivered by the sync API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Entry,
    Asset,
    DeletedEntry,
    DeletedAsset,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Entry => "Entry",
            ItemKind::Asset => "Asset",
            ItemKind::DeletedEntry => "DeletedEntry",
            ItemKind::DeletedAsset => "DeletedAsset",
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, ItemKind::DeletedEntry | ItemKind::DeletedAsset)
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entry" => Ok(ItemKind::Entry),
            "Asset" => Ok(ItemKind::Asset),
            "DeletedEntry" => Ok(ItemKind::DeletedEntry),
            "DeletedAsset" => Ok(ItemKind::DeletedAsset),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System metadata of an item. Every attribute is optional on the wire;
/// the `effective_*` accessors apply the default chains.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SysMeta {
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub revision: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_version: Option<i64>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl SysMeta {
    /// `version`, falling back to `revision` when absent or zero.
    pub fn effective_version(&self) -> i64 {
        match self.version {
            Some(v) if v != 0 => v,
            _ => self.revision.unwrap_or(0),
        }
    }

    /// `publishedVersion`, falling back to the effective version.
    pub fn effective_published_version(&self) -> i64 {
        match self.published_version {
            Some(v) if v != 0 => v,
            _ => self.effective_version(),
        }
    }

    /// `updatedAt`, falling back to `createdAt`.
    pub fn effective_updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }

    /// `publishedAt`, falling back to the effective `updatedAt`.
    pub fn effective_published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at.or_else(|| self.effective_updated_at())
    }
}

/// A single item from the content store.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub kind: ItemKind,
    /// Globally unique across all kinds
    pub sys_id: String,
    /// Empty for assets and deletion markers
    pub content_type_id: String,
    pub sys: SysMeta,
    pub fields: LocalizedFields,
}

#[derive(Deserialize)]
struct RawItem {
    sys: RawSys,
    #[serde(default)]
    fields: Map<String, JsonValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSys {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content_type: Option<RawLink>,
    #[serde(flatten)]
    meta: SysMeta,
}

#[derive(Deserialize)]
struct RawLink {
    sys: RawLinkSys,
}

#[derive(Deserialize)]
struct RawLinkSys {
    id: String,
}

impl ContentItem {
    /// Build an entry.
    pub fn entry(sys_id: impl Into<String>, content_type_id: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Entry,
            sys_id: sys_id.into(),
            content_type_id: content_type_id.into(),
            sys: SysMeta::default(),
            fields: LocalizedFields::new(),
        }
    }

    /// Build an asset.
    pub fn asset(sys_id: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Asset,
            ..Self::entry(sys_id, "")
        }
    }

    /// Build a deletion marker.
    pub fn deleted(kind: ItemKind, sys_id: impl Into<String>) -> Self {
        Self {
            kind,
            ..Self::entry(sys_id, "")
        }
    }

    /// Set one localized field value.
    pub fn with_field(
        mut self,
        field_id: impl Into<String>,
        locale: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.fields
            .entry(field_id.into())
            .or_default()
            .insert(locale.into(), value.into());
        self
    }

    /// Parse a sync API item payload.
    ///
    /// Field values that are not locale maps are skipped.
    pub fn from_json(value: JsonValue) -> Result<Self, ContentError> {
        let raw: RawItem = serde_json::from_value(value)?;

        let kind: ItemKind = raw
            .sys
            .kind
            .parse()
            .map_err(|kind| ContentError::UnsupportedKind {
                id: raw.sys.id.clone(),
                kind,
            })?;

        let content_type_id = raw
            .sys
            .content_type
            .map(|ct| ct.sys.id)
            .unwrap_or_default();
        if kind == ItemKind::Entry && content_type_id.is_empty() {
            return Err(ContentError::MissingContentType(raw.sys.id));
        }

        let mut fields = LocalizedFields::new();
        for (field_id, localized) in raw.fields {
            let JsonValue::Object(localized) = localized else {
                continue;
            };
            let values = localized
                .into_iter()
                .map(|(locale, v)| (locale, FieldValue::from_json(v)))
                .collect();
            fields.insert(field_id, values);
        }

        Ok(Self {
            kind,
            sys_id: raw.sys.id,
            content_type_id,
            sys: raw.sys.meta,
            fields,
        })
    }
}
