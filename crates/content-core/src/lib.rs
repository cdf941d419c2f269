//! Core content model for the content-sync framework.
//!
//! This crate provides the inbound types handed to the sync engine by the
//! content-retrieval layer:
//!
//! - [`ContentType`] / [`FieldDef`] - Canonical content-type definitions
//! - [`ContentItem`] - Entries, assets and deletion markers with their sys metadata
//! - [`FieldValue`] - A raw field value classified once at ingestion
//! - [`naming`] - Deterministic column and table naming
//!
//! # Architecture
//!
//! ```text
//! content-core (this crate)
//!    │
//!    ├─── postgresql-types   (FieldValue → PostgreSQL column values)
//!    │
//!    └─── content-sync       (schema mapper, sync executor, query translator)
//! ```
//!
//! # Example
//!
//! ```rust
//! use content_core::{ContentItem, FieldValue, ItemKind};
//!
//! let item = ContentItem::from_json(serde_json::json!({
//!     "sys": { "id": "a1", "type": "Entry", "contentType": { "sys": { "id": "article" } } },
//!     "fields": { "title": { "en-US": "Hello" } }
//! }))
//! .unwrap();
//!
//! assert_eq!(item.kind, ItemKind::Entry);
//! assert_eq!(item.fields["title"]["en-US"], FieldValue::Text("Hello".to_string()));
//! ```

pub mod error;
pub mod item;
pub mod naming;
pub mod types;
pub mod values;

pub use error::ContentError;
pub use item::{ContentItem, ItemKind, LocalizedFields, SysMeta};
pub use types::{default_locale, ContentType, FieldDef, FieldType, Locale, DEFAULT_LOCALE};
pub use values::{AssetFile, FieldValue, Link};
