//! Mapping of content items onto the relational model
//!
//! [`build_schema`] turns a batch of ingested items into a [`SyncSchema`]:
//! one draft and one published row per (item, locale), the index rows that
//! locate them, reference rows for link lists and the ids of deleted items.

use super::schema::{
    ReferenceTable, SyncRow, SyncSchema, SyncTable, TableKind, ASSET_FILE_COLUMNS,
    DRAFT_META_COLUMNS, PUBLISHED_META_COLUMNS, SYS_ID_COLUMN,
};
use crate::error::{Result, SyncError};
use content_core::naming::{
    format_locale, publish_table_name, reference_table_name, snake_case, table_name,
    ASSET_TABLE_BASE,
};
use content_core::{ContentItem, ContentType, FieldDef, FieldValue, ItemKind};
use postgresql_types::{convert, to_column_value, ColumnValue, Converted, ConvertError};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Column layout of one content type.
#[derive(Debug, Clone)]
pub struct TableLayout {
    /// Table name base before locale suffixes
    pub base: String,
    pub content_type: ContentType,
    /// Field columns in declaration order
    pub field_columns: Vec<String>,
    is_asset: bool,
}

impl TableLayout {
    /// Derive the layout of `content_type`, rejecting field ids that map to
    /// the same column.
    pub fn new(content_type: &ContentType, is_asset: bool) -> Result<Self> {
        let mut claimed: HashMap<String, String> = HashMap::new();
        for reserved in std::iter::once(SYS_ID_COLUMN)
            .chain(DRAFT_META_COLUMNS)
            .chain(PUBLISHED_META_COLUMNS)
        {
            claimed.insert(reserved.to_string(), "sys".to_string());
        }

        let mut field_columns = Vec::new();
        let mut claim = |column: String, field: &str| -> Result<()> {
            if let Some(first) = claimed.insert(column.clone(), field.to_string()) {
                return Err(SyncError::ColumnCollision {
                    content_type: content_type.id.clone(),
                    first,
                    second: field.to_string(),
                    column,
                });
            }
            field_columns.push(column);
            Ok(())
        };

        for def in content_type.active_fields() {
            if def.is_reference_list() {
                continue;
            }
            if is_asset && def.id == "file" {
                for column in ASSET_FILE_COLUMNS {
                    claim(column.to_string(), &def.id)?;
                }
                continue;
            }
            claim(snake_case(&def.id), &def.id)?;
        }

        let base = if is_asset {
            ASSET_TABLE_BASE.to_string()
        } else {
            content_type.id.clone()
        };

        Ok(Self {
            base,
            content_type: content_type.clone(),
            field_columns,
            is_asset,
        })
    }

    pub fn draft_table(&self, locale: &str) -> SyncTable {
        SyncTable::new(
            table_name(&self.base, locale),
            TableKind::Draft,
            self.field_columns.clone(),
        )
    }

    pub fn published_table(&self, locale: &str) -> SyncTable {
        SyncTable::new(
            publish_table_name(&self.base, locale),
            TableKind::Published,
            self.field_columns.clone(),
        )
    }
}

/// Build the unit of work for one batch of items.
///
/// Entries must reference one of `types`; assets always use the built-in
/// asset layout. A later item with the same id replaces an earlier one.
pub fn build_schema(
    schema_name: &str,
    types: &[ContentType],
    items: &[ContentItem],
) -> Result<SyncSchema> {
    let mut mapper = SchemaMapper::new(types);
    let mut schema = SyncSchema::new(schema_name);

    for item in items {
        mapper.map_item(&mut schema, item)?;
    }

    debug!(
        "Mapped {} items into {} tables, {} reference tables and {} deletions",
        items.len(),
        schema.tables.len(),
        schema.references.len(),
        schema.deleted.len()
    );

    Ok(schema)
}

struct SchemaMapper<'a> {
    types: HashMap<&'a str, &'a ContentType>,
    layouts: HashMap<String, TableLayout>,
}

impl<'a> SchemaMapper<'a> {
    fn new(types: &'a [ContentType]) -> Self {
        Self {
            types: types.iter().map(|t| (t.id.as_str(), t)).collect(),
            layouts: HashMap::new(),
        }
    }

    fn layout(&mut self, item: &ContentItem) -> Result<&TableLayout> {
        let key = match item.kind {
            ItemKind::Asset => ASSET_TABLE_BASE.to_string(),
            _ => item.content_type_id.clone(),
        };

        if !self.layouts.contains_key(&key) {
            let layout = match item.kind {
                ItemKind::Asset => TableLayout::new(&ContentType::asset(), true)?,
                _ => {
                    let content_type = self.types.get(key.as_str()).ok_or_else(|| {
                        SyncError::UnknownContentType {
                            sys_id: item.sys_id.clone(),
                            content_type: key.clone(),
                        }
                    })?;
                    TableLayout::new(content_type, false)?
                }
            };
            self.layouts.insert(key.clone(), layout);
        }

        self.layouts
            .get(&key)
            .ok_or_else(|| SyncError::UnknownContentType {
                sys_id: item.sys_id.clone(),
                content_type: key,
            })
    }

    fn map_item(&mut self, schema: &mut SyncSchema, item: &ContentItem) -> Result<()> {
        if item.kind.is_deletion() {
            schema.mark_deleted(&item.sys_id);
            return Ok(());
        }

        let layout = self.layout(item)?.clone();
        if schema.unmark_deleted(&item.sys_id) {
            debug!("{} re-created after its deletion in the same batch", item.sys_id);
        }
        schema.remove_item(&item.sys_id);

        for (locale, values) in values_by_locale(&layout.content_type, item) {
            map_locale(schema, &layout, item, &locale, values)?;
        }
        Ok(())
    }
}

/// Group the item's active field values per locale, in declaration order.
/// Locales where only omitted fields carry values produce no group.
fn values_by_locale<'i>(
    content_type: &'i ContentType,
    item: &'i ContentItem,
) -> BTreeMap<String, Vec<(&'i FieldDef, &'i FieldValue)>> {
    let mut by_locale: BTreeMap<String, Vec<_>> = BTreeMap::new();
    for def in content_type.active_fields() {
        let Some(localized) = item.fields.get(&def.id) else {
            continue;
        };
        for (locale, value) in localized {
            by_locale
                .entry(format_locale(locale))
                .or_default()
                .push((def, value));
        }
    }
    by_locale
}

fn map_locale(
    schema: &mut SyncSchema,
    layout: &TableLayout,
    item: &ContentItem,
    locale: &str,
    values: Vec<(&FieldDef, &FieldValue)>,
) -> Result<()> {
    let draft_name = table_name(&layout.base, locale);
    let mut fields = BTreeMap::new();

    for (def, value) in values {
        if def.is_reference_list() {
            let target = def.link_target_type.as_deref().unwrap_or_default();
            let name = reference_table_name(&layout.base, target, locale);
            let links = value.links();
            if let FieldValue::List(elements) = value {
                if elements.len() > links.len() {
                    trace!(
                        "Skipping {} non-link elements of {}.{}",
                        elements.len() - links.len(),
                        item.sys_id,
                        def.id
                    );
                }
            }
            schema
                .references
                .entry(name.clone())
                .or_insert_with(|| ReferenceTable::new(name, draft_name.clone(), target, locale))
                .add_links(&item.sys_id, links.iter().map(|l| l.sys_id.as_str()));
            continue;
        }

        map_field(layout, item, def, value, &mut fields)?;
    }

    let row = SyncRow::new(item, fields);
    let published_name = publish_table_name(&layout.base, locale);
    schema.push_row(&published_name, || layout.published_table(locale), row.clone());
    schema.push_row(&draft_name, || layout.draft_table(locale), row);

    Ok(())
}

/// Convert one field value into its column values.
///
/// Asset files are lifted into the `url`, `file_name` and `content_type`
/// columns of asset tables. Other content types have no such columns and
/// keep an asset-shaped value as JSON text in the field's own column.
fn map_field(
    layout: &TableLayout,
    item: &ContentItem,
    def: &FieldDef,
    value: &FieldValue,
    fields: &mut BTreeMap<String, ColumnValue>,
) -> Result<()> {
    let column = snake_case(&def.id);
    let conversion_error = |source: ConvertError| SyncError::Conversion {
        sys_id: item.sys_id.clone(),
        field: def.id.clone(),
        source,
    };

    match convert(value, false).map_err(conversion_error)? {
        Converted::Value(v) => {
            fields.insert(column, v);
        }
        Converted::Asset(file) if layout.is_asset => {
            trace!("Lifting asset file of {} into file columns", item.sys_id);
            let [url, file_name, content_type] = ASSET_FILE_COLUMNS;
            fields.insert(url.to_string(), ColumnValue::Text(file.url));
            fields.insert(file_name.to_string(), ColumnValue::Text(file.file_name));
            fields.insert(content_type.to_string(), ColumnValue::Text(file.content_type));
        }
        Converted::Asset(_) => {
            fields.insert(column, to_column_value(value).map_err(conversion_error)?);
        }
        Converted::Literal(_) => {
            return Err(SyncError::UnexpectedLiteral {
                sys_id: item.sys_id.clone(),
                field: def.id.clone(),
            });
        }
    }
    Ok(())
}
