//! In-memory relational description of one sync run
//!
//! A [`SyncSchema`] is built fresh by the mapper for every sync invocation,
//! consumed once by the bulk or delta executor, and dropped.

use chrono::{DateTime, Utc};
use content_core::naming::INDEX_TABLE;
use content_core::ContentItem;
use postgresql_types::ColumnValue;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Leading key column of every content table.
pub const SYS_ID_COLUMN: &str = "sysid";

/// Value written to the `*_by` audit columns.
pub const SYNC_USER: &str = "sync";

/// Audit columns of draft tables.
pub const DRAFT_META_COLUMNS: [&str; 5] = [
    "version",
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
];

/// Audit columns of published tables.
pub const PUBLISHED_META_COLUMNS: [&str; 3] = ["version", "published_at", "published_by"];

/// Columns an asset file sub-object is lifted into.
pub const ASSET_FILE_COLUMNS: [&str; 3] = ["url", "file_name", "content_type"];

/// Column of the index table naming the owning table.
pub const INDEX_TABLE_COLUMN: &str = "table_name";

/// Columns of every reference table.
pub const REFERENCE_COLUMNS: [&str; 3] = ["source_sysid", "target_sysid", "locale"];

/// Which variant a table is; decides its meta columns and conflict key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Draft,
    Published,
    Index,
}

impl TableKind {
    pub fn meta_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Draft => &DRAFT_META_COLUMNS,
            TableKind::Published => &PUBLISHED_META_COLUMNS,
            TableKind::Index => &[],
        }
    }

    /// Columns an upsert into this table conflicts on.
    pub fn conflict_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Draft | TableKind::Published => &[SYS_ID_COLUMN],
            TableKind::Index => &[SYS_ID_COLUMN, INDEX_TABLE_COLUMN],
        }
    }
}

/// One materialized row: field values plus the audit attributes with their
/// default chains already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRow {
    pub sys_id: String,
    pub fields: BTreeMap<String, ColumnValue>,
    pub version: i64,
    pub published_version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl SyncRow {
    /// Build a row for `item` carrying `fields`.
    pub fn new(item: &ContentItem, fields: BTreeMap<String, ColumnValue>) -> Self {
        let sys = &item.sys;
        Self {
            sys_id: item.sys_id.clone(),
            fields,
            version: sys.effective_version(),
            published_version: sys.effective_published_version(),
            created_at: sys.created_at,
            updated_at: sys.effective_updated_at(),
            published_at: sys.effective_published_at(),
        }
    }

    /// Row of the global index table.
    pub fn index(sys_id: &str, table_name: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            INDEX_TABLE_COLUMN.to_string(),
            ColumnValue::Text(table_name.to_string()),
        );
        Self {
            sys_id: sys_id.to_string(),
            fields,
            version: 0,
            published_version: 0,
            created_at: None,
            updated_at: None,
            published_at: None,
        }
    }

    /// Value of a field column; missing fields are null.
    pub fn field(&self, column: &str) -> ColumnValue {
        self.fields.get(column).cloned().unwrap_or(ColumnValue::Null)
    }
}

/// A target table with its ordered columns and rows.
#[derive(Debug, Clone)]
pub struct SyncTable {
    pub name: String,
    pub kind: TableKind,
    /// `sysid`, field columns, then the meta columns of `kind`
    pub columns: Vec<String>,
    pub field_columns: Vec<String>,
    pub rows: Vec<SyncRow>,
    positions: HashMap<String, usize>,
}

impl SyncTable {
    pub fn new(name: impl Into<String>, kind: TableKind, field_columns: Vec<String>) -> Self {
        let mut columns = Vec::with_capacity(field_columns.len() + 6);
        columns.push(SYS_ID_COLUMN.to_string());
        columns.extend(field_columns.iter().cloned());
        columns.extend(kind.meta_columns().iter().map(|c| c.to_string()));

        Self {
            name: name.into(),
            kind,
            columns,
            field_columns,
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// The global index table mapping item ids to the tables holding them.
    pub fn index() -> Self {
        Self::new(
            INDEX_TABLE,
            TableKind::Index,
            vec![INDEX_TABLE_COLUMN.to_string()],
        )
    }

    /// Add a row, replacing an earlier row with the same conflict key.
    pub fn push_row(&mut self, row: SyncRow) {
        let key = self.row_key(&row);
        match self.positions.get(&key) {
            Some(&pos) => self.rows[pos] = row,
            None => {
                self.positions.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    /// Remove the row with conflict key `key`: the item id, or
    /// [`index_key`] for the index table. Row order is not preserved.
    pub fn remove_row(&mut self, key: &str) -> Option<SyncRow> {
        let kind = self.kind;
        swap_remove_keyed(&mut self.rows, &mut self.positions, key, |row| {
            row_key(kind, row)
        })
    }

    fn row_key(&self, row: &SyncRow) -> String {
        row_key(self.kind, row)
    }

    /// Values of `row` in column order.
    pub fn row_values(&self, row: &SyncRow) -> Vec<ColumnValue> {
        let mut values = Vec::with_capacity(self.columns.len());
        values.push(ColumnValue::Text(row.sys_id.clone()));
        values.extend(self.field_columns.iter().map(|c| row.field(c)));

        match self.kind {
            TableKind::Draft => {
                values.push(ColumnValue::Int(row.version));
                values.push(row.created_at.into());
                values.push(ColumnValue::Text(SYNC_USER.to_string()));
                values.push(row.updated_at.into());
                values.push(ColumnValue::Text(SYNC_USER.to_string()));
            }
            TableKind::Published => {
                values.push(ColumnValue::Int(row.published_version));
                values.push(row.published_at.into());
                values.push(ColumnValue::Text(SYNC_USER.to_string()));
            }
            TableKind::Index => {}
        }

        values
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Conflict key of an index row.
pub fn index_key(sys_id: &str, table_name: &str) -> String {
    format!("{sys_id}\u{0}{table_name}")
}

fn row_key(kind: TableKind, row: &SyncRow) -> String {
    match kind {
        TableKind::Index => match row.fields.get(INDEX_TABLE_COLUMN) {
            Some(ColumnValue::Text(table)) => index_key(&row.sys_id, table),
            _ => row.sys_id.clone(),
        },
        TableKind::Draft | TableKind::Published => row.sys_id.clone(),
    }
}

/// Remove the element stored under `key`, moving the last element into its
/// slot and re-pointing that element's position.
fn swap_remove_keyed<T, K, Q>(
    items: &mut Vec<T>,
    positions: &mut HashMap<K, usize>,
    key: &Q,
    key_of: impl Fn(&T) -> K,
) -> Option<T>
where
    K: Borrow<Q> + Hash + Eq,
    Q: Hash + Eq + ?Sized,
{
    let pos = positions.remove(key)?;
    let removed = items.swap_remove(pos);
    if let Some(moved) = items.get(pos) {
        positions.insert(key_of(moved), pos);
    }
    Some(removed)
}

/// One list-of-link membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceRow {
    pub source_sys_id: String,
    pub target_sys_id: String,
    pub locale: String,
}

/// Join table for one (source table, target type, locale).
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    pub name: String,
    /// Draft table of the source content type in this locale
    pub source_table: String,
    pub target_type: String,
    pub locale: String,
    pub rows: Vec<ReferenceRow>,
    /// Source items whose references this run rewrites
    pub sources: Vec<String>,
    row_positions: HashMap<ReferenceRow, usize>,
    source_positions: HashMap<String, usize>,
    targets: HashMap<String, Vec<String>>,
}

impl ReferenceTable {
    pub fn new(
        name: impl Into<String>,
        source_table: impl Into<String>,
        target_type: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_table: source_table.into(),
            target_type: target_type.into(),
            locale: locale.into(),
            rows: Vec::new(),
            sources: Vec::new(),
            row_positions: HashMap::new(),
            source_positions: HashMap::new(),
            targets: HashMap::new(),
        }
    }

    /// Record links of one source item, keeping links recorded earlier for
    /// it. The source is registered even when it links nothing so a delta
    /// run clears its stale references.
    pub fn add_links<'a>(&mut self, source_sys_id: &str, targets: impl IntoIterator<Item = &'a str>) {
        if !self.source_positions.contains_key(source_sys_id) {
            self.source_positions
                .insert(source_sys_id.to_string(), self.sources.len());
            self.sources.push(source_sys_id.to_string());
        }
        for target in targets {
            let row = ReferenceRow {
                source_sys_id: source_sys_id.to_string(),
                target_sys_id: target.to_string(),
                locale: self.locale.clone(),
            };
            if self.row_positions.contains_key(&row) {
                continue;
            }
            self.targets
                .entry(source_sys_id.to_string())
                .or_default()
                .push(target.to_string());
            self.row_positions.insert(row.clone(), self.rows.len());
            self.rows.push(row);
        }
    }

    /// Forget a source item and all of its links. Returns whether it was
    /// registered.
    pub fn remove_source(&mut self, source_sys_id: &str) -> bool {
        let removed = swap_remove_keyed(
            &mut self.sources,
            &mut self.source_positions,
            source_sys_id,
            String::clone,
        );
        if removed.is_none() {
            return false;
        }

        for target in self.targets.remove(source_sys_id).unwrap_or_default() {
            let row = ReferenceRow {
                source_sys_id: source_sys_id.to_string(),
                target_sys_id: target,
                locale: self.locale.clone(),
            };
            swap_remove_keyed(&mut self.rows, &mut self.row_positions, &row, ReferenceRow::clone);
        }
        true
    }

    /// Values of `row` in [`REFERENCE_COLUMNS`] order.
    pub fn row_values(row: &ReferenceRow) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(row.source_sys_id.clone()),
            ColumnValue::Text(row.target_sys_id.clone()),
            ColumnValue::Text(row.locale.clone()),
        ]
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub tables_written: usize,
    pub rows_written: usize,
    /// Deletions requested; ids absent from the index delete nothing
    pub deletions: usize,
}

/// The unit of work of one sync run.
///
/// Rows enter through [`SyncSchema::push_row`] and leave through
/// [`SyncSchema::remove_item`], which keep the index table and reference
/// sources consistent with the content tables.
#[derive(Debug, Clone)]
pub struct SyncSchema {
    pub schema_name: String,
    /// Draft and published tables keyed by name
    pub tables: BTreeMap<String, SyncTable>,
    /// Global index table
    pub index: SyncTable,
    /// Reference tables keyed by name
    pub references: BTreeMap<String, ReferenceTable>,
    /// Ids of deleted entries and assets
    pub deleted: Vec<String>,
    deleted_positions: HashMap<String, usize>,
    /// Content tables holding each item
    placements: HashMap<String, Vec<String>>,
}

impl SyncSchema {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            tables: BTreeMap::new(),
            index: SyncTable::index(),
            references: BTreeMap::new(),
            deleted: Vec::new(),
            deleted_positions: HashMap::new(),
            placements: HashMap::new(),
        }
    }

    /// Add `row` to `table_name`, creating the table with `new_table` on
    /// first use, and record it in the index.
    pub fn push_row(
        &mut self,
        table_name: &str,
        new_table: impl FnOnce() -> SyncTable,
        row: SyncRow,
    ) {
        self.index.push_row(SyncRow::index(&row.sys_id, table_name));

        let placed = self.placements.entry(row.sys_id.clone()).or_default();
        if !placed.iter().any(|t| t == table_name) {
            placed.push(table_name.to_string());
        }

        self.tables
            .entry(table_name.to_string())
            .or_insert_with(new_table)
            .push_row(row);
    }

    /// Drop every row, index row and reference source recorded for
    /// `sys_id`. Emptied tables stay and are skipped by the executors.
    pub fn remove_item(&mut self, sys_id: &str) {
        let Some(placed) = self.placements.remove(sys_id) else {
            return;
        };
        for table_name in &placed {
            if let Some(table) = self.tables.get_mut(table_name) {
                table.remove_row(sys_id);
            }
            self.index.remove_row(&index_key(sys_id, table_name));
        }
        for refs in self.references.values_mut() {
            refs.remove_source(sys_id);
        }
    }

    /// Record a deletion, dropping anything the batch built for `sys_id`
    /// before it.
    pub fn mark_deleted(&mut self, sys_id: &str) {
        self.remove_item(sys_id);
        if !self.deleted_positions.contains_key(sys_id) {
            self.deleted_positions
                .insert(sys_id.to_string(), self.deleted.len());
            self.deleted.push(sys_id.to_string());
        }
    }

    /// Withdraw a recorded deletion. Returns whether one was recorded.
    pub fn unmark_deleted(&mut self, sys_id: &str) -> bool {
        swap_remove_keyed(
            &mut self.deleted,
            &mut self.deleted_positions,
            sys_id,
            String::clone,
        )
        .is_some()
    }

    /// Regular tables followed by the index table.
    pub fn all_tables(&self) -> impl Iterator<Item = &SyncTable> {
        self.tables.values().chain(std::iter::once(&self.index))
    }

    /// Total rows across regular, reference and index tables.
    pub fn row_count(&self) -> usize {
        self.all_tables().map(|t| t.rows.len()).sum::<usize>()
            + self.references.values().map(|r| r.rows.len()).sum::<usize>()
    }

    /// Counters reported for a run applying this schema.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            tables_written: self.all_tables().filter(|t| !t.is_empty()).count()
                + self.references.values().filter(|r| !r.sources.is_empty()).count(),
            rows_written: self.row_count(),
            deletions: self.deleted.len(),
        }
    }

    /// Nothing to write and nothing to delete.
    pub fn is_empty(&self) -> bool {
        self.all_tables().all(SyncTable::is_empty)
            && self.references.values().all(|r| r.sources.is_empty())
            && self.deleted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use content_core::SysMeta;

    fn item(id: &str) -> ContentItem {
        let mut item = ContentItem::entry(id, "article");
        item.sys = SysMeta {
            version: Some(3),
            created_at: Some("2024-01-01T00:00:00Z".parse().unwrap()),
            ..Default::default()
        };
        item
    }

    #[test]
    fn test_columns_by_kind() {
        let draft = SyncTable::new("article_en", TableKind::Draft, vec!["title".into()]);
        assert_eq!(
            draft.columns,
            vec!["sysid", "title", "version", "created_at", "created_by", "updated_at", "updated_by"]
        );

        let published = SyncTable::new("article_en_publish", TableKind::Published, vec!["title".into()]);
        assert_eq!(
            published.columns,
            vec!["sysid", "title", "version", "published_at", "published_by"]
        );

        assert_eq!(SyncTable::index().columns, vec!["sysid", "table_name"]);
    }

    #[test]
    fn test_row_values_follow_column_order() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), ColumnValue::Text("Hi".into()));
        let row = SyncRow::new(&item("a"), fields);
        let created = row.created_at;

        let draft = SyncTable::new("article_en", TableKind::Draft, vec!["title".into(), "body".into()]);
        assert_eq!(
            draft.row_values(&row),
            vec![
                ColumnValue::Text("a".into()),
                ColumnValue::Text("Hi".into()),
                ColumnValue::Null,
                ColumnValue::Int(3),
                created.into(),
                ColumnValue::Text("sync".into()),
                created.into(),
                ColumnValue::Text("sync".into()),
            ]
        );

        let published = SyncTable::new("article_en_publish", TableKind::Published, vec!["title".into()]);
        assert_eq!(
            published.row_values(&row),
            vec![
                ColumnValue::Text("a".into()),
                ColumnValue::Text("Hi".into()),
                ColumnValue::Int(3),
                created.into(),
                ColumnValue::Text("sync".into()),
            ]
        );
    }

    #[test]
    fn test_push_row_replaces_same_key() {
        let mut table = SyncTable::new("article_en", TableKind::Draft, vec![]);
        table.push_row(SyncRow::new(&item("a"), BTreeMap::new()));
        table.push_row(SyncRow::new(&item("b"), BTreeMap::new()));
        let mut newer = item("a");
        newer.sys.version = Some(9);
        table.push_row(SyncRow::new(&newer, BTreeMap::new()));

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].version, 9);

        let mut index = SyncTable::index();
        index.push_row(SyncRow::index("a", "article_en"));
        index.push_row(SyncRow::index("a", "article_en_publish"));
        index.push_row(SyncRow::index("a", "article_en"));
        assert_eq!(index.rows.len(), 2);
    }

    #[test]
    fn test_reference_table_dedupes() {
        let mut refs = ReferenceTable::new("article__author_en", "article_en", "author", "en");
        refs.add_links("a", ["x", "y", "x"]);
        refs.add_links("b", []);
        assert_eq!(refs.rows.len(), 2);
        assert_eq!(refs.sources, vec!["a", "b"]);
    }

    #[test]
    fn test_remove_row_keeps_positions() {
        let mut table = SyncTable::new("article_en", TableKind::Draft, vec![]);
        for id in ["a", "b", "c"] {
            table.push_row(SyncRow::new(&item(id), BTreeMap::new()));
        }

        assert!(table.remove_row("a").is_some());
        assert!(table.remove_row("a").is_none());
        let ids: Vec<&str> = table.rows.iter().map(|r| r.sys_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        // the moved row is still addressable
        let mut newer = item("c");
        newer.sys.version = Some(7);
        table.push_row(SyncRow::new(&newer, BTreeMap::new()));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].version, 7);
    }

    #[test]
    fn test_reference_table_remove_source() {
        let mut refs = ReferenceTable::new("article__article_en", "article_en", "article", "en");
        refs.add_links("a", ["x", "y"]);
        refs.add_links("b", ["x"]);
        refs.add_links("a", ["z"]);
        assert_eq!(refs.rows.len(), 4);

        assert!(refs.remove_source("a"));
        assert!(!refs.remove_source("a"));
        assert_eq!(refs.sources, vec!["b"]);
        assert_eq!(refs.rows.len(), 1);
        assert_eq!(refs.rows[0].source_sys_id, "b");

        refs.add_links("a", ["y"]);
        assert_eq!(refs.rows.len(), 2);
    }

    #[test]
    fn test_remove_item_clears_index_and_references() {
        let mut schema = SyncSchema::new("content");
        let draft = || SyncTable::new("article_en", TableKind::Draft, vec![]);
        let published = || SyncTable::new("article_en_publish", TableKind::Published, vec![]);
        for id in ["a", "b"] {
            let row = SyncRow::new(&item(id), BTreeMap::new());
            schema.push_row("article_en_publish", published, row.clone());
            schema.push_row("article_en", draft, row);
        }
        schema
            .references
            .entry("article__article_en".into())
            .or_insert_with(|| ReferenceTable::new("article__article_en", "article_en", "article", "en"))
            .add_links("a", ["b"]);

        schema.remove_item("a");

        assert_eq!(schema.tables["article_en"].rows.len(), 1);
        assert_eq!(schema.tables["article_en_publish"].rows.len(), 1);
        assert_eq!(schema.index.rows.len(), 2);
        assert!(schema.index.rows.iter().all(|r| r.sys_id == "b"));
        assert!(schema.references["article__article_en"].sources.is_empty());
    }

    #[test]
    fn test_mark_and_unmark_deleted() {
        let mut schema = SyncSchema::new("content");
        schema.push_row(
            "article_en",
            || SyncTable::new("article_en", TableKind::Draft, vec![]),
            SyncRow::new(&item("a"), BTreeMap::new()),
        );

        schema.mark_deleted("a");
        schema.mark_deleted("b");
        schema.mark_deleted("a");
        assert_eq!(schema.deleted, vec!["a", "b"]);
        assert!(schema.tables["article_en"].is_empty());
        assert!(schema.index.is_empty());

        assert!(schema.unmark_deleted("a"));
        assert!(!schema.unmark_deleted("a"));
        assert_eq!(schema.deleted, vec!["b"]);
    }

    #[test]
    fn test_large_batch_of_deletions() {
        let mut schema = SyncSchema::new("content");
        let mut refs = ReferenceTable::new("article__article_en", "article_en", "article", "en");
        for i in 0..50_000 {
            let id = format!("item{i}");
            schema.mark_deleted(&id);
            refs.add_links(&id, ["target"]);
        }
        assert_eq!(schema.deleted.len(), 50_000);
        assert_eq!(refs.sources.len(), 50_000);
        assert_eq!(refs.rows.len(), 50_000);
    }

    #[test]
    fn test_empty_schema() {
        let mut schema = SyncSchema::new("content");
        assert!(schema.is_empty());
        assert_eq!(schema.stats(), SyncStats::default());
        schema.mark_deleted("x");
        assert!(!schema.is_empty());
        assert_eq!(schema.stats().deletions, 1);
    }
}
