//! Incremental (delta) sync of a [`SyncSchema`]
//!
//! The whole schema is rendered into one SQL script of literal-embedded
//! upserts followed by the deletion block, and executed in a single
//! transaction. Every statement is idempotent, so replaying the same delta
//! leaves the target unchanged.

use super::schema::{
    ReferenceTable, SyncSchema, SyncStats, SyncTable, INDEX_TABLE_COLUMN, REFERENCE_COLUMNS,
    SYS_ID_COLUMN,
};
use crate::error::Result;
use content_core::naming::INDEX_TABLE;
use postgresql_types::{quote_ident, quote_literal, ColumnValue};
use tokio_postgres::Client;
use tracing::{debug, info};

/// Upper bound of rows per rendered `INSERT`.
const ROWS_PER_INSERT: usize = 500;

/// Apply `schema` as a delta: upsert every row, refresh references and
/// delete every item in the deletion list.
pub async fn run_incremental_sync(client: &mut Client, schema: &SyncSchema) -> Result<SyncStats> {
    let stats = schema.stats();
    if schema.is_empty() {
        info!("No changes to apply to schema {}", schema.schema_name);
        return Ok(stats);
    }

    let sql = render_delta(schema);
    info!(
        "Applying delta to schema {}: {} rows, {} deletions ({} bytes of SQL)",
        schema.schema_name,
        stats.rows_written,
        stats.deletions,
        sql.len()
    );

    let tx = client.transaction().await?;
    tx.batch_execute(&sql).await?;
    tx.commit().await?;

    info!("Delta applied to schema {}", schema.schema_name);
    Ok(stats)
}

/// Render the delta script for `schema`.
///
/// Order: content table upserts, reference refresh, index upsert, then the
/// deletion block.
pub fn render_delta(schema: &SyncSchema) -> String {
    let mut statements = Vec::new();

    for table in schema.tables.values().filter(|t| !t.is_empty()) {
        render_upserts(table, &mut statements);
    }

    for refs in schema.references.values() {
        render_reference_refresh(refs, &mut statements);
    }

    render_upserts(&schema.index, &mut statements);

    if !schema.deleted.is_empty() {
        statements.push(render_deletions(&schema.deleted));
    }

    debug!("Rendered {} delta statements", statements.len());
    statements.join("\n")
}

fn render_upserts(table: &SyncTable, statements: &mut Vec<String>) {
    let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
    let conflict: Vec<String> = table
        .kind
        .conflict_columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect();

    let updates: Vec<String> = table
        .columns
        .iter()
        .filter(|c| !table.kind.conflict_columns().contains(&c.as_str()))
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect();
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    for chunk in table.rows.chunks(ROWS_PER_INSERT) {
        let values: Vec<String> = chunk
            .iter()
            .map(|row| values_tuple(&table.row_values(row)))
            .collect();
        statements.push(format!(
            "INSERT INTO {} ({}) VALUES\n{}\nON CONFLICT ({}) {};",
            quote_ident(&table.name),
            columns.join(", "),
            values.join(",\n"),
            conflict.join(", "),
            action
        ));
    }
}

fn render_reference_refresh(refs: &ReferenceTable, statements: &mut Vec<String>) {
    if refs.sources.is_empty() {
        return;
    }

    statements.push(format!(
        "DELETE FROM {} WHERE {} IN ({});",
        quote_ident(&refs.name),
        quote_ident(REFERENCE_COLUMNS[0]),
        literal_list(&refs.sources)
    ));

    let columns: Vec<String> = REFERENCE_COLUMNS.iter().map(|c| quote_ident(c)).collect();
    for chunk in refs.rows.chunks(ROWS_PER_INSERT) {
        let values: Vec<String> = chunk
            .iter()
            .map(|row| values_tuple(&ReferenceTable::row_values(row)))
            .collect();
        statements.push(format!(
            "INSERT INTO {} ({}) VALUES\n{}\nON CONFLICT DO NOTHING;",
            quote_ident(&refs.name),
            columns.join(", "),
            values.join(",\n")
        ));
    }
}

/// Delete each id from every table the index lists it in, then drop its
/// index entries. Ids unknown to the index are no-ops.
fn render_deletions(deleted: &[String]) -> String {
    let ids = literal_list(deleted);
    let body = format!(
        "
DECLARE
    entry record;
BEGIN
    FOR entry IN SELECT {sysid}, {table} FROM {index} WHERE {sysid} IN ({ids}) LOOP
        EXECUTE format('DELETE FROM %I WHERE {sysid} = %L', entry.{table}, entry.{sysid});
    END LOOP;
    DELETE FROM {index} WHERE {sysid} IN ({ids});
END
",
        sysid = SYS_ID_COLUMN,
        table = INDEX_TABLE_COLUMN,
        index = quote_ident(INDEX_TABLE),
    );
    format!("DO {};", dollar_quote(&body))
}

fn values_tuple(values: &[ColumnValue]) -> String {
    let literals: Vec<String> = values.iter().map(ColumnValue::to_sql_literal).collect();
    format!("({})", literals.join(", "))
}

fn literal_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| quote_literal(v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wrap `body` in a dollar-quoted string whose tag does not occur in it.
pub(crate) fn dollar_quote(body: &str) -> String {
    let mut tag = "$sync$".to_string();
    let mut n = 0;
    while body.contains(&tag) {
        n += 1;
        tag = format!("$sync{n}$");
    }
    format!("{tag}{body}{tag}")
}
