//! Bulk load of a [`SyncSchema`] into an empty target
//!
//! Every table with rows is streamed through binary `COPY ... FROM STDIN`,
//! each statement carrying at most `copy_batch_rows` rows. All tables are
//! loaded in one transaction; any failure rolls back the whole run.

use super::schema::{ReferenceTable, SyncSchema, SyncStats, REFERENCE_COLUMNS};
use crate::error::Result;
use futures::pin_mut;
use postgresql_types::{quote_ident, ColumnValue};
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Transaction};
use tracing::{debug, info};

/// Bulk-load `schema`. Performs no existence checks; the target tables
/// must be empty, so deletions in the batch have nothing to remove.
pub async fn run_full_sync(
    client: &mut Client,
    schema: &SyncSchema,
    copy_batch_rows: usize,
) -> Result<SyncStats> {
    let stats = SyncStats {
        deletions: 0,
        ..schema.stats()
    };
    if !schema.deleted.is_empty() {
        debug!(
            "Skipping {} deletions during bulk load",
            schema.deleted.len()
        );
    }
    if stats.rows_written == 0 {
        info!("Nothing to load into schema {}", schema.schema_name);
        return Ok(stats);
    }

    info!(
        "Starting bulk load of {} rows into schema {}",
        stats.rows_written, schema.schema_name
    );

    let tx = client.transaction().await?;
    let batch_rows = copy_batch_rows.max(1);

    for table in schema.tables.values().filter(|t| !t.is_empty()) {
        let rows: Vec<Vec<ColumnValue>> = table.rows.iter().map(|row| table.row_values(row)).collect();
        copy_rows(&tx, &table.name, &table.columns, &rows, batch_rows).await?;
    }

    let reference_columns: Vec<String> = REFERENCE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for refs in schema.references.values().filter(|r| !r.rows.is_empty()) {
        let rows: Vec<Vec<ColumnValue>> = refs.rows.iter().map(ReferenceTable::row_values).collect();
        copy_rows(&tx, &refs.name, &reference_columns, &rows, batch_rows).await?;
    }

    let index = &schema.index;
    if !index.is_empty() {
        let rows: Vec<Vec<ColumnValue>> = index.rows.iter().map(|row| index.row_values(row)).collect();
        copy_rows(&tx, &index.name, &index.columns, &rows, batch_rows).await?;
    }

    tx.commit().await?;

    info!(
        "Bulk load complete: {} rows across {} tables",
        stats.rows_written, stats.tables_written
    );
    Ok(stats)
}

/// Statement opening a binary COPY into `table`.
pub fn copy_statement(table: &str, columns: &[String]) -> String {
    format!(
        "COPY {} ({}) FROM STDIN (FORMAT binary)",
        quote_ident(table),
        column_list(columns)
    )
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Declared types of `columns`, in order.
async fn column_types(tx: &Transaction<'_>, table: &str, columns: &[String]) -> Result<Vec<Type>> {
    let statement = tx
        .prepare(&format!(
            "SELECT {} FROM {}",
            column_list(columns),
            quote_ident(table)
        ))
        .await?;
    Ok(statement
        .columns()
        .iter()
        .map(|c| c.type_().clone())
        .collect())
}

async fn copy_rows(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[String],
    rows: &[Vec<ColumnValue>],
    batch_rows: usize,
) -> Result<u64> {
    let types = column_types(tx, table, columns).await?;
    let statement = copy_statement(table, columns);

    let mut copied = 0;
    for chunk in rows.chunks(batch_rows) {
        let sink = tx.copy_in(statement.as_str()).await?;
        let writer = BinaryCopyInWriter::new(sink, &types);
        pin_mut!(writer);

        for values in chunk {
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            writer.as_mut().write(&params).await?;
        }
        copied += writer.finish().await?;
    }

    debug!("Copied {copied} rows into {table}");
    Ok(copied)
}
