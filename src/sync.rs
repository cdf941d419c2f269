//! Sync orchestration
//!
//! Entry points that tie the pieces together for one run: connect, select
//! the target schema, map the batch and apply it.
//!
//! # Sync modes
//!
//! - [`SyncMode::Initial`] bulk-loads an empty target with `COPY`. It performs
//!   no existence checks and fails on any conflict.
//! - [`SyncMode::Delta`] upserts every row and deletes every deleted item.
//!   Replaying a delta leaves the target unchanged.
//!
//! Both modes run in a single transaction; a failed run applies nothing.
//! Runs against the same schema must be serialized by the caller.

use crate::postgresql::{
    build_schema, new_postgresql_client, parse_query, rebuild, run_full_sync,
    run_incremental_sync, set_search_path, QueryResult, ReferenceSchema, SyncSchema, SyncStats,
};
use crate::PostgresOpts;
use anyhow::{Context, Result};
use content_core::{ContentItem, ContentType, Locale};
use std::collections::BTreeMap;
use tokio_postgres::Client;
use tracing::info;

/// How a sync run applies its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Bulk load into empty tables
    Initial,
    /// Idempotent upsert and delete
    Delta,
}

impl SyncMode {
    pub fn from_initial(is_initial: bool) -> Self {
        if is_initial {
            SyncMode::Initial
        } else {
            SyncMode::Delta
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Initial => "initial",
            SyncMode::Delta => "delta",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply an already mapped schema over an open connection.
pub async fn apply_schema(
    client: &mut Client,
    schema: &SyncSchema,
    mode: SyncMode,
    copy_batch_rows: usize,
) -> crate::error::Result<SyncStats> {
    set_search_path(client, &schema.schema_name).await?;
    match mode {
        SyncMode::Initial => run_full_sync(client, schema, copy_batch_rows).await,
        SyncMode::Delta => run_incremental_sync(client, schema).await,
    }
}

/// Mirror one batch of content into the configured schema.
///
/// `is_initial` selects the bulk path; otherwise the batch is applied as a
/// delta.
pub async fn run_sync(
    opts: &PostgresOpts,
    types: &[ContentType],
    items: &[ContentItem],
    is_initial: bool,
) -> Result<SyncStats> {
    let mode = SyncMode::from_initial(is_initial);
    info!(
        "Starting {mode} sync of {} items into schema {}",
        items.len(),
        opts.schema_name
    );

    let schema = build_schema(&opts.schema_name, types, items)
        .context("Failed to map content items")?;

    let mut client = new_postgresql_client(&opts.postgresql_connection_string)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let stats = apply_schema(&mut client, &schema, mode, opts.copy_batch_rows)
        .await
        .with_context(|| format!("{mode} sync into schema '{}' failed", opts.schema_name))?;

    info!(
        "Finished {mode} sync: {} rows in {} tables, {} deletions",
        stats.rows_written, stats.tables_written, stats.deletions
    );
    Ok(stats)
}

/// Translate and execute a content query against the configured schema.
pub async fn run_query(
    opts: &PostgresOpts,
    params: BTreeMap<String, Vec<String>>,
) -> Result<QueryResult> {
    let query = parse_query(&opts.default_locale, params).with_schema(&opts.schema_name);

    let client = new_postgresql_client(&opts.postgresql_connection_string)
        .await
        .context("Failed to connect to PostgreSQL")?;

    query
        .execute(&client)
        .await
        .with_context(|| format!("Query on table '{}' failed", query.table_name))
}

/// Re-create the reference tables and constraints implied by `types`.
pub async fn run_rebuild(
    opts: &PostgresOpts,
    types: &[ContentType],
    locales: &[Locale],
) -> Result<()> {
    let references = ReferenceSchema::from_content_types(&opts.schema_name, types, locales);

    let mut client = new_postgresql_client(&opts.postgresql_connection_string)
        .await
        .context("Failed to connect to PostgreSQL")?;

    rebuild(&mut client, &references)
        .await
        .with_context(|| format!("Reference rebuild of schema '{}' failed", opts.schema_name))
}
