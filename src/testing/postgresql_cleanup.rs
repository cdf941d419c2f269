//! PostgreSQL test cleanup utilities

use anyhow::Result;
use postgresql_types::quote_ident;
use tokio_postgres::Client;

/// Drop a test schema and everything in it.
///
/// Call at both the beginning and end of tests to ensure a clean state.
pub async fn drop_test_schema(client: &Client, schema_name: &str) -> Result<()> {
    client
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE",
            quote_ident(schema_name)
        ))
        .await?;
    Ok(())
}
