//! PostgreSQL client utilities

use crate::error::Result;
use postgresql_types::quote_ident;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

/// Create a new PostgreSQL client with connection handling
pub async fn new_postgresql_client(connection_string: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {e}");
        }
    });

    Ok(client)
}

/// Point unqualified table names of this session at `schema_name`.
pub async fn set_search_path(client: &Client, schema_name: &str) -> Result<()> {
    debug!("Setting search path to {schema_name}");
    client
        .batch_execute(&format!("SET search_path TO {}", quote_ident(schema_name)))
        .await?;
    Ok(())
}
