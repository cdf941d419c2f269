//! Error types for the sync engine.

use thiserror::Error;

/// Errors that can occur while mapping, syncing or querying content.
#[derive(Error, Debug)]
pub enum SyncError {
    /// PostgreSQL connection, statement or COPY error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// A field value could not be converted to its column value.
    #[error("Failed to convert field '{field}' of item '{sys_id}': {source}")]
    Conversion {
        sys_id: String,
        field: String,
        #[source]
        source: postgresql_types::ConvertError,
    },

    /// The converter returned a statement literal where a bound value was
    /// requested.
    #[error("Field '{field}' of item '{sys_id}' was rendered as a SQL literal instead of a column value")]
    UnexpectedLiteral { sys_id: String, field: String },

    /// An entry references a content type that was not supplied.
    #[error("Entry '{sys_id}' references unknown content type '{content_type}'")]
    UnknownContentType {
        sys_id: String,
        content_type: String,
    },

    /// Two field ids of one content type map to the same column.
    #[error("Fields '{first}' and '{second}' of content type '{content_type}' both map to column '{column}'")]
    ColumnCollision {
        content_type: String,
        first: String,
        second: String,
        column: String,
    },
}

/// Result alias for the sync engine.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
