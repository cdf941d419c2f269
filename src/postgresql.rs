//! PostgreSQL target: schema mapping, bulk and delta sync, queries and
//! reference rebuild.

mod client;
mod full_sync;
mod incremental_sync;
pub mod mapper;
mod query;
mod references;
pub mod schema;

pub use client::{new_postgresql_client, set_search_path};
pub use full_sync::{copy_statement, run_full_sync};
pub use incremental_sync::{render_delta, run_incremental_sync};
pub use mapper::{build_schema, TableLayout};
pub use query::{format_order, parse_query, Comparator, Filter, Query, QueryResult};
pub use references::{rebuild, ReferenceDefinition, ReferenceSchema};
pub use schema::{
    ReferenceRow, ReferenceTable, SyncRow, SyncSchema, SyncStats, SyncTable, TableKind,
};
