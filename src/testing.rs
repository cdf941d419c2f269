//! Test infrastructure for integration tests against a live PostgreSQL
//!
//! Provides connection configuration, unique test ids, sample content and
//! the fixture DDL (content tables and `<table>_query` procedures) that
//! the mirror expects to exist.

pub mod content;
pub mod postgresql;
pub mod postgresql_cleanup;
pub mod test_helpers;

pub use content::{sample_content_types, sample_items, sample_locales};
pub use test_helpers::generate_test_id;
