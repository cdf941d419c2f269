//! PostgreSQL value conversions for content-core field values.
//!
//! This crate turns a classified [`content_core::FieldValue`] into the value a
//! PostgreSQL column receives, in one of two renderings:
//!
//! - a [`ColumnValue`] bound through the driver's [`ToSql`] during bulk
//!   loads, or
//! - a SQL literal embedded into generated statement text during delta syncs.
//!
//! All quoting and escaping for both renderings lives here.
//!
//! [`ToSql`]: tokio_postgres::types::ToSql
//!
//! # Modules
//!
//! - [`forward`] - FieldValue → ColumnValue / SQL literal conversion
//! - [`param`] - `ToSql` binding of column values for binary `COPY`
//!
//! # Example
//!
//! ```
//! use content_core::FieldValue;
//! use postgresql_types::{convert, Converted};
//!
//! let v = FieldValue::Text("it's".to_string());
//! match convert(&v, true).unwrap() {
//!     Converted::Literal(sql) => assert_eq!(sql, "'it''s'"),
//!     _ => unreachable!(),
//! }
//! ```

pub mod forward;
pub mod param;

pub use forward::{
    convert, quote_ident, quote_literal, to_column_value, ColumnValue, ConvertError, Converted,
};
