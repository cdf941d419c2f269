//! Driver-side binding of [`ColumnValue`]s.
//!
//! `ColumnValue` implements [`ToSql`] so rows can be streamed through
//! `tokio_postgres::binary_copy::BinaryCopyInWriter` or bound as statement
//! parameters. The binary wire format is typed, so each variant is encoded
//! for the declared type of the target column: integers narrow to `int2` and
//! `int4` (failing on overflow), floats narrow to `float4`, text becomes
//! `json`/`jsonb` when the column asks for it, and timestamps drop their zone
//! for `timestamp` columns. `Null` fits any column.

use crate::forward::ColumnValue;
use bytes::BytesMut;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for ColumnValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            ColumnValue::Null => Ok(IsNull::Yes),
            ColumnValue::Bool(b) => b.to_sql_checked(ty, out),
            ColumnValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql_checked(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql_checked(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql_checked(ty, out),
                _ => i.to_sql_checked(ty, out),
            },
            ColumnValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql_checked(ty, out),
                _ => f.to_sql_checked(ty, out),
            },
            ColumnValue::Text(s) => match *ty {
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql_checked(ty, out)
                }
                _ => s.to_sql_checked(ty, out),
            },
            ColumnValue::TextArray(items) => items.to_sql_checked(ty, out),
            ColumnValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.naive_utc().to_sql_checked(ty, out),
                _ => ts.to_sql_checked(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn encode(value: ColumnValue, ty: &Type) -> Result<BytesMut, BoxError> {
        let mut out = BytesMut::new();
        value.to_sql_checked(ty, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_null_fits_any_column() {
        for ty in [Type::TEXT, Type::INT8, Type::BOOL, Type::TEXT_ARRAY, Type::TIMESTAMPTZ] {
            let mut out = BytesMut::new();
            let is_null = ColumnValue::Null.to_sql_checked(&ty, &mut out).unwrap();
            assert!(matches!(is_null, IsNull::Yes));
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_int_follows_column_width() {
        assert_eq!(encode(ColumnValue::Int(7), &Type::INT8).unwrap().len(), 8);
        assert_eq!(encode(ColumnValue::Int(7), &Type::INT4).unwrap().len(), 4);
        assert_eq!(encode(ColumnValue::Int(7), &Type::INT2).unwrap().len(), 2);
        assert!(encode(ColumnValue::Int(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn test_float_follows_column_width() {
        assert_eq!(encode(ColumnValue::Float(1.5), &Type::FLOAT8).unwrap().len(), 8);
        assert_eq!(encode(ColumnValue::Float(1.5), &Type::FLOAT4).unwrap().len(), 4);
        assert!(encode(ColumnValue::Float(f64::NAN), &Type::FLOAT8).is_ok());
    }

    #[test]
    fn test_text_into_json_column() {
        assert!(encode(ColumnValue::Text(r#"{"a":1}"#.into()), &Type::JSONB).is_ok());
        assert!(encode(ColumnValue::Text("not json".into()), &Type::JSONB).is_err());
        assert_eq!(
            &encode(ColumnValue::Text("hi".into()), &Type::TEXT).unwrap()[..],
            b"hi"
        );
    }

    #[test]
    fn test_mismatched_column_type_is_rejected() {
        assert!(encode(ColumnValue::Text("x".into()), &Type::INT8).is_err());
        assert!(encode(ColumnValue::Bool(true), &Type::TEXT).is_err());
        assert!(encode(ColumnValue::TextArray(vec!["a".into()]), &Type::TEXT).is_err());
    }

    #[test]
    fn test_timestamp_with_and_without_zone() {
        let ts: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        let with_zone = encode(ColumnValue::Timestamp(ts), &Type::TIMESTAMPTZ).unwrap();
        let without_zone = encode(ColumnValue::Timestamp(ts), &Type::TIMESTAMP).unwrap();
        assert_eq!(with_zone, without_zone);
    }
}
