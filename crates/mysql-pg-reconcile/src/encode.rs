//! Value encoding: the single boundary between fetched values and statement text.
//!
//! Every value placed into a generated statement goes through
//! [`Encoder::encode`]. Column policy (NULL defaults, text prefixes,
//! synthesized timestamps) is applied here, before the dialect's literal rules.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::core::schema::{ColumnKind, ColumnSpec};
use crate::core::traits::Dialect;
use crate::core::value::{KeyValue, Value};
use crate::error::{ReconcileError, Result};

/// Largest float that still converts to an `i64` without loss of range.
const I64_FLOAT_BOUND: f64 = 9_223_372_036_854_775_807.0;

/// A value rendered for a statement (`NULL`, a number, or a quoted string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal(String);

impl Literal {
    /// The SQL NULL literal.
    pub fn null() -> Self {
        Literal("NULL".to_string())
    }

    /// Borrow the literal text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the literal text.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this is the NULL literal.
    pub fn is_null(&self) -> bool {
        self.0 == "NULL"
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes values into literals of one target dialect.
///
/// The migration time is captured once per run so that synthesized timestamps
/// are identical across every row of the run and encoding stays pure.
pub struct Encoder<'a> {
    dialect: &'a dyn Dialect,
    migration_time: NaiveDateTime,
}

impl<'a> Encoder<'a> {
    /// Create an encoder for a dialect.
    pub fn new(dialect: &'a dyn Dialect, migration_time: DateTime<Utc>) -> Self {
        Self {
            dialect,
            migration_time: migration_time.naive_utc(),
        }
    }

    /// The dialect literals are rendered for.
    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Encode a value for a column.
    pub fn encode(&self, value: &Value, column: &ColumnSpec) -> Result<Literal> {
        if column.synthesized {
            return match (&column.default, column.kind) {
                (Some(default), _) => self.encode_kind(&Value::Text(default.clone()), column),
                (None, ColumnKind::Timestamp) => Ok(self.now()),
                (None, _) => Err(ReconcileError::encoding(
                    &column.name,
                    "synthesized column has no default",
                )),
            };
        }

        let value = match (value, &column.default) {
            (Value::Null, Some(default)) => Value::Text(default.clone()),
            (Value::Null, None) => return Ok(Literal::null()),
            (v, _) => v.clone(),
        };

        let value = match (&column.prefix, value) {
            (Some(prefix), Value::Text(text)) if !text.starts_with(prefix.as_str()) => {
                Value::Text(format!("{}{}", prefix, text))
            }
            (_, v) => v,
        };

        self.encode_kind(&value, column)
    }

    /// Encode a primary key value for the key column.
    pub fn encode_key(&self, key: &KeyValue, column: &ColumnSpec) -> Result<Literal> {
        key_literal(self.dialect, key, column)
    }

    fn encode_kind(&self, value: &Value, column: &ColumnSpec) -> Result<Literal> {
        match column.kind {
            ColumnKind::Integer => encode_integer(value, column),
            ColumnKind::Float => encode_float(value, column),
            ColumnKind::Text | ColumnKind::NullableText => encode_text(self.dialect, value, column),
            ColumnKind::Timestamp => match value {
                Value::Text(text) if is_zero_date(text) => Ok(self.now()),
                _ => encode_text(self.dialect, value, column),
            },
        }
    }

    fn now(&self) -> Literal {
        Literal(self.dialect.timestamp_literal(self.migration_time))
    }
}

/// Encode a primary key for use in a `WHERE` clause of the given dialect.
///
/// Keys need no column policy and no migration time, so readers use this
/// directly with their own dialect.
pub fn key_literal(dialect: &dyn Dialect, key: &KeyValue, column: &ColumnSpec) -> Result<Literal> {
    match column.kind {
        ColumnKind::Integer => encode_integer(&key.to_value(), column),
        ColumnKind::Float => Err(ReconcileError::encoding(
            &column.name,
            "float columns cannot be primary keys",
        )),
        ColumnKind::Text | ColumnKind::NullableText | ColumnKind::Timestamp => {
            encode_text(dialect, &key.to_value(), column)
        }
    }
}

fn encode_text(dialect: &dyn Dialect, value: &Value, column: &ColumnSpec) -> Result<Literal> {
    let text = match value {
        Value::Null => return Ok(Literal::null()),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(v) => v.clone(),
    };

    dialect
        .quote_text(&text)
        .map(Literal)
        .map_err(|message| ReconcileError::encoding(&column.name, message))
}

fn encode_integer(value: &Value, column: &ColumnSpec) -> Result<Literal> {
    match value {
        Value::Null => Ok(Literal::null()),
        Value::Int(v) => Ok(Literal(v.to_string())),
        Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() <= I64_FLOAT_BOUND => {
            Ok(Literal((*v as i64).to_string()))
        }
        Value::Float(v) => Err(ReconcileError::encoding(
            &column.name,
            format!("{} is not an integer", v),
        )),
        Value::Text(text) => text
            .trim()
            .parse::<i64>()
            .map(|v| Literal(v.to_string()))
            .map_err(|_| {
                ReconcileError::encoding(&column.name, format!("{:?} is not an integer", text))
            }),
    }
}

fn encode_float(value: &Value, column: &ColumnSpec) -> Result<Literal> {
    let parsed = match value {
        Value::Null => return Ok(Literal::null()),
        Value::Int(v) => return Ok(Literal(v.to_string())),
        Value::Float(v) => *v,
        Value::Text(text) => text.trim().parse::<f64>().map_err(|_| {
            ReconcileError::encoding(&column.name, format!("{:?} is not a number", text))
        })?,
    };

    if !parsed.is_finite() {
        return Err(ReconcileError::encoding(
            &column.name,
            format!("{} has no SQL literal", parsed),
        ));
    }

    Ok(Literal(parsed.to_string()))
}

/// MySQL "zero" dates carry no usable value.
fn is_zero_date(text: &str) -> bool {
    text.starts_with("0000-00-00")
}

/// Parse a text literal produced by the encoder back into its value.
pub fn decode_text_literal(literal: &Literal, dialect: &dyn Dialect) -> Option<String> {
    dialect.decode_text(literal.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{MysqlDialect, PostgresDialect};
    use chrono::TimeZone;

    fn migration_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 14, 12, 30, 0).unwrap()
    }

    fn pg() -> PostgresDialect {
        PostgresDialect::new()
    }

    #[test]
    fn test_null_for_every_kind() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        for kind in [
            ColumnKind::Integer,
            ColumnKind::Float,
            ColumnKind::Text,
            ColumnKind::NullableText,
            ColumnKind::Timestamp,
        ] {
            let column = ColumnSpec::new("c", kind);
            assert!(encoder.encode(&Value::Null, &column).unwrap().is_null());
        }
    }

    #[test]
    fn test_integer() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("id", ColumnKind::Integer);
        assert_eq!(encoder.encode(&Value::Int(-7), &column).unwrap().as_str(), "-7");
        assert_eq!(
            encoder.encode(&Value::Text(" 42".into()), &column).unwrap().as_str(),
            "42"
        );
        assert_eq!(encoder.encode(&Value::Float(3.0), &column).unwrap().as_str(), "3");
    }

    #[test]
    fn test_integer_rejects_non_numeric() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("id", ColumnKind::Integer);
        let err = encoder
            .encode(&Value::Text("12; DROP TABLE x".into()), &column)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Encoding { .. }));
        assert!(encoder.encode(&Value::Float(1.5), &column).is_err());
    }

    #[test]
    fn test_float() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("moyennenotes", ColumnKind::Float);
        assert_eq!(encoder.encode(&Value::Float(7.25), &column).unwrap().as_str(), "7.25");
        assert_eq!(
            encoder.encode(&Value::Text("8.5".into()), &column).unwrap().as_str(),
            "8.5"
        );
        assert!(encoder.encode(&Value::Float(f64::NAN), &column).is_err());
        assert!(encoder.encode(&Value::Text("abc".into()), &column).is_err());
    }

    #[test]
    fn test_text_escaping_pg() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("titre", ColumnKind::Text);
        assert_eq!(
            encoder.encode(&Value::Text("l'été".into()), &column).unwrap().as_str(),
            "'l''été'"
        );
        assert_eq!(
            encoder.encode(&Value::Text("a\\'b".into()), &column).unwrap().as_str(),
            "E'a\\\\''b'"
        );
    }

    #[test]
    fn test_text_nul_is_encoding_error_for_pg() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("titre", ColumnKind::Text);
        let err = encoder.encode(&Value::Text("a\0".into()), &column).unwrap_err();
        assert!(matches!(err, ReconcileError::Encoding { ref column, .. } if column == "titre"));
    }

    #[test]
    fn test_numbers_in_text_column_are_quoted() {
        let dialect = MysqlDialect::new();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("code", ColumnKind::Text);
        assert_eq!(encoder.encode(&Value::Int(12), &column).unwrap().as_str(), "'12'");
    }

    #[test]
    fn test_text_round_trip_both_dialects() {
        let samples = [
            "O'Reilly",
            "C:\\path\\to",
            "\\'",
            "''",
            "\\\\''\\",
            "'); DELETE FROM ak_mangas; --",
            "multi\nline\ttext",
        ];
        let mysql = MysqlDialect::new();
        let postgres = PostgresDialect::new();
        let dialects: [&dyn Dialect; 2] = [&mysql, &postgres];
        let column = ColumnSpec::new("t", ColumnKind::NullableText);

        for dialect in dialects {
            let encoder = Encoder::new(dialect, migration_time());
            for sample in samples {
                let literal = encoder.encode(&Value::Text(sample.into()), &column).unwrap();
                assert_eq!(
                    decode_text_literal(&literal, dialect).as_deref(),
                    Some(sample),
                    "{} via {}",
                    literal,
                    dialect.name()
                );
            }
        }
    }

    #[test]
    fn test_default_replaces_null() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("type", ColumnKind::Integer).with_default("1");
        assert_eq!(encoder.encode(&Value::Null, &column).unwrap().as_str(), "1");
        assert_eq!(encoder.encode(&Value::Int(3), &column).unwrap().as_str(), "3");
    }

    #[test]
    fn test_prefix_applied_once() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column =
            ColumnSpec::new("url_screen", ColumnKind::NullableText).with_prefix("screenshots/");
        assert_eq!(
            encoder.encode(&Value::Text("a.jpg".into()), &column).unwrap().as_str(),
            "'screenshots/a.jpg'"
        );
        assert_eq!(
            encoder
                .encode(&Value::Text("screenshots/b.jpg".into()), &column)
                .unwrap()
                .as_str(),
            "'screenshots/b.jpg'"
        );
        assert!(encoder.encode(&Value::Null, &column).unwrap().is_null());
    }

    #[test]
    fn test_synthesized_timestamp_uses_migration_time() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("upload_date", ColumnKind::Timestamp).synthesized();
        assert_eq!(
            encoder.encode(&Value::Null, &column).unwrap().as_str(),
            "'2025-08-14 12:30:00'"
        );
    }

    #[test]
    fn test_timestamp_passthrough_and_zero_date() {
        let dialect = pg();
        let encoder = Encoder::new(&dialect, migration_time());
        let column = ColumnSpec::new("date_ajout", ColumnKind::Timestamp);
        assert_eq!(
            encoder
                .encode(&Value::Text("2011-02-03 04:05:06".into()), &column)
                .unwrap()
                .as_str(),
            "'2011-02-03 04:05:06'"
        );
        assert_eq!(
            encoder
                .encode(&Value::Text("0000-00-00 00:00:00".into()), &column)
                .unwrap()
                .as_str(),
            "'2025-08-14 12:30:00'"
        );
    }

    #[test]
    fn test_encode_key() {
        let dialect = MysqlDialect::new();
        let encoder = Encoder::new(&dialect, migration_time());
        let int_key = ColumnSpec::new("id", ColumnKind::Integer);
        let text_key = ColumnSpec::new("slug", ColumnKind::Text);
        assert_eq!(
            encoder.encode_key(&KeyValue::Int(5), &int_key).unwrap().as_str(),
            "5"
        );
        assert_eq!(
            encoder
                .encode_key(&KeyValue::Text("it's".into()), &text_key)
                .unwrap()
                .as_str(),
            "'it''s'"
        );
    }
}
