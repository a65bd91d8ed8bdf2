//! Column-type driven coercion of raw records.
//!
//! The change stream delivers cell values as Postgres text output (`"t"`,
//! `"42"`, `"{1,2}"`) or loosely typed JSON. [`Transformer`] converts each
//! cell to a [`Value`] using the column type name from the payload.

use tracing::warn;

use crate::event::{ColumnDescriptor, RawRecord};
use crate::value::{Record, Value};

/// Converts raw records into typed records.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    skip_types: Vec<String>,
}

impl Transformer {
    /// Create a transformer that converts every known type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave columns of these types unconverted.
    pub fn with_skip_types(mut self, skip_types: Vec<String>) -> Self {
        self.skip_types = skip_types;
        self
    }

    /// Types that are passed through unconverted.
    pub fn skip_types(&self) -> &[String] {
        &self.skip_types
    }

    /// Convert every cell of `record` using the matching column type.
    ///
    /// Cells without a matching column are passed through. A missing record
    /// yields an empty mapping.
    pub fn convert_change_data(
        &self,
        columns: &[ColumnDescriptor],
        record: Option<&RawRecord>,
    ) -> Record {
        let Some(record) = record else {
            return Record::new();
        };

        record
            .iter()
            .map(|(name, raw)| (name.clone(), self.convert_column(name, columns, raw)))
            .collect()
    }

    fn convert_column(
        &self,
        name: &str,
        columns: &[ColumnDescriptor],
        raw: &serde_json::Value,
    ) -> Value {
        match columns.iter().find(|c| c.name == name) {
            Some(column) if !self.skip_types.iter().any(|t| *t == column.type_name) => {
                convert_cell(&column.type_name, raw)
            }
            _ => Value::from(raw.clone()),
        }
    }
}

/// Convert a record with the default transformer.
pub fn convert_change_data(columns: &[ColumnDescriptor], record: Option<&RawRecord>) -> Record {
    Transformer::new().convert_change_data(columns, record)
}

/// Convert a single cell given its Postgres type name.
pub fn convert_cell(type_name: &str, raw: &serde_json::Value) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    if let Some(element_type) = type_name.strip_prefix('_') {
        return to_array(element_type, raw);
    }

    match type_name {
        "bool" => to_bool(raw),
        "int2" | "int4" | "int8" | "oid" => to_integer(raw),
        "float4" | "float8" | "numeric" => to_float(raw),
        "json" | "jsonb" => to_json(raw),
        "timestamp" => to_timestamp_string(raw),
        // abstime, date, daterange, int4range, int8range, money, reltime,
        // text, time, timestamptz, timetz, tsrange, tstzrange and unknowns
        _ => Value::from(raw.clone()),
    }
}

fn to_bool(raw: &serde_json::Value) -> Value {
    match raw.as_str() {
        Some("t") => Value::Bool(true),
        Some("f") => Value::Bool(false),
        _ => Value::from(raw.clone()),
    }
}

fn to_integer(raw: &serde_json::Value) -> Value {
    match raw.as_str() {
        Some(s) => match s.trim().parse::<i64>() {
            Ok(i) => Value::Int64(i),
            Err(_) => to_float(raw),
        },
        None => Value::from(raw.clone()),
    }
}

fn to_float(raw: &serde_json::Value) -> Value {
    match raw.as_str().map(|s| s.trim().parse::<f64>()) {
        Some(Ok(f)) if !f.is_nan() => Value::Float64(f),
        _ => Value::from(raw.clone()),
    }
}

fn to_json(raw: &serde_json::Value) -> Value {
    match raw {
        serde_json::Value::String(s) => match serde_json::from_str(s) {
            Ok(parsed) => Value::Json(parsed),
            Err(e) => {
                warn!(error = %e, "failed to parse json cell, keeping raw string");
                Value::String(s.clone())
            }
        },
        other => Value::Json(other.clone()),
    }
}

fn to_timestamp_string(raw: &serde_json::Value) -> Value {
    match raw.as_str() {
        Some(s) => Value::String(s.replacen(' ', "T", 1)),
        None => Value::from(raw.clone()),
    }
}

fn to_array(element_type: &str, raw: &serde_json::Value) -> Value {
    let Some(s) = raw.as_str() else {
        return Value::from(raw.clone());
    };

    let Some(body) = s.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) else {
        return Value::String(s.to_string());
    };

    let elements: Vec<serde_json::Value> =
        match serde_json::from_str::<Vec<serde_json::Value>>(&format!("[{}]", body)) {
            Ok(parsed) => parsed,
            Err(_) if body.is_empty() => Vec::new(),
            Err(_) => body
                .split(',')
                .map(|item| serde_json::Value::String(item.to_string()))
                .collect(),
        };

    Value::Array(
        elements
            .iter()
            .map(|element| convert_cell(element_type, element))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(convert_cell("bool", &json!("t")), Value::Bool(true));
        assert_eq!(convert_cell("bool", &json!("f")), Value::Bool(false));
        assert_eq!(convert_cell("bool", &json!(true)), Value::Bool(true));
        assert_eq!(convert_cell("bool", &json!("maybe")), Value::String("maybe".into()));
    }

    #[test]
    fn test_numeric_conversion() {
        assert_eq!(convert_cell("int4", &json!("42")), Value::Int64(42));
        assert_eq!(convert_cell("int8", &json!(7)), Value::Int64(7));
        assert_eq!(convert_cell("int2", &json!("1.5")), Value::Float64(1.5));
        assert_eq!(convert_cell("float8", &json!("2.25")), Value::Float64(2.25));
        assert_eq!(convert_cell("numeric", &json!("10")), Value::Float64(10.0));
        assert_eq!(convert_cell("int4", &json!("abc")), Value::String("abc".into()));
        assert_eq!(convert_cell("int4", &json!(null)), Value::Null);
    }

    #[test]
    fn test_json_conversion() {
        assert_eq!(
            convert_cell("jsonb", &json!(r#"{"a":1}"#)),
            Value::Json(json!({"a": 1}))
        );
        assert_eq!(convert_cell("json", &json!([1])), Value::Json(json!([1])));
        assert_eq!(
            convert_cell("json", &json!("{not json")),
            Value::String("{not json".into())
        );
        assert_eq!(convert_cell("jsonb", &json!(null)), Value::Null);
        assert_eq!(convert_cell("json", &json!(null)), Value::Null);
        assert_eq!(convert_cell("_int4", &json!(null)), Value::Null);
    }

    #[test]
    fn test_timestamp_conversion() {
        assert_eq!(
            convert_cell("timestamp", &json!("2021-01-01 10:00:00 +00")),
            Value::String("2021-01-01T10:00:00 +00".into())
        );
        assert_eq!(
            convert_cell("timestamptz", &json!("2021-01-01 10:00:00+00")),
            Value::String("2021-01-01 10:00:00+00".into())
        );
    }

    #[test]
    fn test_array_conversion() {
        assert_eq!(
            convert_cell("_int4", &json!("{1,2,3}")),
            Value::Array(vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)])
        );
        assert_eq!(
            convert_cell("_text", &json!("{a,b}")),
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())])
        );
        assert_eq!(
            convert_cell("_bool", &json!("{t,f}")),
            Value::Array(vec![Value::Bool(true), Value::Bool(false)])
        );
        assert_eq!(convert_cell("_int4", &json!("{}")), Value::Array(vec![]));
        assert_eq!(convert_cell("_int4", &json!("1,2")), Value::String("1,2".into()));
        assert_eq!(
            convert_cell("_int4", &json!([1, 2])),
            Value::Array(vec![Value::Int64(1), Value::Int64(2)])
        );
    }

    #[test]
    fn test_convert_change_data() {
        let columns = vec![
            ColumnDescriptor::new("id", "int4"),
            ColumnDescriptor::new("done", "bool"),
            ColumnDescriptor::new("title", "text"),
        ];
        let raw = record(json!({"id": "1", "done": "t", "title": "x", "extra": "5"}));

        let converted = convert_change_data(&columns, Some(&raw));
        assert_eq!(converted["id"], Value::Int64(1));
        assert_eq!(converted["done"], Value::Bool(true));
        assert_eq!(converted["title"], Value::String("x".into()));
        // No column descriptor: passed through.
        assert_eq!(converted["extra"], Value::String("5".into()));
    }

    #[test]
    fn test_missing_record_is_empty() {
        let columns = vec![ColumnDescriptor::new("id", "int4")];
        assert!(convert_change_data(&columns, None).is_empty());
    }

    #[test]
    fn test_skip_types() {
        let transformer = Transformer::new().with_skip_types(vec!["int8".to_string()]);
        let columns = vec![
            ColumnDescriptor::new("id", "int8"),
            ColumnDescriptor::new("n", "int4"),
        ];
        let raw = record(json!({"id": "9007199254740993", "n": "3"}));

        let converted = transformer.convert_change_data(&columns, Some(&raw));
        assert_eq!(converted["id"], Value::String("9007199254740993".into()));
        assert_eq!(converted["n"], Value::Int64(3));
        assert_eq!(transformer.skip_types(), ["int8".to_string()]);
    }
}
