//! Row coercion against a declared field schema
//!
//! Raw records arrive as `name -> text` maps. Each field named in the
//! schema is parsed into its declared kind; every other field passes
//! through as text. An empty `real` field becomes NaN so that the
//! aggregate's invalid-value policy handles it instead of dropping the row;
//! non-finite literals (`inf`, `NaN`) are schema violations.

use crate::error::{ConfigError, SchemaViolation};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw record as extracted from a delimited file.
pub type RawRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Real,
    Timestamp,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Real => "real",
            FieldKind::Timestamp => "timestamp",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Real)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "integer" | "int" => Ok(FieldKind::Integer),
            "real" | "float" => Ok(FieldKind::Real),
            "timestamp" | "datetime" => Ok(FieldKind::Timestamp),
            other => Err(ConfigError::UnknownKind(other.to_string())),
        }
    }
}

/// Ordered list of declared fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSchema {
    fields: Vec<(String, FieldKind)>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or redeclare) a field.
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = kind,
            None => self.fields.push((name, kind)),
        }
        self
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, kind)| *kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromStr for FieldSchema {
    type Err = ConfigError;

    /// Parse `name=kind` pairs separated by commas, e.g. `user_id=integer,price=real`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut schema = FieldSchema::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, kind) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidSchemaEntry(entry.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidSchemaEntry(entry.to_string()));
            }
            schema = schema.with_field(name, kind.parse()?);
        }
        Ok(schema)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

/// A record whose declared fields carry typed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CoercedRow {
    fields: BTreeMap<String, FieldValue>,
}

impl CoercedRow {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_f64)
    }

    pub fn timestamp(&self, name: &str) -> Option<NaiveDateTime> {
        match self.get(name) {
            Some(FieldValue::Timestamp(ts)) => Some(*ts),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Apply `schema` to one raw record.
pub fn coerce(raw: &RawRow, schema: &FieldSchema) -> Result<CoercedRow, SchemaViolation> {
    let mut fields = BTreeMap::new();

    for (name, kind) in schema.iter() {
        let text = raw.get(name).ok_or_else(|| SchemaViolation::MissingField {
            field: name.to_string(),
        })?;
        fields.insert(name.to_string(), parse_value(name, text, kind)?);
    }

    for (name, text) in raw {
        if schema.kind_of(name).is_none() {
            fields.insert(name.clone(), FieldValue::Text(text.clone()));
        }
    }

    Ok(CoercedRow { fields })
}

fn parse_value(field: &str, text: &str, kind: FieldKind) -> Result<FieldValue, SchemaViolation> {
    let trimmed = text.trim();
    let invalid = || SchemaViolation::InvalidValue {
        field: field.to_string(),
        value: text.to_string(),
        kind,
    };

    match kind {
        FieldKind::Integer => trimmed.parse::<i64>().map(FieldValue::Integer).map_err(|_| invalid()),
        FieldKind::Real if trimmed.is_empty() => Ok(FieldValue::Real(f64::NAN)),
        FieldKind::Real => match trimmed.parse::<f64>() {
            // `inf` / `NaN` literals parse but are not measurements
            Ok(v) if v.is_finite() => Ok(FieldValue::Real(v)),
            _ => Err(invalid()),
        },
        FieldKind::Timestamp => parse_timestamp(trimmed).map(FieldValue::Timestamp).ok_or_else(invalid),
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%m/%d/%Y %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn transaction_schema() -> FieldSchema {
        FieldSchema::new()
            .with_field("timestamp", FieldKind::Timestamp)
            .with_field("user_id", FieldKind::Integer)
            .with_field("price", FieldKind::Real)
    }

    #[test]
    fn test_coerce_declared_fields() {
        let row = coerce(
            &raw(&[("timestamp", "2012-06-01"), ("user_id", "42"), ("price", "13.5")]),
            &transaction_schema(),
        )
        .unwrap();

        assert_eq!(row.get("user_id"), Some(&FieldValue::Integer(42)));
        assert_eq!(row.number("price"), Some(13.5));
        assert_eq!(row.number("user_id"), Some(42.0));
        assert_eq!(
            row.timestamp("timestamp"),
            NaiveDate::from_ymd_opt(2012, 6, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
    }

    #[test]
    fn test_undeclared_fields_pass_through() {
        let row = coerce(
            &raw(&[("timestamp", "2012-06-01"), ("user_id", "1"), ("price", "2"), ("note", " keep me ")]),
            &transaction_schema(),
        )
        .unwrap();

        assert_eq!(row.get("note"), Some(&FieldValue::Text(" keep me ".to_string())));
        assert_eq!(row.len(), 4);
    }

    #[test]
    fn test_invalid_real_is_violation() {
        let err = coerce(
            &raw(&[("timestamp", "2012-06-01"), ("user_id", "1"), ("price", "abc")]),
            &transaction_schema(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            SchemaViolation::InvalidValue {
                field: "price".to_string(),
                value: "abc".to_string(),
                kind: FieldKind::Real,
            }
        );
    }

    #[test]
    fn test_non_finite_real_is_violation() {
        for literal in ["inf", "-inf", "infinity", "NaN"] {
            let err = coerce(
                &raw(&[("timestamp", "2012-06-01"), ("user_id", "1"), ("price", literal)]),
                &transaction_schema(),
            )
            .unwrap_err();

            assert!(
                matches!(err, SchemaViolation::InvalidValue { ref field, kind: FieldKind::Real, .. } if field == "price"),
                "{} accepted",
                literal
            );
        }
    }

    #[test]
    fn test_empty_real_becomes_nan() {
        let row = coerce(
            &raw(&[("timestamp", "2012-06-01"), ("user_id", "1"), ("price", "")]),
            &transaction_schema(),
        )
        .unwrap();

        assert!(row.number("price").unwrap().is_nan());
    }

    #[test]
    fn test_empty_integer_is_violation() {
        let result = coerce(
            &raw(&[("timestamp", "2012-06-01"), ("user_id", ""), ("price", "1")]),
            &transaction_schema(),
        );
        assert!(matches!(result, Err(SchemaViolation::InvalidValue { kind: FieldKind::Integer, .. })));
    }

    #[test]
    fn test_missing_declared_field() {
        let result = coerce(&raw(&[("timestamp", "2012-06-01"), ("price", "1")]), &transaction_schema());
        assert_eq!(
            result.unwrap_err(),
            SchemaViolation::MissingField { field: "user_id".to_string() }
        );
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2012-06-01 10:30:00").is_some());
        assert!(parse_timestamp("2012-06-01T10:30:00.250").is_some());
        assert!(parse_timestamp("2012-06-01T10:30:00Z").is_some());
        assert!(parse_timestamp("6/1/2012").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_schema_from_str() {
        let schema: FieldSchema = "user_id=integer, price=real,timestamp=timestamp".parse().unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.kind_of("price"), Some(FieldKind::Real));
        assert_eq!(schema.kind_of("missing"), None);

        assert_eq!(
            "price".parse::<FieldSchema>().unwrap_err(),
            ConfigError::InvalidSchemaEntry("price".to_string())
        );
        assert_eq!(
            "price=decimal".parse::<FieldSchema>().unwrap_err(),
            ConfigError::UnknownKind("decimal".to_string())
        );
    }

    #[test]
    fn test_serialized_payload() {
        let row = coerce(
            &raw(&[("timestamp", "2012-06-01"), ("user_id", "7"), ("price", "")]),
            &transaction_schema(),
        )
        .unwrap();

        let json: serde_json::Value = serde_json::to_value(&row).unwrap();
        assert_eq!(json["user_id"], 7);
        assert!(json["price"].is_null());
        assert_eq!(json["timestamp"], "2012-06-01T00:00:00");
    }
}
