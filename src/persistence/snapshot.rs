// =============================================================================
// Snapshot value model — a tagged union over every shape the persisted state
// can carry, with a canonical JSON codec
// =============================================================================
//
// The wire format tags special types inside ordinary JSON objects:
//
//   | value          | JSON representation                                |
//   |----------------|----------------------------------------------------|
//   | table          | {"__dataframe__": true, "records": [...]}          |
//   | datetime       | {"__datetime__": "ISO-8601"}                       |
//   | date           | {"__date__": "ISO-8601"}                           |
//   | set            | {"__set__": true, "values": [...sorted...]}        |
//   | enum           | {"__enum__": "ClassName.NAME"}                     |
//   | tagged struct  | {"__dataclass__": "mod.ClassName", ...fields}      |
//
// Encoding goes through serde_json's BTreeMap-backed object, so keys come
// out sorted: identical logical state always produces byte-identical JSON,
// which the auto-save digest deduplication depends on. Non-finite floats are
// rejected at encode time; they must never reach the store.
//
// Unknown enum / struct names survive decoding as their raw tagged variants;
// resolution to domain types happens at aggregate rehydration.
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::warn;

/// A whole snapshot document: aggregate name → value.
pub type SnapshotDoc = BTreeMap<String, SnapshotValue>;

/// Everything a snapshot can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<SnapshotValue>),
    Map(BTreeMap<String, SnapshotValue>),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    /// A set of symbols; persisted sorted for output stability.
    Set(BTreeSet<String>),
    /// An enum reference, tagged "ClassName.NAME".
    Enum(String),
    /// A tagged struct: type name plus its fields.
    Record {
        name: String,
        fields: BTreeMap<String, SnapshotValue>,
    },
    /// Tabular data as a list of homogeneous rows.
    Table(Vec<BTreeMap<String, SnapshotValue>>),
}

/// Codec failures. Encoding only fails on non-finite floats; decoding fails
/// on malformed tag payloads.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("non-finite float in snapshot at {path}")]
    NonFiniteFloat { path: String },
    #[error("malformed {tag} payload: {detail}")]
    MalformedTag { tag: &'static str, detail: String },
}

const TAG_DATAFRAME: &str = "__dataframe__";
const TAG_DATETIME: &str = "__datetime__";
const TAG_DATE: &str = "__date__";
const TAG_SET: &str = "__set__";
const TAG_ENUM: &str = "__enum__";
const TAG_DATACLASS: &str = "__dataclass__";

/// ISO-8601 without zone, microsecond precision, stable width.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, SnapshotError> {
    s.parse::<NaiveDateTime>().map_err(|e| SnapshotError::MalformedTag {
        tag: "__datetime__",
        detail: format!("{s:?}: {e}"),
    })
}

fn parse_date(s: &str) -> Result<NaiveDate, SnapshotError> {
    s.parse::<NaiveDate>().map_err(|e| SnapshotError::MalformedTag {
        tag: "__date__",
        detail: format!("{s:?}: {e}"),
    })
}

impl SnapshotValue {
    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    /// Encode into tagged JSON. Fails on NaN / infinity anywhere in the tree.
    pub fn to_json(&self, path: &str) -> Result<Value, SnapshotError> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::Float(f) => {
                let number = Number::from_f64(*f).ok_or_else(|| SnapshotError::NonFiniteFloat {
                    path: path.to_string(),
                })?;
                Value::Number(number)
            }
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(item.to_json(&format!("{path}[{i}]"))?);
                }
                Value::Array(out)
            }
            Self::Map(fields) => Value::Object(Self::encode_fields(fields, path)?),
            Self::DateTime(dt) => {
                let mut obj = Map::new();
                obj.insert(TAG_DATETIME.to_string(), Value::String(format_datetime(dt)));
                Value::Object(obj)
            }
            Self::Date(d) => {
                let mut obj = Map::new();
                obj.insert(TAG_DATE.to_string(), Value::String(d.to_string()));
                Value::Object(obj)
            }
            Self::Set(values) => {
                let mut obj = Map::new();
                obj.insert(TAG_SET.to_string(), Value::Bool(true));
                obj.insert(
                    "values".to_string(),
                    Value::Array(values.iter().map(|v| Value::String(v.clone())).collect()),
                );
                Value::Object(obj)
            }
            Self::Enum(tag) => {
                let mut obj = Map::new();
                obj.insert(TAG_ENUM.to_string(), Value::String(tag.clone()));
                Value::Object(obj)
            }
            Self::Record { name, fields } => {
                let mut obj = Self::encode_fields(fields, path)?;
                obj.insert(TAG_DATACLASS.to_string(), Value::String(name.clone()));
                Value::Object(obj)
            }
            Self::Table(rows) => {
                let mut records = Vec::with_capacity(rows.len());
                for (i, row) in rows.iter().enumerate() {
                    records.push(Value::Object(Self::encode_fields(
                        row,
                        &format!("{path}.records[{i}]"),
                    )?));
                }
                let mut obj = Map::new();
                obj.insert(TAG_DATAFRAME.to_string(), Value::Bool(true));
                obj.insert("records".to_string(), Value::Array(records));
                Value::Object(obj)
            }
        })
    }

    fn encode_fields(
        fields: &BTreeMap<String, SnapshotValue>,
        path: &str,
    ) -> Result<Map<String, Value>, SnapshotError> {
        let mut obj = Map::new();
        for (key, value) in fields {
            obj.insert(key.clone(), value.to_json(&format!("{path}.{key}"))?);
        }
        Ok(obj)
    }

    // -------------------------------------------------------------------------
    // Decoding
    // -------------------------------------------------------------------------

    /// Decode tagged JSON back into the value model.
    pub fn from_json(value: &Value) -> Result<Self, SnapshotError> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Self::from_json(item)?);
                }
                Self::List(out)
            }
            Value::Object(obj) => Self::from_object(obj)?,
        })
    }

    fn from_object(obj: &Map<String, Value>) -> Result<Self, SnapshotError> {
        if obj.get(TAG_DATAFRAME) == Some(&Value::Bool(true)) {
            if let Some(Value::Array(records)) = obj.get("records") {
                let mut rows = Vec::with_capacity(records.len());
                for record in records {
                    let Value::Object(fields) = record else {
                        return Err(SnapshotError::MalformedTag {
                            tag: "__dataframe__",
                            detail: "record is not an object".to_string(),
                        });
                    };
                    let mut row = BTreeMap::new();
                    for (key, value) in fields {
                        row.insert(key.clone(), Self::from_json(value)?);
                    }
                    rows.push(row);
                }
                return Ok(Self::Table(rows));
            }
        }

        if let Some(Value::String(s)) = obj.get(TAG_DATETIME) {
            return Ok(Self::DateTime(parse_datetime(s)?));
        }

        if let Some(Value::String(s)) = obj.get(TAG_DATE) {
            return Ok(Self::Date(parse_date(s)?));
        }

        if obj.get(TAG_SET) == Some(&Value::Bool(true)) {
            if let Some(Value::Array(values)) = obj.get("values") {
                let mut set = BTreeSet::new();
                for value in values {
                    let Value::String(s) = value else {
                        return Err(SnapshotError::MalformedTag {
                            tag: "__set__",
                            detail: "set member is not a string".to_string(),
                        });
                    };
                    set.insert(s.clone());
                }
                return Ok(Self::Set(set));
            }
        }

        if let Some(Value::String(tag)) = obj.get(TAG_ENUM) {
            return Ok(Self::Enum(tag.clone()));
        }

        if let Some(Value::String(name)) = obj.get(TAG_DATACLASS) {
            let mut fields = BTreeMap::new();
            for (key, value) in obj {
                if key != TAG_DATACLASS {
                    fields.insert(key.clone(), Self::from_json(value)?);
                }
            }
            return Ok(Self::Record {
                name: name.clone(),
                fields,
            });
        }

        let mut fields = BTreeMap::new();
        for (key, value) in obj {
            fields.insert(key.clone(), Self::from_json(value)?);
        }
        Ok(Self::Map(fields))
    }

    // -------------------------------------------------------------------------
    // Plain projection
    // -------------------------------------------------------------------------

    /// Project into untagged JSON for handing subtrees to serde-based domain
    /// decoders: datetimes/dates become ISO strings, sets become sorted
    /// arrays, enums their tag, records and tables lose their markers.
    ///
    /// Enum and record tags reaching this point were never resolved to a
    /// domain type; the fallback to raw string / raw map is logged at WARN.
    pub fn to_plain_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_plain_json).collect()),
            Self::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_plain_json()))
                    .collect(),
            ),
            Self::Record { name, fields } => {
                warn!(name = %name, "unresolved tagged struct, falling back to raw map");
                Value::Object(
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_plain_json()))
                        .collect(),
                )
            }
            Self::DateTime(dt) => Value::String(format_datetime(dt)),
            Self::Date(d) => Value::String(d.to_string()),
            Self::Set(values) => {
                Value::Array(values.iter().map(|v| Value::String(v.clone())).collect())
            }
            Self::Enum(tag) => {
                warn!(tag = %tag, "unresolved enum tag, falling back to raw string");
                Value::String(tag.clone())
            }
            Self::Table(rows) => Value::Array(
                rows.iter()
                    .map(|row| {
                        Value::Object(
                            row.iter()
                                .map(|(k, v)| (k.clone(), v.to_plain_json()))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Lift untagged JSON (e.g. a serde-serialised domain object) into the
    /// value model without tag detection.
    pub fn from_plain_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_plain_json).collect()),
            Value::Object(obj) => Self::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Self::from_plain_json(v)))
                    .collect(),
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn roundtrip(value: &SnapshotValue) -> SnapshotValue {
        let json = value.to_json("$").unwrap();
        SnapshotValue::from_json(&json).unwrap()
    }

    #[test]
    fn scalars_roundtrip() {
        for value in [
            SnapshotValue::Null,
            SnapshotValue::Bool(true),
            SnapshotValue::Int(-42),
            SnapshotValue::Float(3.5),
            SnapshotValue::Text("hello".to_string()),
        ] {
            assert_eq!(roundtrip(&value), value);
        }
    }

    #[test]
    fn datetime_and_date_roundtrip_tagged() {
        let value = SnapshotValue::DateTime(dt(2025, 1, 15, 10, 30, 0));
        let json = value.to_json("$").unwrap();
        assert_eq!(
            json.get("__datetime__").and_then(Value::as_str),
            Some("2025-01-15T10:30:00.000000")
        );
        assert_eq!(SnapshotValue::from_json(&json).unwrap(), value);

        let date = SnapshotValue::Date(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        let json = date.to_json("$").unwrap();
        assert_eq!(json.get("__date__").and_then(Value::as_str), Some("2025-06-15"));
        assert_eq!(SnapshotValue::from_json(&json).unwrap(), date);
    }

    #[test]
    fn sets_serialise_sorted() {
        let set: BTreeSet<String> = ["zeta", "alpha", "mid"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let value = SnapshotValue::Set(set);
        let json = value.to_json("$").unwrap();
        let values: Vec<&str> = json["values"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(values, vec!["alpha", "mid", "zeta"]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn enums_and_records_roundtrip() {
        let value = SnapshotValue::Enum("CombinationStatus.ACTIVE".to_string());
        assert_eq!(roundtrip(&value), value);

        let record = SnapshotValue::Record {
            name: "risk.PortfolioGreeks".to_string(),
            fields: [
                ("total_delta".to_string(), SnapshotValue::Float(1.5)),
                ("position_count".to_string(), SnapshotValue::Int(3)),
            ]
            .into_iter()
            .collect(),
        };
        let json = record.to_json("$").unwrap();
        assert_eq!(
            json.get("__dataclass__").and_then(Value::as_str),
            Some("risk.PortfolioGreeks")
        );
        assert_eq!(SnapshotValue::from_json(&json).unwrap(), record);
    }

    #[test]
    fn tables_roundtrip() {
        let row = |sym: &str, px: f64| -> BTreeMap<String, SnapshotValue> {
            [
                ("vt_symbol".to_string(), SnapshotValue::Text(sym.to_string())),
                ("price".to_string(), SnapshotValue::Float(px)),
            ]
            .into_iter()
            .collect()
        };
        let value = SnapshotValue::Table(vec![row("a", 1.0), row("b", 2.0)]);
        let json = value.to_json("$").unwrap();
        assert_eq!(json.get("__dataframe__"), Some(&Value::Bool(true)));
        assert_eq!(json["records"].as_array().unwrap().len(), 2);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn nested_structures_roundtrip() {
        let value = SnapshotValue::Map(
            [
                (
                    "current_dt".to_string(),
                    SnapshotValue::DateTime(dt(2025, 1, 15, 10, 30, 0)),
                ),
                (
                    "symbols".to_string(),
                    SnapshotValue::Set(["x".to_string()].into_iter().collect()),
                ),
                (
                    "nested".to_string(),
                    SnapshotValue::List(vec![SnapshotValue::Int(1), SnapshotValue::Null]),
                ),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let value = SnapshotValue::Map(
            [("bad".to_string(), SnapshotValue::Float(f64::NAN))]
                .into_iter()
                .collect(),
        );
        let err = value.to_json("$").unwrap_err();
        match err {
            SnapshotError::NonFiniteFloat { path } => assert_eq!(path, "$.bad"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(SnapshotValue::Float(f64::INFINITY).to_json("$").is_err());
    }

    #[test]
    fn malformed_datetime_fails_decode() {
        let json = serde_json::json!({"__datetime__": "not-a-date"});
        assert!(SnapshotValue::from_json(&json).is_err());
    }

    #[test]
    fn unknown_enum_tag_survives_as_raw_variant() {
        let json = serde_json::json!({"__enum__": "Vanished.Member"});
        let value = SnapshotValue::from_json(&json).unwrap();
        assert_eq!(value, SnapshotValue::Enum("Vanished.Member".to_string()));
        // And projects to its raw string form.
        assert_eq!(value.to_plain_json(), Value::String("Vanished.Member".to_string()));
    }

    #[test]
    fn canonical_output_is_byte_stable() {
        let value = SnapshotValue::Map(
            [
                ("zebra".to_string(), SnapshotValue::Int(1)),
                ("alpha".to_string(), SnapshotValue::Float(2.5)),
            ]
            .into_iter()
            .collect(),
        );
        let a = serde_json::to_string(&value.to_json("$").unwrap()).unwrap();
        let b = serde_json::to_string(&value.to_json("$").unwrap()).unwrap();
        assert_eq!(a, b);
        // Keys sorted in output.
        assert!(a.find("alpha").unwrap() < a.find("zebra").unwrap());
    }

    #[test]
    fn plain_projection_strips_tags() {
        let value = SnapshotValue::Record {
            name: "x.Y".to_string(),
            fields: [("a".to_string(), SnapshotValue::Int(1))].into_iter().collect(),
        };
        let plain = value.to_plain_json();
        assert!(plain.get("__dataclass__").is_none());
        assert_eq!(plain["a"], Value::Number(1.into()));
    }
}
