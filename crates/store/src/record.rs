//! Records, primary keys and index values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ResultStore, StoreError};

/// A stored record: a JSON object.
pub type Record = Map<String, Value>;

/// Primary key of a record. Numbers sort before strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Key {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().filter(|f| f.is_finite()).map(Self::Float),
            },
            _ => None,
        }
    }

    pub(crate) fn to_db(&self) -> sea_orm::Value {
        match self {
            Self::Int(i) => (*i).into(),
            Self::Float(f) => (*f).into(),
            Self::Text(s) => s.clone().into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Key {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

/// Serialize `value` and require a JSON object.
pub(crate) fn to_record<T: Serialize + ?Sized>(value: &T) -> ResultStore<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::WriteRejected(format!(
            "records must be objects, got {}",
            kind_name(&other)
        ))),
    }
}

/// Follow a dotted key path (`meta.id`) into a record.
pub(crate) fn lookup<'a>(record: &'a Record, key_path: &str) -> Option<&'a Value> {
    let mut parts = key_path.split('.');
    let first = parts.next()?;
    let mut current = record.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Extract the primary key of `record`, rejecting records without a usable one.
pub(crate) fn primary_key(record: &Record, key_path: &str) -> ResultStore<Key> {
    let value = lookup(record, key_path).ok_or_else(|| {
        StoreError::WriteRejected(format!("record is missing key path '{key_path}'"))
    })?;
    Key::from_json(value).ok_or_else(|| {
        StoreError::WriteRejected(format!(
            "key path '{key_path}' must hold a string or number, got {}",
            kind_name(value)
        ))
    })
}

/// Column value for a secondary index. Missing fields and nulls are stored as
/// SQL NULL, so they never collide on unique indexes.
pub(crate) fn index_value(record: &Record, key_path: &str) -> sea_orm::Value {
    match lookup(record, key_path) {
        Some(value) => json_to_db(value),
        None => sea_orm::Value::String(None),
    }
}

pub(crate) fn json_to_db(value: &Value) -> sea_orm::Value {
    match value {
        Value::Null => sea_orm::Value::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        compound => compound.to_string().into(),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn primary_key_follows_dotted_paths() {
        let rec = record(json!({"meta": {"id": 7}, "name": "rent"}));
        assert_eq!(primary_key(&rec, "meta.id").unwrap(), Key::Int(7));
    }

    #[test]
    fn missing_primary_key_is_rejected() {
        let rec = record(json!({"name": "rent"}));
        assert_eq!(
            primary_key(&rec, "id").unwrap_err(),
            StoreError::WriteRejected("record is missing key path 'id'".to_string())
        );
    }

    #[test]
    fn boolean_primary_key_is_rejected() {
        let rec = record(json!({"id": true}));
        assert!(matches!(
            primary_key(&rec, "id"),
            Err(StoreError::WriteRejected(_))
        ));
    }

    #[test]
    fn non_object_values_are_not_records() {
        assert!(matches!(
            to_record(&json!([1, 2, 3])),
            Err(StoreError::WriteRejected(_))
        ));
    }

    #[test]
    fn missing_index_field_maps_to_null() {
        let rec = record(json!({"id": "t1"}));
        assert_eq!(
            index_value(&rec, "envelopeId"),
            sea_orm::Value::String(None)
        );
    }
}
