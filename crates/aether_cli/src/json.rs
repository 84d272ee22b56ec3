//! JSON rendering of tree values for the command line.
//!
//! A JSON scalar is a leaf. An object maps child names to values; the key
//! `@` holds the node's own datum. `null` is the empty value.

use aether_tree::{Datum, Value};
use serde_json::{Map, Value as Json};
use thiserror::Error;

/// Key holding a node's own datum inside a JSON object.
const DATUM_KEY: &str = "@";

/// Errors converting JSON into a tree value.
#[derive(Error, Debug)]
pub enum JsonError {
    /// The text is not JSON.
    #[error("invalid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    /// Only integers fit in a datum.
    #[error("not an integer: {0}")]
    NotInteger(serde_json::Number),

    /// Arrays have no tree form.
    #[error("arrays are not supported")]
    Array,

    /// The `@` key must hold a scalar.
    #[error("`@` must hold a scalar")]
    NestedDatum,
}

/// Parses `text` as JSON and converts it.
pub fn value_from_str(text: &str) -> Result<Value, JsonError> {
    let json: Json = serde_json::from_str(text)?;
    value_from_json(&json)
}

fn datum_from_json(json: &Json) -> Result<Option<Datum>, JsonError> {
    Ok(match json {
        Json::Null => None,
        Json::Bool(b) => Some(Datum::Bool(*b)),
        Json::Number(n) => Some(Datum::Integer(
            n.as_i64().ok_or_else(|| JsonError::NotInteger(n.clone()))?,
        )),
        Json::String(s) => Some(Datum::Text(s.clone())),
        Json::Array(_) => return Err(JsonError::Array),
        Json::Object(_) => return Err(JsonError::NestedDatum),
    })
}

/// Converts a JSON document into a tree value.
pub fn value_from_json(json: &Json) -> Result<Value, JsonError> {
    let Json::Object(map) = json else {
        let mut value = Value::empty();
        value.set_data(datum_from_json(json)?);
        return Ok(value);
    };
    let mut value = Value::empty();
    for (key, child) in map {
        if key == DATUM_KEY {
            value.set_data(datum_from_json(child)?);
        } else {
            value = value.with_child(key.clone(), value_from_json(child)?);
        }
    }
    Ok(value)
}

fn datum_to_json(datum: &Datum) -> Json {
    match datum {
        Datum::Bool(b) => Json::Bool(*b),
        Datum::Integer(n) => Json::from(*n),
        Datum::Text(s) => Json::String(s.clone()),
        Datum::Bytes(bytes) => Json::from(bytes.clone()),
    }
}

/// Converts a tree value into JSON.
pub fn value_to_json(value: &Value) -> Json {
    if value.children().is_empty() {
        return value.data().map_or(Json::Null, datum_to_json);
    }
    let mut map = Map::new();
    if let Some(datum) = value.data() {
        map.insert(DATUM_KEY.to_string(), datum_to_json(datum));
    }
    for (name, child) in value.children() {
        map.insert(name.clone(), value_to_json(child));
    }
    Json::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_become_leaves() {
        assert_eq!(value_from_str("5").unwrap(), Value::leaf(5));
        assert_eq!(value_from_str("\"on\"").unwrap(), Value::leaf("on"));
        assert_eq!(value_from_str("null").unwrap(), Value::empty());
    }

    #[test]
    fn objects_become_subtrees() {
        let value = value_from_str(r#"{"@": true, "temp": 21, "door": {"open": false}}"#).unwrap();
        let expected = Value::leaf(true)
            .with_child("temp", Value::leaf(21))
            .with_child("door", Value::empty().with_child("open", Value::leaf(false)));
        assert_eq!(value, expected);
        assert_eq!(value_from_json(&value_to_json(&value)).unwrap(), expected);
    }

    #[test]
    fn unsupported_shapes_are_rejected() {
        assert!(matches!(value_from_str("[1]"), Err(JsonError::Array)));
        assert!(matches!(value_from_str("1.5"), Err(JsonError::NotInteger(_))));
        assert!(matches!(
            value_from_str(r#"{"@": {"x": 1}}"#),
            Err(JsonError::NestedDatum)
        ));
        assert!(matches!(value_from_str("{"), Err(JsonError::Syntax(_))));
    }
}
