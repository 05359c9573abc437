//! JSON and YAML text to and from [`Document`]s.

use crate::document::{Document, Value};
use crate::error::CodecError;
use crate::typer::{FieldType, FieldTyper};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::str::FromStr;

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Decimal(d) => rust_decimal::serde::float::serialize(d, serializer),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Seq(items) => serializer.collect_seq(items),
            Value::Map(doc) => doc.serialize(serializer),
        }
    }
}

impl Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.iter())
    }
}

/// Serializes a document into a compact JSON string.
///
/// # Errors
/// Returns a `serde_json::Error` if serialization fails.
pub fn to_json(doc: &Document) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json_document(doc)?)
}

/// Serializes a document into a pretty-printed JSON string.
///
/// # Errors
/// Returns a `serde_json::Error` if serialization fails.
pub fn to_json_pretty(doc: &Document) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json_document(doc)?)
}

/// Serializes a document into a YAML string.
///
/// # Errors
/// Returns a `serde_yaml::Error` if serialization fails.
pub fn to_yaml(doc: &Document) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(doc)
}

/// Parses a JSON object into a document, keeping key order. Fractional
/// numbers become decimals with every digit of the source text.
pub fn from_json(text: &str) -> Result<Document, CodecError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    top_level(decode(&json, "", None)?)
}

/// Parses a YAML mapping into a document.
pub fn from_yaml(text: &str) -> Result<Document, CodecError> {
    let json: serde_json::Value = serde_yaml::from_str(text)?;
    top_level(decode(&json, "", None)?)
}

/// Parses a JSON object, coercing each scalar to the type `typer` declares
/// for its external path. Sequence elements share the path of the sequence.
pub fn from_json_typed(text: &str, typer: &dyn FieldTyper) -> Result<Document, CodecError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    top_level(decode(&json, "", Some(typer))?)
}

/// JSON tree for `doc`. Decimals keep their exact digits, where the generic
/// [`Serialize`] impl goes through `f64`.
fn json_document(doc: &Document) -> Result<serde_json::Value, serde_json::Error> {
    doc.iter()
        .map(|(key, value)| Ok::<_, serde_json::Error>((key.to_string(), json_value(value)?)))
        .collect::<Result<serde_json::Map<_, _>, _>>()
        .map(serde_json::Value::Object)
}

fn json_value(value: &Value) -> Result<serde_json::Value, serde_json::Error> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Decimal(d) => serde_json::Value::Number(serde_json::Number::from_str(&d.to_string())?),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Seq(items) => serde_json::Value::Array(items.iter().map(json_value).collect::<Result<_, _>>()?),
        Value::Map(doc) => json_document(doc)?,
    })
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = CodecError;

    fn try_from(json: &serde_json::Value) -> Result<Self, Self::Error> {
        decode(json, "", None)
    }
}

fn top_level(value: Value) -> Result<Document, CodecError> {
    match value {
        Value::Map(doc) => Ok(doc),
        other => Err(CodecError::NotADocument {
            found: other.kind_name().to_string(),
        }),
    }
}

fn decode(json: &serde_json::Value, path: &str, typer: Option<&dyn FieldTyper>) -> Result<Value, CodecError> {
    let declared = typer
        .filter(|t| !path.is_empty() && t.has_field_type(path))
        .and_then(|t| t.field_type(path).ok().flatten());

    match json {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| decode(item, path, typer))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Seq),
        serde_json::Value::Object(map) => {
            let mut doc = Document::new();
            for (key, item) in map {
                let nested = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                doc.put(key, decode(item, &nested, typer)?);
            }
            Ok(Value::Map(doc))
        }
        scalar => match declared {
            Some(field_type) => coerce(scalar, field_type, path),
            None => untyped(scalar),
        },
    }
}

fn untyped(json: &serde_json::Value) -> Result<Value, CodecError> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => number_to_decimal(n).map(Value::Decimal),
        },
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => decode(json, "", None),
    }
}

fn number_to_decimal(n: &serde_json::Number) -> Result<Decimal, CodecError> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| CodecError::UnsupportedNumber { number: text })
}

fn coerce(json: &serde_json::Value, field_type: FieldType, path: &str) -> Result<Value, CodecError> {
    let mismatch = || CodecError::TypeMismatch {
        path: path.to_string(),
        expected: field_type.to_string(),
        value: json.to_string(),
    };
    match (field_type, json) {
        (_, serde_json::Value::Null) => Ok(Value::Null),
        (FieldType::Integer, serde_json::Value::Number(n)) => n.as_i64().map(Value::Int).ok_or_else(mismatch),
        (FieldType::Integer, serde_json::Value::String(s)) => {
            s.trim().parse::<i64>().map(Value::Int).map_err(|_| mismatch())
        }
        (FieldType::Decimal, serde_json::Value::Number(n)) => number_to_decimal(n).map(Value::Decimal),
        (FieldType::Decimal, serde_json::Value::String(s)) => Decimal::from_str(s.trim())
            .map(Value::Decimal)
            .map_err(|_| mismatch()),
        (FieldType::Boolean, serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
        (FieldType::Boolean, serde_json::Value::String(s)) => match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        (FieldType::String | FieldType::Date, serde_json::Value::String(s)) => Ok(Value::Str(s.clone())),
        (FieldType::String | FieldType::Date, serde_json::Value::Number(n)) => Ok(Value::Str(n.to_string())),
        (FieldType::String | FieldType::Date, serde_json::Value::Bool(b)) => Ok(Value::Str(b.to_string())),
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typer::SimpleFieldTyper;

    #[test]
    fn test_json_round_trip() {
        let doc = Document::new()
            .with("name", "Ada")
            .with("id", 7)
            .with("tags", vec![Value::from("a"), Value::from("b")])
            .with("address.city", "London");
        let json = to_json(&doc).unwrap();
        assert_eq!(
            json,
            r#"{"name":"Ada","id":7,"tags":["a","b"],"address":{"city":"London"}}"#
        );
        assert_eq!(from_json(&json).unwrap(), doc);
    }

    #[test]
    fn test_decimals_serialize_as_numbers() {
        let doc = Document::new().with("score", Decimal::from_str("4.5").unwrap());
        assert_eq!(to_json(&doc).unwrap(), r#"{"score":4.5}"#);
        let back = from_json(r#"{"score":4.5}"#).unwrap();
        assert_eq!(back.get("score"), Some(&Value::Decimal(Decimal::from_str("4.5").unwrap())));
    }

    #[test]
    fn test_decimal_precision_survives_json() {
        let amount = Decimal::from_str("12345678901234567.891").unwrap();
        let doc = Document::new().with("amount", amount).with("rate", Decimal::from_str("0.10").unwrap());
        let json = to_json(&doc).unwrap();
        assert_eq!(json, r#"{"amount":12345678901234567.891,"rate":0.10}"#);
        assert_eq!(from_json(&json).unwrap().get("amount"), Some(&Value::Decimal(amount)));

        let typer = SimpleFieldTyper::new().field("amount", FieldType::Decimal);
        let typed = from_json_typed(r#"{"amount": 98765432109876543.21}"#, &typer).unwrap();
        assert_eq!(
            typed.get("amount"),
            Some(&Value::Decimal(Decimal::from_str("98765432109876543.21").unwrap()))
        );
    }

    #[test]
    fn test_decoding_keeps_key_order() {
        let doc = from_json(r#"{"zeta": 1, "alpha": {"y": 2, "b": 3}, "mid": 4}"#).unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        let alpha = doc.get("alpha").and_then(Value::as_document).unwrap();
        assert_eq!(alpha.keys().collect::<Vec<_>>(), vec!["y", "b"]);

        let yaml = from_yaml("zeta: 1\nalpha: 2\nmid: 3\n").unwrap();
        assert_eq!(yaml.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);

        let typed = from_json_typed(r#"{"zeta": 1, "alpha": 2}"#, &SimpleFieldTyper::new()).unwrap();
        assert_eq!(typed.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_yaml() {
        let doc = from_yaml("name: Ada\nphones:\n  - number: '123'\n").unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("Ada")));
        let yaml = to_yaml(&doc).unwrap();
        assert!(yaml.contains("name: Ada"));
    }

    #[test]
    fn test_from_json_value() {
        let json = serde_json::json!({"id": 1, "ratio": 0.25, "tags": ["x"], "none": null});
        let Value::Map(doc) = Value::try_from(&json).unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(doc.get("id"), Some(&Value::Int(1)));
        assert_eq!(doc.get("ratio"), Some(&Value::Decimal(Decimal::from_str("0.25").unwrap())));
        assert_eq!(doc.get("none"), Some(&Value::Null));
    }

    #[test]
    fn test_top_level_must_be_a_document() {
        assert!(matches!(from_json("[1, 2]"), Err(CodecError::NotADocument { .. })));
    }

    #[test]
    fn test_typed_decoding() {
        let typer = SimpleFieldTyper::new()
            .field("id", FieldType::Integer)
            .field("code", FieldType::String)
            .field("phones.number", FieldType::String)
            .field("price", FieldType::Decimal)
            .field("active", FieldType::Boolean);
        let doc = from_json_typed(
            r#"{"id": "42", "code": 7, "phones": [{"number": 123}], "price": "9.99", "active": "true", "other": 1}"#,
            &typer,
        )
        .unwrap();
        assert_eq!(doc.get("id"), Some(&Value::Int(42)));
        assert_eq!(doc.get("code"), Some(&Value::from("7")));
        let phones = doc.get("phones").and_then(Value::as_seq).unwrap();
        assert_eq!(phones[0].as_document().and_then(|d| d.get("number")), Some(&Value::from("123")));
        assert_eq!(doc.get("price"), Some(&Value::Decimal(Decimal::from_str("9.99").unwrap())));
        assert_eq!(doc.get("active"), Some(&Value::Bool(true)));
        assert_eq!(doc.get("other"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_typed_decoding_mismatch() {
        let typer = SimpleFieldTyper::new().field("id", FieldType::Integer);
        let err = from_json_typed(r#"{"id": "abc"}"#, &typer).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { ref path, .. } if path == "id"));
    }
}
