//! Conversion between JSON wire values and typed settings.
//!
//! A remote caller only knows a setting's name and, optionally, the kind it
//! should have. [`from_wire`] applies that hint (or infers a kind from the
//! JSON shape) to produce a [`SettingValue`]; [`to_wire`] goes the other way
//! for replies and replay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tandem_core::{CompiledPattern, PatternFlags, SettingError, SettingKind, SettingValue};

/// A setting value as carried in replies: the JSON payload plus its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireValue {
    pub kind: SettingKind,
    pub value: Value,
}

/// Encodes `value` for the wire.
///
/// Patterns travel as `{"pattern": ..., "flags": ...}`. Mapping entries each
/// carry their own kind, as `{"kind": ..., "value": ...}`, so the receiver
/// rebuilds the same entries without guessing.
pub fn to_wire(value: &SettingValue) -> WireValue {
    WireValue {
        kind: value.kind(),
        value: to_json(value),
    }
}

fn to_json(value: &SettingValue) -> Value {
    match value {
        SettingValue::Integer(v) => Value::from(*v),
        SettingValue::Text(s) => Value::from(s.as_str()),
        SettingValue::Bool(b) => Value::from(*b),
        SettingValue::Pattern(p) => serde_json::json!({
            "pattern": p.as_str(),
            "flags": p.flags().to_string(),
        }),
        SettingValue::Map(m) => Value::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), tagged(v)))
                .collect::<Map<String, Value>>(),
        ),
        SettingValue::Object(v) => v.clone(),
    }
}

fn tagged(value: &SettingValue) -> Value {
    let mut entry = Map::new();
    entry.insert("kind".to_string(), Value::from(value.kind().to_string()));
    entry.insert("value".to_string(), to_json(value));
    Value::Object(entry)
}

/// Decodes `raw` into a setting value for `name`.
///
/// With a hint the value is coerced to that kind; without one the kind is
/// inferred: booleans, integral numbers, strings and objects map to their
/// setting kinds, anything else is kept as an opaque object.
///
/// Under the `Map` hint every entry must be tagged as [`to_wire`] writes it.
/// Untagged objects are only accepted without a hint, where entry kinds are
/// inferred.
///
/// # Errors
///
/// `SettingError::Coercion` if the value cannot take the hinted kind, or if
/// the hint names a kind that cannot be sent as plain data.
pub fn from_wire(
    name: &str,
    raw: &Value,
    hint: Option<SettingKind>,
) -> Result<SettingValue, SettingError> {
    let Some(kind) = hint else {
        return Ok(infer(raw));
    };

    if !kind.is_transferable() {
        return Err(coercion(name, raw, kind));
    }

    let coerced = match kind {
        SettingKind::Integer => integer_text(raw)
            .and_then(|text| text.trim().parse::<i64>().ok())
            .map(SettingValue::Integer),
        SettingKind::Text => match raw {
            Value::String(s) => Some(SettingValue::Text(s.clone())),
            Value::Number(n) => Some(SettingValue::Text(n.to_string())),
            Value::Bool(b) => Some(SettingValue::Text(b.to_string())),
            _ => None,
        },
        SettingKind::Bool => parse_bool(raw).map(SettingValue::Bool),
        SettingKind::Map => match raw {
            Value::Object(entries) => tagged_map(name, entries).map(SettingValue::Map),
            _ => None,
        },
        SettingKind::Object => Some(SettingValue::Object(raw.clone())),
        SettingKind::Pattern => None,
    };

    coerced.ok_or_else(|| coercion(name, raw, kind))
}

fn coercion(name: &str, raw: &Value, expected: SettingKind) -> SettingError {
    SettingError::Coercion {
        name: name.to_string(),
        value: raw.to_string(),
        expected,
    }
}

fn tagged_map(name: &str, entries: &Map<String, Value>) -> Option<BTreeMap<String, SettingValue>> {
    entries
        .iter()
        .map(|(key, entry)| {
            let wire = WireValue::deserialize(entry).ok()?;
            let value = match wire.kind {
                SettingKind::Pattern => pattern_entry(&wire.value)?,
                kind => from_wire(name, &wire.value, Some(kind)).ok()?,
            };
            Some((key.clone(), value))
        })
        .collect()
}

// Patterns nested in a mapping are recompiled on arrival.
fn pattern_entry(raw: &Value) -> Option<SettingValue> {
    let source = raw.get("pattern")?.as_str()?;
    let flags = match raw.get("flags") {
        Some(letters) => PatternFlags::from_letters(letters.as_str()?)?,
        None => PatternFlags::default(),
    };
    CompiledPattern::compile(source, flags)
        .ok()
        .map(SettingValue::Pattern)
}

/// Returns the text an integer coercion should parse.
///
/// Strings are used as given, numbers in their decimal form, and booleans
/// as `1`/`0`. Other JSON values have no integer reading.
pub fn integer_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

fn parse_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn infer(raw: &Value) -> SettingValue {
    match raw {
        Value::Bool(b) => SettingValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(v) => SettingValue::Integer(v),
            None => SettingValue::Object(raw.clone()),
        },
        Value::String(s) => SettingValue::Text(s.clone()),
        Value::Object(entries) => SettingValue::Map(infer_map(entries)),
        Value::Null | Value::Array(_) => SettingValue::Object(raw.clone()),
    }
}

fn infer_map(entries: &Map<String, Value>) -> BTreeMap<String, SettingValue> {
    entries
        .iter()
        .map(|(k, v)| (k.clone(), infer(v)))
        .collect()
}
