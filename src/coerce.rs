//! Deterministic coercions between wire JSON and state values.
//!
//! The Census API is not consistent about scalar types: identifiers come
//! back as integers, as floats (`42.0`) or as strings depending on the
//! endpoint. State always holds identifiers as strings and connection ids
//! as integers; these helpers are the only place that conversion happens.

use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

/// Read an identifier from the wire as its canonical string form.
///
/// Integral numbers lose any trailing `.0`; `null` yields `None`.
pub fn id_from_wire(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Write an identifier to the wire: strings in canonical integer form
/// become JSON integers, anything else (`"007"`, `"+7"`) stays a string.
pub fn id_to_wire(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) if n.to_string() == id => Value::from(n),
        _ => Value::String(id.to_string()),
    }
}

/// Read an integer id, accepting integral floats and integer strings.
pub fn int_from_wire(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Best-effort string form of an arbitrary wire value. `null` is empty.
pub fn string_from_wire(value: &Value) -> String {
    id_from_wire(value).unwrap_or_default()
}

/// The text a constant is sent as. Strings are sent verbatim, everything
/// else as compact JSON.
pub fn stringify_constant(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => number_text(n),
        other => other.to_string(),
    }
}

/// Read an optional boolean, treating anything but `true`/`false` as unset.
pub fn bool_from_wire(value: Option<&Value>) -> Option<bool> {
    value.and_then(Value::as_bool)
}

/// Serde helper: treat an explicit `null` like an absent key.
///
/// The engine sends every attribute of a block, with `null` for the unset
/// ones, so non-optional state fields need this alongside `#[serde(default)]`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Serde helper: deserialize an integer id through [`int_from_wire`], so
/// `42.0` and `"42"` are accepted as well as `42`.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    int_from_wire(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected an integer id, got {}", value)))
}

fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
            format!("{}", f as i64)
        },
        _ => n.to_string(),
    }
}
