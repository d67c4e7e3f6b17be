//! Typed metadata values.
//!
//! Free-form metadata on cases, entities, and indicators is a map of known
//! scalar kinds plus an opaque escape hatch, rather than a raw
//! `serde_json::Value`. Downstream code reaches scalars through the typed
//! accessors and cannot silently depend on undeclared structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single metadata value.
///
/// Serializes untagged, so scalar values round-trip to bare JSON scalars
/// and arbitrary JSON lands in [`MetaValue::Opaque`] unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
  Flag(bool),
  Number(f64),
  Text(String),
  /// Anything that is not a scalar (arrays, nested objects, null).
  Opaque(serde_json::Value),
}

/// A metadata map. Ordered so serialized output is stable across writes.
pub type Metadata = BTreeMap<String, MetaValue>;

impl MetaValue {
  /// Numeric view of the value. Text is coerced the way analyst imports
  /// write amounts: `"$12,500"` parses to `12500.0`.
  pub fn as_number(&self) -> Option<f64> {
    match self {
      MetaValue::Number(n) => Some(*n),
      MetaValue::Text(s) => {
        let cleaned = s.replace([',', '$'], "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
          return None;
        }
        cleaned.parse::<f64>().ok()
      }
      _ => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      MetaValue::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_flag(&self) -> Option<bool> {
    match self {
      MetaValue::Flag(b) => Some(*b),
      _ => None,
    }
  }
}

impl From<&str> for MetaValue {
  fn from(value: &str) -> Self { MetaValue::Text(value.to_owned()) }
}

impl From<f64> for MetaValue {
  fn from(value: f64) -> Self { MetaValue::Number(value) }
}

impl From<bool> for MetaValue {
  fn from(value: bool) -> Self { MetaValue::Flag(value) }
}

/// Return the first numeric value found under any of `keys`, searching the
/// maps in order.
pub fn first_number<'a>(
  maps: impl IntoIterator<Item = &'a Metadata>,
  keys: &[&str],
) -> Option<f64> {
  for map in maps {
    for key in keys {
      if let Some(number) = map.get(*key).and_then(MetaValue::as_number) {
        return Some(number);
      }
    }
  }
  None
}

/// Return the first text value found under any of `keys`, searching the
/// maps in order.
pub fn first_text<'a>(
  maps: impl IntoIterator<Item = &'a Metadata>,
  keys: &[&str],
) -> Option<&'a str> {
  for map in maps {
    for key in keys {
      if let Some(text) = map.get(*key).and_then(MetaValue::as_text) {
        return Some(text);
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scalars_roundtrip_as_bare_json() {
    let mut meta = Metadata::new();
    meta.insert("loss_amount".into(), MetaValue::Number(12500.0));
    meta.insert("verified".into(), MetaValue::Flag(true));
    meta.insert("channel".into(), MetaValue::Text("telegram".into()));

    let json = serde_json::to_string(&meta).unwrap();
    assert_eq!(
      json,
      r#"{"channel":"telegram","loss_amount":12500.0,"verified":true}"#
    );

    let back: Metadata = serde_json::from_str(&json).unwrap();
    assert_eq!(back, meta);
  }

  #[test]
  fn non_scalars_land_in_opaque() {
    let back: Metadata = serde_json::from_str(r#"{"tags":["a","b"]}"#).unwrap();
    assert!(matches!(back.get("tags"), Some(MetaValue::Opaque(_))));
  }

  #[test]
  fn text_amounts_coerce_to_numbers() {
    assert_eq!(MetaValue::from("$12,500").as_number(), Some(12500.0));
    assert_eq!(MetaValue::from("  ").as_number(), None);
    assert_eq!(MetaValue::from("n/a").as_number(), None);
  }
}
