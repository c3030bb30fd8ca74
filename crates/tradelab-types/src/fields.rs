//! Event field maps.
//!
//! Events arrive from browsers and exchange processes as loosely typed JSON
//! objects. [`Fields`] keeps them as an ordered map of JSON values and offers
//! typed accessors that tolerate the usual wire sloppiness (ids sent as
//! strings, prices sent as floats).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised by the typed field accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// A required field is absent.
    #[error("missing field: {0}")]
    Missing(String),

    /// A field is present but has the wrong shape.
    #[error("field {field} is not a valid {expected}: {found}")]
    Invalid {
        /// Name of the offending field.
        field: String,
        /// What the accessor expected (e.g. "id", "integer").
        expected: &'static str,
        /// The JSON text of the value that was found.
        found: String,
    },
}

impl FieldError {
    fn invalid(field: &str, expected: &'static str, found: &Value) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            expected,
            found: found.to_string(),
        }
    }
}

/// An ordered map of event field names to JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// Create an empty field map.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_owned(), value.into());
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Raw access to a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the field is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map holds no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy every field of `other` into `self`; `other` wins on collision.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// A new map holding `self` overlaid with `overrides`.
    #[must_use]
    pub fn merged(&self, overrides: &Self) -> Self {
        let mut out = self.clone();
        out.merge(overrides);
        out
    }

    /// Read a field as a string slice, if it is a JSON string.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Read a field as a non-negative entity id.
    ///
    /// Accepts JSON integers and numeric strings. An absent or `null` field
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Invalid`] if the value is not a valid id.
    pub fn id(&self, key: &str) -> Result<Option<u64>, FieldError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => parse_id(value)
                .map(Some)
                .ok_or_else(|| FieldError::invalid(key, "id", value)),
        }
    }

    /// Read a field as a list of entity ids.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Missing`] if the field is absent, or
    /// [`FieldError::Invalid`] if it is not an array of ids.
    pub fn id_list(&self, key: &str) -> Result<Vec<u64>, FieldError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| FieldError::Missing(key.to_owned()))?;
        let items = value
            .as_array()
            .ok_or_else(|| FieldError::invalid(key, "id list", value))?;
        items
            .iter()
            .map(|item| parse_id(item).ok_or_else(|| FieldError::invalid(key, "id", item)))
            .collect()
    }

    /// Read a field as a signed integer, converting strings and floats.
    ///
    /// Floats are truncated toward zero. An absent or `null` field yields
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Invalid`] if the value cannot be converted.
    pub fn integer(&self, key: &str) -> Result<Option<i64>, FieldError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => parse_integer(value)
                .map(Some)
                .ok_or_else(|| FieldError::invalid(key, "integer", value)),
        }
    }

    /// Read a required integer field.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Missing`] if the field is absent, or
    /// [`FieldError::Invalid`] if it cannot be converted.
    pub fn require_integer(&self, key: &str) -> Result<i64, FieldError> {
        self.integer(key)?
            .ok_or_else(|| FieldError::Missing(key.to_owned()))
    }

    /// Replace a field's value by its integer conversion in place.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Missing`] if the field is absent, or
    /// [`FieldError::Invalid`] if it cannot be converted.
    pub fn coerce_integer(&mut self, key: &str) -> Result<(), FieldError> {
        let value = self.require_integer(key)?;
        self.0.insert(key.to_owned(), Value::from(value));
        Ok(())
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, Value>> for Fields {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < 9.0e18)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.abs() < 9.0e18)
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}
