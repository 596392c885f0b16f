//! Form scratchpad: the values a user typed into a form that failed
//! validation, kept just long enough to redisplay them.
//!
//! Callers refer to the same field in different spellings (`"custid"`,
//! `":custid"`, `"CustId"`). Keys are normalized at the boundary (insert,
//! lookup, blob decode), so the map only ever holds one canonical spelling.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::IdentityError;

/// Canonical spelling of a scratchpad key: trimmed, without a leading
/// `:`, ASCII-lowercased.
pub fn normalize_key(key: &str) -> String {
    key.trim().trim_start_matches(':').to_ascii_lowercase()
}

/// String → string map with indifferent key access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormFields(BTreeMap<String, String>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one for the same
    /// normalized key.
    pub fn insert(
        &mut self,
        key: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.0.insert(normalize_key(key.as_ref()), value.into())
    }

    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.0.get(&normalize_key(key.as_ref())).map(String::as_str)
    }

    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<String> {
        self.0.remove(&normalize_key(key.as_ref()))
    }

    pub fn contains_key(&self, key: impl AsRef<str>) -> bool {
        self.0.contains_key(&normalize_key(key.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in canonical-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encodes the map as a JSON object.
    pub fn to_json(&self) -> Result<String, IdentityError> {
        serde_json::to_string(&self.0).map_err(IdentityError::Encode)
    }

    /// Decodes a JSON object, normalizing every key on the way in.
    ///
    /// When two keys collapse to the same canonical key, the one that
    /// sorts last in the raw blob wins.
    pub fn from_json(blob: &str) -> Result<Self, IdentityError> {
        let raw: BTreeMap<String, String> =
            serde_json::from_str(blob).map_err(IdentityError::Decode)?;
        Ok(raw.into_iter().collect())
    }
}

impl<K, V> FromIterator<(K, V)> for FormFields
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}
