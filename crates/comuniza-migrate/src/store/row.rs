//! Row representation.

use crate::error::Error;
use crate::schema::Value;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;

/// A single stored row: field name to value.
///
/// A row only stores values that were explicitly written. Fields added after
/// the row was created are absent from the map and materialize their default
/// on read.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct Row {
    /// Field values keyed by field name.
    pub values: HashMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value (builder style).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Get a field value, if the row carries one.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// Remove a field value, returning it if present.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Rename a field key, if the row carries it.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(value) = self.values.remove(from) {
            self.values.insert(to.to_string(), value);
        }
    }

    /// Serialize the row to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a row from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        // sled may hand back unaligned buffers; rkyv requires alignment.
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let mut row = Row::new().with("name", "ladder").with("is_public", true);

        assert_eq!(row.get("name"), Some(&Value::Text("ladder".into())));
        assert!(row.get("missing").is_none());

        row.rename("is_public", "visibility");
        assert!(row.get("is_public").is_none());
        assert_eq!(row.get("visibility"), Some(&Value::Bool(true)));

        assert_eq!(row.remove("name"), Some(Value::Text("ladder".into())));
        assert!(row.get("name").is_none());
    }

    #[test]
    fn test_row_serialization() {
        let row = Row::new().with("name", "drill").with("owner_id", 7i64);

        let bytes = row.to_bytes().unwrap();
        let restored = Row::from_bytes(&bytes).unwrap();

        assert_eq!(restored, row);
    }
}
