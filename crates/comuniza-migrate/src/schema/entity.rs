//! Entity descriptors.

use super::field::FieldDef;
use rkyv::{Archive, Deserialize, Serialize};

/// An entity (table) descriptor: ordered fields plus index markers.
///
/// There is no separate create-entity operation; a descriptor materializes
/// when the first field is added to a previously unknown entity.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name.
    pub name: String,
    /// Ordered field definitions.
    pub fields: Vec<FieldDef>,
    /// Names of indexed fields.
    pub indexes: Vec<String>,
}

impl EntityDef {
    /// Create an empty entity descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a field (builder style).
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a field by name (mutable).
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDef> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Check whether a field exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Check whether a field is indexed.
    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.iter().any(|i| i == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    #[test]
    fn test_entity_lookup() {
        let entity = EntityDef::new("item")
            .with_field(FieldDef::new("name", FieldType::Text))
            .with_field(FieldDef::nullable("notes", FieldType::Text));

        assert!(entity.has_field("name"));
        assert!(!entity.has_field("missing"));
        assert_eq!(entity.field("notes").unwrap().nullable, true);
    }

    #[test]
    fn test_index_markers() {
        let mut entity = EntityDef::new("item");
        assert!(!entity.has_index("owner_id"));
        entity.indexes.push("owner_id".into());
        assert!(entity.has_index("owner_id"));
    }
}
