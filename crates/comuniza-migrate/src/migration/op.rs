//! Schema and data operations.
//!
//! A closed sum over the operation kinds a node may carry. Each kind has an
//! explicit `apply`/`reverse` pair dispatched by pattern matching; reversal
//! needs no external schema history because every variant carries what its
//! own reversal requires.

use super::error::OperationError;
use super::transforms::DataTransform;
use crate::schema::{EntityDef, FieldDef, Value};
use crate::store::StoreTxn;

/// Explicit value mapping for a field retype.
///
/// Retypes never guess: every stored value must map through an entry or the
/// declared fallback, otherwise the operation fails with `UnmappedValue`.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    /// Ordered `(from, to)` pairs.
    pub entries: Vec<(Value, Value)>,
    /// Value used when no entry matches.
    pub fallback: Option<Value>,
}

impl ValueMap {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping entry (builder style).
    pub fn map(mut self, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        self.entries.push((from.into(), to.into()));
        self
    }

    /// Set the fallback value (builder style).
    pub fn with_fallback(mut self, fallback: impl Into<Value>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Map a value, if an entry or fallback covers it.
    pub fn apply(&self, value: &Value) -> Option<Value> {
        self.entries
            .iter()
            .find(|(from, _)| from == value)
            .map(|(_, to)| to.clone())
            .or_else(|| self.fallback.clone())
    }

    /// The inverse mapping: entries swapped, no fallback.
    ///
    /// Values that were produced by the fallback cannot be restored; that is
    /// the declared lossy case of a retype with a fallback.
    pub fn inverted(&self) -> ValueMap {
        ValueMap {
            entries: self
                .entries
                .iter()
                .map(|(from, to)| (to.clone(), from.clone()))
                .collect(),
            fallback: None,
        }
    }
}

/// A single schema or data change within a migration node.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Add a field to an entity. Creates the entity descriptor when this is
    /// its first field.
    AddField {
        /// Target entity.
        entity: String,
        /// The new field definition.
        field: FieldDef,
    },
    /// Alter a field's stored representation while keeping its name.
    AlterField {
        /// Target entity.
        entity: String,
        /// Definition before the alter (used for reversal).
        from: FieldDef,
        /// Definition after the alter. Must keep the field name.
        to: FieldDef,
        /// Value mapping applied to existing rows. `None` means a
        /// shape-only alter (e.g. nullability) that leaves values in place.
        map: Option<ValueMap>,
    },
    /// Remove a field. Carries the full definition so reversal can re-add
    /// it; row values are lost (documented lossy).
    RemoveField {
        /// Target entity.
        entity: String,
        /// The removed field's definition.
        field: FieldDef,
    },
    /// Rename a field, preserving its definition and values.
    RenameField {
        /// Target entity.
        entity: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Mark a field as indexed.
    AddIndex {
        /// Target entity.
        entity: String,
        /// Field to index.
        field: String,
    },
    /// Run a bulk data transform against the current data shape.
    RunTransform(DataTransform),
}

impl Operation {
    /// Apply this operation against the transactional overlay.
    pub fn apply(&self, txn: &mut StoreTxn<'_>) -> Result<(), OperationError> {
        match self {
            Operation::AddField { entity, field } => add_field(txn, entity, field),
            Operation::AlterField {
                entity, to, map, ..
            } => alter_field(txn, entity, to, map.as_ref()),
            Operation::RemoveField { entity, field } => remove_field(txn, entity, &field.name),
            Operation::RenameField { entity, from, to } => rename_field(txn, entity, from, to),
            Operation::AddIndex { entity, field } => set_index(txn, entity, field, true),
            Operation::RunTransform(transform) => transform.run_forward(txn),
        }
    }

    /// Reverse this operation against the transactional overlay.
    pub fn reverse(&self, txn: &mut StoreTxn<'_>) -> Result<(), OperationError> {
        match self {
            Operation::AddField { entity, field } => remove_field(txn, entity, &field.name),
            Operation::AlterField {
                entity, from, map, ..
            } => {
                let inverse = map.as_ref().map(ValueMap::inverted);
                alter_field(txn, entity, from, inverse.as_ref())
            }
            Operation::RemoveField { entity, field } => add_field(txn, entity, field),
            Operation::RenameField { entity, from, to } => rename_field(txn, entity, to, from),
            Operation::AddIndex { entity, field } => set_index(txn, entity, field, false),
            Operation::RunTransform(transform) => transform.run_reverse(txn),
        }
    }

    /// Human-readable description for logs and operator output.
    pub fn description(&self) -> String {
        match self {
            Operation::AddField { entity, field } => {
                format!("add field '{}.{}'", entity, field.name)
            }
            Operation::AlterField { entity, from, to, .. } => format!(
                "alter field '{}.{}' ({} -> {})",
                entity, to.name, from.field_type, to.field_type
            ),
            Operation::RemoveField { entity, field } => {
                format!("remove field '{}.{}'", entity, field.name)
            }
            Operation::RenameField { entity, from, to } => {
                format!("rename field '{}.{}' to '{}'", entity, from, to)
            }
            Operation::AddIndex { entity, field } => {
                format!("add index on '{}.{}'", entity, field)
            }
            Operation::RunTransform(transform) => format!("run transform '{}'", transform.name()),
        }
    }
}

fn require_entity(txn: &StoreTxn<'_>, entity: &str) -> Result<EntityDef, OperationError> {
    txn.entity(entity)?.ok_or_else(|| OperationError::UnknownEntity {
        entity: entity.to_string(),
    })
}

fn add_field(txn: &mut StoreTxn<'_>, entity: &str, field: &FieldDef) -> Result<(), OperationError> {
    let mut def = txn
        .entity(entity)?
        .unwrap_or_else(|| EntityDef::new(entity));

    if def.has_field(&field.name) {
        return Err(OperationError::DuplicateField {
            entity: entity.to_string(),
            field: field.name.clone(),
        });
    }
    def.fields.push(field.clone());
    txn.put_entity(def);
    Ok(())
}

fn remove_field(txn: &mut StoreTxn<'_>, entity: &str, field: &str) -> Result<(), OperationError> {
    let mut def = require_entity(txn, entity)?;
    if !def.has_field(field) {
        return Err(OperationError::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        });
    }
    def.fields.retain(|f| f.name != field);
    def.indexes.retain(|i| i != field);
    txn.put_entity(def);

    for (id, mut row) in txn.scan(entity)? {
        if row.remove(field).is_some() {
            txn.update_row(entity, id, row);
        }
    }
    Ok(())
}

fn alter_field(
    txn: &mut StoreTxn<'_>,
    entity: &str,
    new_def: &FieldDef,
    map: Option<&ValueMap>,
) -> Result<(), OperationError> {
    let mut def = require_entity(txn, entity)?;
    let slot = def
        .field_mut(&new_def.name)
        .ok_or_else(|| OperationError::UnknownField {
            entity: entity.to_string(),
            field: new_def.name.clone(),
        })?;
    *slot = new_def.clone();
    txn.put_entity(def);

    if let Some(map) = map {
        for (id, mut row) in txn.scan(entity)? {
            if let Some(value) = row.get(&new_def.name).cloned() {
                let mapped = map.apply(&value).ok_or(OperationError::UnmappedValue {
                    entity: entity.to_string(),
                    field: new_def.name.clone(),
                    value: value.clone(),
                })?;
                if mapped != value {
                    row.set(new_def.name.clone(), mapped);
                    txn.update_row(entity, id, row);
                }
            }
        }
    }
    Ok(())
}

fn rename_field(
    txn: &mut StoreTxn<'_>,
    entity: &str,
    from: &str,
    to: &str,
) -> Result<(), OperationError> {
    let mut def = require_entity(txn, entity)?;
    if def.has_field(to) {
        return Err(OperationError::DuplicateField {
            entity: entity.to_string(),
            field: to.to_string(),
        });
    }
    let slot = def.field_mut(from).ok_or_else(|| OperationError::UnknownField {
        entity: entity.to_string(),
        field: from.to_string(),
    })?;
    slot.name = to.to_string();
    for index in def.indexes.iter_mut() {
        if index == from {
            *index = to.to_string();
        }
    }
    txn.put_entity(def);

    for (id, mut row) in txn.scan(entity)? {
        if row.get(from).is_some() {
            row.rename(from, to);
            txn.update_row(entity, id, row);
        }
    }
    Ok(())
}

fn set_index(
    txn: &mut StoreTxn<'_>,
    entity: &str,
    field: &str,
    indexed: bool,
) -> Result<(), OperationError> {
    let mut def = require_entity(txn, entity)?;
    if !def.has_field(field) {
        return Err(OperationError::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        });
    }
    if indexed {
        if !def.has_index(field) {
            def.indexes.push(field.to_string());
        }
    } else {
        def.indexes.retain(|i| i != field);
    }
    txn.put_entity(def);
    Ok(())
}
