//! Type manager: owns field type and record type definitions.

use crate::error::{RepositoryError, Result};
use crate::schema::types::{FieldType, FieldTypeEntry, FieldTypeId, RecordType, RecordTypeId};
use crate::types::{QName, Scope};
use crate::values::{ValueType, ValueTypeRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// In-memory schema index.
///
/// All versions of a record type stay readable; the vector per name is
/// indexed by `version - 1`.
#[derive(Debug, Default)]
struct SchemaIndex {
    field_types: HashMap<FieldTypeId, FieldType>,
    field_names: HashMap<QName, FieldTypeId>,
    record_types: HashMap<QName, Vec<RecordType>>,
    next_field_type_id: u64,
    next_record_type_id: u64,
}

/// Owns schema definitions, versioned and mutable independently of record
/// data.
///
/// Schema mutations take the single writer lock, which serializes them
/// process-wide against each other; record operations never take it.
#[derive(Debug)]
pub struct TypeManager {
    registry: Arc<ValueTypeRegistry>,
    index: RwLock<SchemaIndex>,
}

impl TypeManager {
    pub fn new(registry: Arc<ValueTypeRegistry>) -> Self {
        Self {
            registry,
            index: RwLock::new(SchemaIndex {
                next_field_type_id: 1,
                next_record_type_id: 1,
                ..SchemaIndex::default()
            }),
        }
    }

    /// The value type registry this manager resolves names against.
    pub fn value_type(&self, name: &str) -> Result<ValueType> {
        self.registry.get(name)
    }

    /// Build a draft field type. Pure constructor, no store mutation.
    pub fn new_field_type(&self, value_type: ValueType, name: QName, scope: Scope) -> FieldType {
        FieldType::new(value_type, name, scope)
    }

    /// Create a field type in the repository: assigns a fresh identity and
    /// returns the stored definition.
    pub fn create_field_type(&self, field_type: FieldType) -> Result<FieldType> {
        let mut index = self.index.write();

        if index.field_names.contains_key(field_type.name()) {
            return Err(RepositoryError::DuplicateFieldType(field_type.name().clone()));
        }

        let id = FieldTypeId(index.next_field_type_id);
        index.next_field_type_id += 1;

        let stored = field_type.with_id(id);
        index.field_names.insert(stored.name().clone(), id);
        index.field_types.insert(id, stored.clone());

        debug!(field_type = %stored.name(), id = %id, "created field type");
        Ok(stored)
    }

    /// Convenience composing a registry lookup, [`Self::new_field_type`],
    /// and [`Self::create_field_type`].
    pub fn create_field_type_by_name(
        &self,
        value_type_name: &str,
        name: QName,
        scope: Scope,
    ) -> Result<FieldType> {
        let value_type = self.registry.get(value_type_name)?;
        self.create_field_type(FieldType::new(value_type, name, scope))
    }

    /// Look up a field type by identity.
    pub fn get_field_type(&self, id: FieldTypeId) -> Result<FieldType> {
        self.index
            .read()
            .field_types
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::UnknownFieldType(id.to_string()))
    }

    /// Look up a field type by qualified name.
    pub fn get_field_type_by_name(&self, name: &QName) -> Result<FieldType> {
        let index = self.index.read();
        index
            .field_names
            .get(name)
            .and_then(|id| index.field_types.get(id))
            .cloned()
            .ok_or_else(|| RepositoryError::UnknownFieldType(name.to_string()))
    }

    /// Build a draft record type. Pure constructor, no store mutation.
    pub fn new_record_type(&self, name: QName) -> RecordType {
        RecordType::new(name)
    }

    /// Create a record type: assigns identity and version 1.
    pub fn create_record_type(&self, record_type: RecordType) -> Result<RecordType> {
        let mut index = self.index.write();

        if index.record_types.contains_key(record_type.name()) {
            return Err(RepositoryError::DuplicateRecordType(record_type.name().clone()));
        }
        Self::check_entries(&index, record_type.entries())?;

        let id = RecordTypeId(index.next_record_type_id);
        index.next_record_type_id += 1;

        let stored = record_type.with_id(id).with_version(1);
        index
            .record_types
            .insert(stored.name().clone(), vec![stored.clone()]);

        debug!(record_type = %stored.name(), id = %id, "created record type");
        Ok(stored)
    }

    /// Read a record type; `version` None means latest.
    pub fn get_record_type_by_name(&self, name: &QName, version: Option<u64>) -> Result<RecordType> {
        let index = self.index.read();
        let versions = index
            .record_types
            .get(name)
            .ok_or_else(|| RepositoryError::RecordTypeNotFound(name.to_string()))?;

        match version {
            None => Ok(versions.last().expect("stored record type has at least one version").clone()),
            Some(0) => Err(RepositoryError::RecordTypeNotFound(format!("{name} version 0"))),
            Some(v) => versions.get((v - 1) as usize).cloned().ok_or_else(|| {
                RepositoryError::RecordTypeNotFound(format!("{name} version {v}"))
            }),
        }
    }

    /// Update a record type under optimistic concurrency.
    ///
    /// The draft must carry the identity and the version it was read at;
    /// a stale base version fails with `ConcurrentModification`. Entries
    /// are merged add-only (re-adding a field type replaces its mandatory
    /// flag) and the version is incremented. Previous versions stay
    /// readable.
    pub fn update_record_type(&self, record_type: RecordType) -> Result<RecordType> {
        let mut index = self.index.write();

        let id = record_type
            .id()
            .ok_or_else(|| RepositoryError::RecordTypeNotFound(record_type.name().to_string()))?;

        Self::check_entries(&index, record_type.entries())?;

        let versions = index
            .record_types
            .get_mut(record_type.name())
            .ok_or_else(|| RepositoryError::RecordTypeNotFound(record_type.name().to_string()))?;
        let current = versions.last().expect("stored record type has at least one version");

        if current.id() != Some(id) {
            return Err(RepositoryError::RecordTypeNotFound(record_type.name().to_string()));
        }
        if record_type.version() != current.version() {
            return Err(RepositoryError::ConcurrentModification(format!(
                "record type {} updated at version {}, current is {}",
                record_type.name(),
                record_type.version(),
                current.version()
            )));
        }

        let mut merged: Vec<FieldTypeEntry> = current.entries().to_vec();
        for entry in record_type.entries() {
            match merged.iter_mut().find(|e| e.field_type == entry.field_type) {
                Some(existing) => existing.mandatory = entry.mandatory,
                None => merged.push(*entry),
            }
        }

        let updated = record_type
            .clone()
            .with_version(current.version() + 1)
            .with_entries(merged);
        versions.push(updated.clone());

        debug!(record_type = %updated.name(), version = updated.version(), "updated record type");
        Ok(updated)
    }

    fn check_entries(index: &SchemaIndex, entries: &[FieldTypeEntry]) -> Result<()> {
        for entry in entries {
            if !index.field_types.contains_key(&entry.field_type) {
                return Err(RepositoryError::UnknownFieldType(entry.field_type.to_string()));
            }
        }
        Ok(())
    }
}
