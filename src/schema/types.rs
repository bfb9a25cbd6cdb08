//! Schema value objects.
//!
//! Field types and record types are built locally as drafts (identity
//! unset) and handed to the [`TypeManager`](super::TypeManager), which
//! returns the stored definition with identity assigned.

use crate::types::{QName, Scope};
use crate::values::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a field type, assigned by the type manager.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldTypeId(pub u64);

impl fmt::Debug for FieldTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldTypeId({})", self.0)
    }
}

impl fmt::Display for FieldTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a record type, assigned by the type manager.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordTypeId(pub u64);

impl fmt::Debug for RecordTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordTypeId({})", self.0)
    }
}

impl fmt::Display for RecordTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Definition of a field: qualified name, value type, and storage scope.
///
/// Immutable after creation; the only mutation is the one-time identity
/// assignment performed by the type manager.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldType {
    id: Option<FieldTypeId>,
    name: QName,
    value_type: ValueType,
    scope: Scope,
}

impl FieldType {
    /// Build a draft field type. Nothing changes in the repository until
    /// the draft is passed to the type manager.
    pub fn new(value_type: ValueType, name: QName, scope: Scope) -> Self {
        Self {
            id: None,
            name,
            value_type,
            scope,
        }
    }

    pub fn id(&self) -> Option<FieldTypeId> {
        self.id
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn with_id(mut self, id: FieldTypeId) -> Self {
        self.id = Some(id);
        self
    }
}

/// One entry of a record type: a field type reference plus whether a value
/// is mandatory at record creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTypeEntry {
    pub field_type: FieldTypeId,
    pub mandatory: bool,
}

/// Definition of a record type: an ordered set of field type entries,
/// versioned independently of record data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    id: Option<RecordTypeId>,
    name: QName,
    version: u64,
    entries: Vec<FieldTypeEntry>,
}

impl RecordType {
    /// Build a draft record type with no entries. Version 0 marks a draft;
    /// stored record types start at version 1.
    pub fn new(name: QName) -> Self {
        Self {
            id: None,
            name,
            version: 0,
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<RecordTypeId> {
        self.id
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[FieldTypeEntry] {
        &self.entries
    }

    /// Add a field type entry. Re-adding an already present field type
    /// replaces its mandatory flag.
    pub fn add_field_type_entry(&mut self, field_type: FieldTypeId, mandatory: bool) -> &mut Self {
        match self.entries.iter_mut().find(|e| e.field_type == field_type) {
            Some(entry) => entry.mandatory = mandatory,
            None => self.entries.push(FieldTypeEntry {
                field_type,
                mandatory,
            }),
        }
        self
    }

    /// The entry for a field type, if present.
    pub fn entry(&self, field_type: FieldTypeId) -> Option<&FieldTypeEntry> {
        self.entries.iter().find(|e| e.field_type == field_type)
    }

    pub(crate) fn with_id(mut self, id: RecordTypeId) -> Self {
        self.id = Some(id);
        self
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn with_entries(mut self, entries: Vec<FieldTypeEntry>) -> Self {
        self.entries = entries;
        self
    }
}
