//! The caller-facing record value.

use crate::ids::RecordId;
use crate::types::{QName, Scope, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a record type by name; `version` None resolves to the
/// latest version at write time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypeRef {
    pub name: QName,
    pub version: Option<u64>,
}

/// A record, both as a local draft and as the stored result returned by
/// table operations.
///
/// Build a draft with [`Record::new`], set a record type and fields, and
/// pass it to a table. The returned record carries the assigned id, the
/// resolved record type version, and the per-scope version numbers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: Option<RecordId>,
    record_type: Option<RecordTypeRef>,
    fields: BTreeMap<QName, Value>,
    fields_to_delete: Vec<QName>,
    version: Option<u64>,
    scope_versions: BTreeMap<Scope, u64>,
    default_namespace: Option<String>,
}

impl Record {
    /// An empty draft. Nothing changes in the repository until the draft
    /// is passed to a table operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty draft keyed by `id`.
    pub fn with_id(id: RecordId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: RecordId) -> &mut Self {
        self.id = Some(id);
        self
    }

    pub fn record_type(&self) -> Option<&RecordTypeRef> {
        self.record_type.as_ref()
    }

    /// Declare the record type, resolved to its latest version at write
    /// time.
    pub fn set_record_type(&mut self, name: QName) -> &mut Self {
        self.record_type = Some(RecordTypeRef {
            name,
            version: None,
        });
        self
    }

    /// Declare the record type pinned to a specific version.
    pub fn set_record_type_version(&mut self, name: QName, version: u64) -> &mut Self {
        self.record_type = Some(RecordTypeRef {
            name,
            version: Some(version),
        });
        self
    }

    /// Set the namespace that qualifies the plain names passed to
    /// [`Record::set_record_type_name`], [`Record::set_field_name`], and
    /// [`Record::delete_field_name`], to avoid building a [`QName`] per
    /// call.
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    /// Declare the record type by plain name, qualified with the default
    /// namespace. Without a default namespace the name lands in the empty
    /// namespace, which no registered record type will match.
    pub fn set_record_type_name(&mut self, name: &str) -> &mut Self {
        let name = self.qualified(name);
        self.set_record_type(name)
    }

    pub fn fields(&self) -> &BTreeMap<QName, Value> {
        &self.fields
    }

    pub fn get_field(&self, name: &QName) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &QName) -> bool {
        self.fields.contains_key(name)
    }

    pub fn set_field(&mut self, name: QName, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name, value.into());
        self
    }

    /// Set a field by plain name, qualified with the default namespace.
    pub fn set_field_name(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let name = self.qualified(name);
        self.set_field(name, value)
    }

    /// Mark a field for deletion on the next update. Fields merely omitted
    /// from an update are left untouched; deletion is always explicit.
    pub fn delete_field(&mut self, name: QName) -> &mut Self {
        self.fields.remove(&name);
        if !self.fields_to_delete.contains(&name) {
            self.fields_to_delete.push(name);
        }
        self
    }

    /// Mark a field for deletion by plain name, qualified with the default
    /// namespace.
    pub fn delete_field_name(&mut self, name: &str) -> &mut Self {
        let name = self.qualified(name);
        self.delete_field(name)
    }

    pub fn fields_to_delete(&self) -> &[QName] {
        &self.fields_to_delete
    }

    fn qualified(&self, name: &str) -> QName {
        QName::new(self.default_namespace.as_deref().unwrap_or(""), name)
    }

    /// The record version: the highest version across the two versioned
    /// scopes, None when the record has no versioned fields yet.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Pin the version targeted by versioned reads and mutable-field
    /// corrections.
    pub fn set_version(&mut self, version: u64) -> &mut Self {
        self.version = Some(version);
        self
    }

    /// The version number of one scope, None if the scope has no fields.
    pub fn scope_version(&self, scope: Scope) -> Option<u64> {
        self.scope_versions.get(&scope).copied()
    }

    /// Drop the scope versions read from the store, making a subsequent
    /// update unconditional instead of optimistically checked.
    pub fn clear_scope_versions(&mut self) -> &mut Self {
        self.scope_versions.clear();
        self
    }

    pub(crate) fn set_scope_version(&mut self, scope: Scope, version: u64) {
        self.scope_versions.insert(scope, version);
    }

    pub(crate) fn set_record_version(&mut self, version: Option<u64>) {
        self.version = version;
    }

    pub(crate) fn set_fields(&mut self, fields: BTreeMap<QName, Value>) {
        self.fields = fields;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_record_is_empty() {
        let record = Record::new();
        assert!(record.id().is_none());
        assert!(record.record_type().is_none());
        assert!(record.fields().is_empty());
        assert!(record.version().is_none());
    }

    #[test]
    fn test_set_and_get_field() {
        let mut record = Record::new();
        record.set_field(QName::new("book", "title"), "Car maintenance");

        assert_eq!(
            record.get_field(&QName::new("book", "title")),
            Some(&Value::String("Car maintenance".into()))
        );
    }

    #[test]
    fn test_delete_field_removes_pending_value() {
        let mut record = Record::new();
        let name = QName::new("book", "title");
        record.set_field(name.clone(), "x");
        record.delete_field(name.clone());
        record.delete_field(name.clone());

        assert!(!record.has_field(&name));
        assert_eq!(record.fields_to_delete(), &[name]);
    }

    #[test]
    fn test_default_namespace_qualifies_plain_names() {
        let mut record = Record::new();
        record.set_default_namespace("book");
        record.set_record_type_name("Book");
        record.set_field_name("title", "Lily");

        assert_eq!(record.record_type().unwrap().name, QName::new("book", "Book"));
        assert!(record.has_field(&QName::new("book", "title")));

        record.delete_field_name("title");
        assert_eq!(record.fields_to_delete(), &[QName::new("book", "title")]);

        // Without a default namespace, plain names land in the empty
        // namespace.
        let mut bare = Record::new();
        bare.set_field_name("title", "x");
        assert!(bare.has_field(&QName::new("", "title")));
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let mut record = Record::new();
        record.set_record_type(QName::new("book", "Book"));
        record.set_field(QName::new("book", "title"), "Lily");
        record.set_field(QName::new("book", "pages"), 912i64);

        let json = serde_json::to_string(&record).unwrap();
        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
