//! Repository and tables: the record store's entry point.
//!
//! A [`Repository`] owns the value type registry, the type manager, the
//! id generator, and a set of named [`Table`]s. Tables partition the
//! record space; each has an independent record id space.

use crate::error::{RepositoryError, Result};
use crate::ids::{IdGenerator, MasterId, RecordId};
use crate::records::record::Record;
use crate::records::scoped::ScopedFields;
use crate::schema::{RecordType, TypeManager};
use crate::types::{QName, Scope, Value};
use crate::values::ValueTypeRegistry;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Name of the table every repository starts with.
pub const DEFAULT_TABLE: &str = "record";

/// Entry point of the record store.
pub struct Repository {
    registry: Arc<ValueTypeRegistry>,
    type_manager: Arc<TypeManager>,
    id_generator: Arc<IdGenerator>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl Repository {
    /// A repository with the built-in value types and one table named
    /// [`DEFAULT_TABLE`].
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ValueTypeRegistry::with_builtins()))
    }

    /// A repository over a caller-provided registry, for applications
    /// that register custom value types.
    pub fn with_registry(registry: Arc<ValueTypeRegistry>) -> Self {
        let type_manager = Arc::new(TypeManager::new(Arc::clone(&registry)));
        let id_generator = Arc::new(IdGenerator::new());

        let mut tables = HashMap::new();
        tables.insert(
            DEFAULT_TABLE.to_string(),
            Arc::new(Table::new(
                DEFAULT_TABLE.to_string(),
                Arc::clone(&type_manager),
                Arc::clone(&id_generator),
            )),
        );

        Self {
            registry,
            type_manager,
            id_generator,
            tables: RwLock::new(tables),
        }
    }

    pub fn type_manager(&self) -> &TypeManager {
        &self.type_manager
    }

    pub fn id_generator(&self) -> &IdGenerator {
        &self.id_generator
    }

    pub fn value_types(&self) -> &ValueTypeRegistry {
        &self.registry
    }

    /// Create a new table with an independent record id space.
    pub fn create_table(&self, name: &str) -> Result<Arc<Table>> {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(RepositoryError::TableExists(name.to_string()));
        }

        let table = Arc::new(Table::new(
            name.to_string(),
            Arc::clone(&self.type_manager),
            Arc::clone(&self.id_generator),
        ));
        tables.insert(name.to_string(), Arc::clone(&table));

        debug!(table = name, "created table");
        Ok(table)
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::TableNotFound(name.to_string()))
    }

    pub fn default_table(&self) -> Arc<Table> {
        self.get_table(DEFAULT_TABLE)
            .expect("default table exists from construction")
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

/// A stored record: resolved record type plus the scope-partitioned
/// fields.
#[derive(Debug)]
struct StoredRecord {
    id: RecordId,
    record_type: QName,
    /// Record type version per scope. The non-versioned entry is the
    /// reference record type and is always present.
    type_versions: HashMap<Scope, u64>,
    fields: ScopedFields,
}

/// Field changes of one scope: values to set, names to delete.
type ScopeChanges = (BTreeMap<QName, Value>, Vec<QName>);

/// A named partition of the record store.
///
/// Operations on different record ids run in parallel; operations on one
/// id are linearized by a per-record lock. No operation blocks
/// indefinitely and none retries internally.
pub struct Table {
    name: String,
    type_manager: Arc<TypeManager>,
    id_generator: Arc<IdGenerator>,
    records: RwLock<HashMap<RecordId, Arc<RwLock<StoredRecord>>>>,
    variants: RwLock<HashMap<MasterId, BTreeSet<RecordId>>>,
}

impl Table {
    fn new(name: String, type_manager: Arc<TypeManager>, id_generator: Arc<IdGenerator>) -> Self {
        Self {
            name,
            type_manager,
            id_generator,
            records: RwLock::new(HashMap::new()),
            variants: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local record factory; nothing changes in the store.
    pub fn new_record(&self) -> Record {
        Record::new()
    }

    /// Local record factory keyed by `id`; nothing changes in the store.
    pub fn new_record_with_id(&self, id: RecordId) -> Record {
        Record::with_id(id)
    }

    /// Create a record.
    ///
    /// The id is taken from the draft or freshly generated. The declared
    /// record type is resolved (latest version unless pinned), every field
    /// must be known to schema and conform to its value type, and every
    /// mandatory entry of the record type must have a value. Scope version
    /// counters start at 1 for each scope with at least one field.
    pub fn create(&self, record: &Record) -> Result<Record> {
        let type_ref = record
            .record_type()
            .cloned()
            .ok_or(RepositoryError::MissingRecordType)?;
        let record_type = self
            .type_manager
            .get_record_type_by_name(&type_ref.name, type_ref.version)?;

        let changes = self.partition(record)?;
        self.check_mandatory(&record_type, record)?;

        let id = match record.id() {
            Some(id) => id.clone(),
            None => self.id_generator.new_record_id(),
        };

        let mut fields = ScopedFields::default();
        let mut type_versions = HashMap::new();
        type_versions.insert(Scope::NonVersioned, record_type.version());
        for (scope, (sets, deletes)) in &changes {
            if fields.apply(*scope, sets, deletes) {
                type_versions.insert(*scope, record_type.version());
            }
        }

        let stored = StoredRecord {
            id: id.clone(),
            record_type: record_type.name().clone(),
            type_versions,
            fields,
        };
        let result = Self::materialize(&stored);

        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(RepositoryError::RecordExists(id));
        }
        records.insert(id.clone(), Arc::new(RwLock::new(stored)));
        drop(records);

        self.variants
            .write()
            .entry(id.master_id().clone())
            .or_default()
            .insert(id.clone());

        debug!(table = %self.name, id = %id, "created record");
        Ok(result)
    }

    /// Update a record.
    ///
    /// Only scopes whose field values actually change get their version
    /// incremented; setting a field to its current value is a no-op.
    /// Omitted fields are left untouched; deletion goes through the
    /// draft's fields-to-delete list. The stored record type advances to
    /// the resolved version for the non-versioned scope always and for
    /// every scope that changed. When the draft carries scope versions
    /// (it was obtained from a read), a stale version on a scope being
    /// modified fails with `ConcurrentModification`.
    pub fn update(&self, record: &Record) -> Result<Record> {
        let id = record.id().cloned().ok_or(RepositoryError::MissingRecordId)?;
        let entry = self.lookup(&id)?;
        let mut stored = entry.write();

        // The record type advances to its latest version on update, so a
        // version pin carried over from a read does not stick.
        let name = match record.record_type() {
            Some(type_ref) => type_ref.name.clone(),
            None => stored.record_type.clone(),
        };
        let record_type = self.type_manager.get_record_type_by_name(&name, None)?;

        let changes = self.partition(record)?;
        self.check_mandatory_deletes(&record_type, record)?;

        for (scope, (sets, deletes)) in &changes {
            if !stored.fields.would_change(*scope, sets, deletes) {
                continue;
            }
            if let Some(base) = record.scope_version(*scope) {
                let current = stored.fields.scope_version(*scope);
                if base != current {
                    return Err(RepositoryError::ConcurrentModification(format!(
                        "record {id} scope {scope:?} updated at version {base}, current is {current}"
                    )));
                }
            }
        }

        for (scope, (sets, deletes)) in &changes {
            if stored.fields.apply(*scope, sets, deletes) {
                stored.type_versions.insert(*scope, record_type.version());
            }
        }
        stored
            .type_versions
            .insert(Scope::NonVersioned, record_type.version());
        stored.record_type = record_type.name().clone();

        debug!(table = %self.name, id = %id, version = stored.fields.max_version(), "updated record");
        Ok(Self::materialize(&stored))
    }

    /// Correct VERSIONED_MUTABLE field values in place at the version the
    /// draft pins with [`Record::set_version`], without creating a new
    /// version entry. Fields of any other scope in the draft are rejected
    /// with `WrongScope`.
    pub fn update_mutable(&self, record: &Record) -> Result<Record> {
        let id = record.id().cloned().ok_or(RepositoryError::MissingRecordId)?;
        let version = record.version().ok_or(RepositoryError::VersionNotFound(0))?;

        let entry = self.lookup(&id)?;
        let mut stored = entry.write();

        if version == 0 || version > stored.fields.max_version() {
            return Err(RepositoryError::VersionNotFound(version));
        }

        let changes = self.partition(record)?;
        for (scope, (sets, deletes)) in &changes {
            if *scope != Scope::VersionedMutable {
                let field = sets
                    .keys()
                    .next()
                    .or_else(|| deletes.first())
                    .expect("non-empty scope changes")
                    .clone();
                return Err(RepositoryError::WrongScope {
                    field,
                    expected: Scope::VersionedMutable,
                });
            }
        }

        if let Some((sets, deletes)) = changes.get(&Scope::VersionedMutable) {
            stored
                .fields
                .versioned_mutable
                .correct(version, sets, deletes)
                .ok_or(RepositoryError::VersionNotFound(version))?;
        }

        debug!(table = %self.name, id = %id, version, "corrected mutable fields");
        Ok(Self::materialize_at(&stored, version))
    }

    /// Read the latest state of a record across all scopes.
    pub fn read(&self, id: &RecordId) -> Result<Record> {
        let entry = self.lookup(id)?;
        let stored = entry.read();
        trace!(table = %self.name, %id, "read record");
        Ok(Self::materialize(&stored))
    }

    /// Read versioned and versioned-mutable fields as of `version`;
    /// non-versioned fields are always the latest.
    pub fn read_version(&self, id: &RecordId, version: u64) -> Result<Record> {
        let entry = self.lookup(id)?;
        let stored = entry.read();

        if version == 0 || version > stored.fields.max_version() {
            return Err(RepositoryError::VersionNotFound(version));
        }

        trace!(table = %self.name, %id, version, "read record at version");
        Ok(Self::materialize_at(&stored, version))
    }

    /// Read a restricted field set. Names absent from the record are
    /// simply absent from the result; names unknown to schema fail with
    /// `UnknownFieldType`.
    pub fn read_fields(
        &self,
        id: &RecordId,
        version: Option<u64>,
        names: &[QName],
    ) -> Result<Record> {
        for name in names {
            self.type_manager.get_field_type_by_name(name)?;
        }

        let mut record = match version {
            None => self.read(id)?,
            Some(v) => self.read_version(id, v)?,
        };

        let filtered = record
            .fields()
            .iter()
            .filter(|(name, _)| names.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        record.set_fields(filtered);
        Ok(record)
    }

    /// All stored ids sharing `master`'s master id, the master itself
    /// included when it holds data. Empty when none are stored.
    pub fn get_variants(&self, master: &RecordId) -> BTreeSet<RecordId> {
        self.variants
            .read()
            .get(master.master_id())
            .cloned()
            .unwrap_or_default()
    }

    fn lookup(&self, id: &RecordId) -> Result<Arc<RwLock<StoredRecord>>> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::RecordNotFound(id.clone()))
    }

    /// Split a draft's fields and deletion markers by the scope of their
    /// field types, validating names against schema and values against
    /// their value types.
    fn partition(&self, record: &Record) -> Result<BTreeMap<Scope, ScopeChanges>> {
        let mut changes: BTreeMap<Scope, ScopeChanges> = BTreeMap::new();

        for (name, value) in record.fields() {
            let field_type = self.type_manager.get_field_type_by_name(name)?;
            if !field_type.value_type().accepts(value) {
                return Err(RepositoryError::ValueTypeMismatch {
                    field: name.clone(),
                    expected: field_type.value_type().name(),
                    got: value.shape_name(),
                });
            }
            changes
                .entry(field_type.scope())
                .or_default()
                .0
                .insert(name.clone(), value.clone());
        }

        for name in record.fields_to_delete() {
            let field_type = self.type_manager.get_field_type_by_name(name)?;
            changes
                .entry(field_type.scope())
                .or_default()
                .1
                .push(name.clone());
        }

        Ok(changes)
    }

    fn check_mandatory(&self, record_type: &RecordType, record: &Record) -> Result<()> {
        for entry in record_type.entries().iter().filter(|e| e.mandatory) {
            let field_type = self.type_manager.get_field_type(entry.field_type)?;
            if !record.has_field(field_type.name()) {
                return Err(RepositoryError::MandatoryFieldMissing(field_type.name().clone()));
            }
        }
        Ok(())
    }

    /// A partial update may omit mandatory fields, but it may not delete
    /// them.
    fn check_mandatory_deletes(&self, record_type: &RecordType, record: &Record) -> Result<()> {
        for entry in record_type.entries().iter().filter(|e| e.mandatory) {
            let field_type = self.type_manager.get_field_type(entry.field_type)?;
            if record.fields_to_delete().contains(field_type.name()) {
                return Err(RepositoryError::MandatoryFieldMissing(field_type.name().clone()));
            }
        }
        Ok(())
    }

    fn materialize(stored: &StoredRecord) -> Record {
        let mut record = Record::with_id(stored.id.clone());
        record.set_record_type_version(
            stored.record_type.clone(),
            Self::reference_type_version(stored),
        );
        record.set_fields(stored.fields.latest());

        for scope in Scope::ALL {
            let version = stored.fields.scope_version(scope);
            if version > 0 {
                record.set_scope_version(scope, version);
            }
        }

        let max = stored.fields.max_version();
        record.set_record_version((max > 0).then_some(max));
        record
    }

    fn materialize_at(stored: &StoredRecord, version: u64) -> Record {
        let mut record = Record::with_id(stored.id.clone());
        record.set_record_type_version(
            stored.record_type.clone(),
            Self::reference_type_version(stored),
        );

        let (fields, effective) = stored.fields.as_of(version);
        record.set_fields(fields);

        let non_versioned = stored.fields.scope_version(Scope::NonVersioned);
        if non_versioned > 0 {
            record.set_scope_version(Scope::NonVersioned, non_versioned);
        }
        for (scope, v) in effective {
            record.set_scope_version(scope, v);
        }

        record.set_record_version(Some(version));
        record
    }

    fn reference_type_version(stored: &StoredRecord) -> u64 {
        *stored
            .type_versions
            .get(&Scope::NonVersioned)
            .expect("reference record type version is set at create")
    }
}
