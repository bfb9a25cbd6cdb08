//! # Vellum
//!
//! A typed, versioned record store: schema management, scoped field
//! versioning, variant identifiers, and inter-record links.
//!
//! ## Core Concepts
//!
//! - **Value types**: string-named, registry-resolved descriptors
//!   (`"STRING"`, `"LONG"`, `"LIST<STRING>"`, ...)
//! - **Schema**: field types and record types, versioned independently of
//!   record data
//! - **Records**: fields partitioned by scope, each scope with its own
//!   version counter and history
//! - **Variants**: record ids sharing a master id, distinguished by named
//!   dimensions
//! - **Links**: absolute or variant-relative references between records
//!
//! ## Example
//!
//! ```
//! use vellum::{QName, Repository, Scope};
//!
//! let repository = Repository::new();
//! let types = repository.type_manager();
//!
//! let title = types.create_field_type_by_name(
//!     "STRING",
//!     QName::new("book", "title"),
//!     Scope::Versioned,
//! )?;
//!
//! let mut book = types.new_record_type(QName::new("book", "Book"));
//! book.add_field_type_entry(title.id().unwrap(), true);
//! types.create_record_type(book)?;
//!
//! let table = repository.default_table();
//! let mut record = table.new_record();
//! record.set_record_type(QName::new("book", "Book"));
//! record.set_field(QName::new("book", "title"), "Lily, the definitive guide");
//! let record = table.create(&record)?;
//!
//! let read = table.read(record.id().unwrap())?;
//! assert_eq!(read.version(), Some(1));
//! # Ok::<(), vellum::RepositoryError>(())
//! ```

pub mod error;
pub mod ids;
pub mod links;
pub mod records;
pub mod schema;
pub mod store;
pub mod types;
pub mod values;

// Re-exports
pub use error::{RepositoryError, Result};
pub use ids::{IdGenerator, MasterId, RecordId};
pub use links::{DimensionPatch, Link};
pub use records::{Record, RecordTypeRef};
pub use schema::{FieldType, FieldTypeEntry, FieldTypeId, RecordType, RecordTypeId, TypeManager};
pub use store::{Repository, Table, DEFAULT_TABLE};
pub use types::{QName, Scope, Value};
pub use values::{ScalarDescriptor, ValueType, ValueTypeRegistry};
