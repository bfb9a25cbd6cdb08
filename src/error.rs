//! Error types for the repository.

use crate::ids::RecordId;
use crate::types::{QName, Scope};
use thiserror::Error;

/// Main error type for repository operations.
///
/// Callers are expected to branch on the variant, not on the message text:
/// `ConcurrentModification` is retryable after a fresh read, most of the
/// others indicate a caller bug or missing schema.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Unknown value type: {0}")]
    UnknownValueType(String),

    #[error("Malformed type name: {0}")]
    MalformedTypeName(String),

    #[error("Value type already registered: {0}")]
    DuplicateValueType(String),

    #[error("Field type already exists: {0}")]
    DuplicateFieldType(QName),

    #[error("Record type already exists: {0}")]
    DuplicateRecordType(QName),

    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("Record type not found: {0}")]
    RecordTypeNotFound(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Invalid id token: {0}")]
    InvalidIdToken(String),

    #[error("Invalid variant key: {0}")]
    InvalidVariantKey(String),

    #[error("Record already exists: {0}")]
    RecordExists(RecordId),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Record has no id")]
    MissingRecordId,

    #[error("Record has no record type")]
    MissingRecordType,

    #[error("Mandatory field missing: {0}")]
    MandatoryFieldMissing(QName),

    #[error("Value for field {field} does not match value type {expected} (got {got})")]
    ValueTypeMismatch {
        field: QName,
        expected: String,
        got: &'static str,
    },

    #[error("Field {field} does not have scope {expected:?}")]
    WrongScope { field: QName, expected: Scope },

    #[error("Version not found: {0}")]
    VersionNotFound(u64),

    #[error("Unresolvable link: {0}")]
    UnresolvableLink(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
