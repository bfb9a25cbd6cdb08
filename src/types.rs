//! Core types shared across the repository.

use crate::links::Link;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualified name: a namespace plus a local name.
///
/// Field types and record types are both addressed by qualified name so
/// that independent applications can share one repository without
/// colliding on plain names. Serializes as the `{namespace}name` string
/// form, which also keeps it usable as a map key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: String,
    name: String,
}

impl Serialize for QName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.strip_prefix('{')
            .and_then(|rest| rest.split_once('}'))
            .map(|(namespace, name)| QName::new(namespace, name))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid qualified name: {s}")))
    }
}

impl QName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({{{}}}{})", self.namespace, self.name)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

/// Storage scope of a field: governs how the field's value is kept over
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// No history; reading any version returns the current value.
    NonVersioned,
    /// Append-only history, one entry per version.
    Versioned,
    /// Append-only history that additionally permits in-place correction
    /// of a past version's value.
    VersionedMutable,
}

impl Scope {
    /// All scopes, in partition order.
    pub const ALL: [Scope; 3] = [Scope::NonVersioned, Scope::Versioned, Scope::VersionedMutable];

    /// Whether this scope keeps a version log.
    pub fn is_versioned(self) -> bool {
        !matches!(self, Scope::NonVersioned)
    }
}

/// Runtime value of a record field.
///
/// The shape must conform to the field type's registered value type;
/// conformance is checked when a record is written, not when the value is
/// constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Blob(Vec<u8>),
    Link(Link),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the runtime shape, used in error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Value::String(_) => "STRING",
            Value::Integer(_) => "INTEGER",
            Value::Long(_) => "LONG",
            Value::Double(_) => "DOUBLE",
            Value::Boolean(_) => "BOOLEAN",
            Value::Date(_) => "DATE",
            Value::DateTime(_) => "DATETIME",
            Value::Blob(_) => "BLOB",
            Value::Link(_) => "LINK",
            Value::List(_) => "LIST",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            Value::Link(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<Link> for Value {
    fn from(l: Link) -> Self {
        Value::Link(l)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Value::List(items.into_iter().map(Value::from).collect())
    }
}
