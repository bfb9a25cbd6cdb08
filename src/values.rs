//! Value types and the registry that resolves type names.
//!
//! Value types are addressed by string name ("STRING", "LONG",
//! "LIST<STRING>", ...) rather than a closed enum, so applications can
//! register additional scalar types without touching this crate. List
//! types are derived on demand by parsing the `LIST<...>` form, nesting
//! allowed.

use crate::error::{RepositoryError, Result};
use crate::types::Value;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A registered scalar value type: a name plus the runtime-shape check
/// applied to field values when a record is written.
pub struct ScalarDescriptor {
    name: String,
    check: Box<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl ScalarDescriptor {
    /// Build a descriptor for a scalar type.
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `value` has the runtime shape this type requires.
    pub fn accepts(&self, value: &Value) -> bool {
        (self.check)(value)
    }
}

impl fmt::Debug for ScalarDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScalarDescriptor({})", self.name)
    }
}

/// A resolved value type: a scalar descriptor or a list of some inner type.
///
/// Immutable once obtained from the registry.
#[derive(Clone)]
pub enum ValueType {
    Scalar(Arc<ScalarDescriptor>),
    List(Box<ValueType>),
}

impl ValueType {
    /// The canonical name, e.g. `STRING` or `LIST<LIST<STRING>>`.
    pub fn name(&self) -> String {
        match self {
            ValueType::Scalar(desc) => desc.name().to_string(),
            ValueType::List(inner) => format!("LIST<{}>", inner.name()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ValueType::List(_))
    }

    /// Whether `value` conforms to this type. Lists check the outer shape
    /// and every element.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::Scalar(desc) => desc.accepts(value),
            ValueType::List(inner) => match value {
                Value::List(items) => items.iter().all(|item| inner.accepts(item)),
                _ => false,
            },
        }
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({})", self.name())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for ValueType {}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// Characters that cannot appear in a scalar type name.
const FORBIDDEN_NAME_CHARS: [char; 3] = ['<', '>', ','];

/// Registry mapping type names to descriptors.
///
/// Seeded with the built-in types at construction; additional scalar
/// types are added by registration, never by modifying an enumeration.
pub struct ValueTypeRegistry {
    scalars: RwLock<HashMap<String, Arc<ScalarDescriptor>>>,
}

impl ValueTypeRegistry {
    /// An empty registry. Most callers want [`ValueTypeRegistry::with_builtins`].
    pub fn new() -> Self {
        Self {
            scalars: RwLock::new(HashMap::new()),
        }
    }

    /// A registry seeded with the built-in scalar types: STRING, INTEGER,
    /// LONG, DOUBLE, BOOLEAN, DATE, DATETIME, BLOB, LINK.
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        let builtins: Vec<ScalarDescriptor> = vec![
            ScalarDescriptor::new("STRING", |v| matches!(v, Value::String(_))),
            ScalarDescriptor::new("INTEGER", |v| matches!(v, Value::Integer(_))),
            ScalarDescriptor::new("LONG", |v| matches!(v, Value::Long(_))),
            ScalarDescriptor::new("DOUBLE", |v| matches!(v, Value::Double(_))),
            ScalarDescriptor::new("BOOLEAN", |v| matches!(v, Value::Boolean(_))),
            ScalarDescriptor::new("DATE", |v| matches!(v, Value::Date(_))),
            ScalarDescriptor::new("DATETIME", |v| matches!(v, Value::DateTime(_))),
            ScalarDescriptor::new("BLOB", |v| matches!(v, Value::Blob(_))),
            ScalarDescriptor::new("LINK", |v| matches!(v, Value::Link(_))),
        ];

        for descriptor in builtins {
            registry
                .register(descriptor)
                .expect("builtin registration cannot collide");
        }

        registry
    }

    /// Register a new scalar type.
    pub fn register(&self, descriptor: ScalarDescriptor) -> Result<()> {
        let name = descriptor.name().to_string();
        if name.is_empty() || name.contains(&FORBIDDEN_NAME_CHARS[..]) {
            return Err(RepositoryError::MalformedTypeName(name));
        }

        let mut scalars = self.scalars.write();
        if scalars.contains_key(&name) {
            return Err(RepositoryError::DuplicateValueType(name));
        }
        scalars.insert(name, Arc::new(descriptor));
        Ok(())
    }

    /// Resolve a type name, parsing `LIST<...>` forms recursively.
    pub fn get(&self, name: &str) -> Result<ValueType> {
        if let Some(rest) = name.strip_prefix("LIST<") {
            let inner = rest
                .strip_suffix('>')
                .filter(|inner| !inner.is_empty())
                .ok_or_else(|| RepositoryError::MalformedTypeName(name.to_string()))?;
            let inner_type = self
                .get(inner)
                // A parse failure of the inner name reports the full name.
                .map_err(|err| match err {
                    RepositoryError::MalformedTypeName(_) => {
                        RepositoryError::MalformedTypeName(name.to_string())
                    }
                    other => other,
                })?;
            return Ok(ValueType::List(Box::new(inner_type)));
        }

        if name.is_empty() || name.contains(&FORBIDDEN_NAME_CHARS[..]) {
            return Err(RepositoryError::MalformedTypeName(name.to_string()));
        }

        self.scalars
            .read()
            .get(name)
            .map(|desc| ValueType::Scalar(Arc::clone(desc)))
            .ok_or_else(|| RepositoryError::UnknownValueType(name.to_string()))
    }
}

impl Default for ValueTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ValueTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.scalars.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("ValueTypeRegistry")
            .field("scalars", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;

    #[test]
    fn test_get_builtin_scalar() {
        let registry = ValueTypeRegistry::with_builtins();
        let string_type = registry.get("STRING").unwrap();

        assert_eq!(string_type.name(), "STRING");
        assert!(!string_type.is_list());
        assert!(string_type.accepts(&Value::String("x".into())));
        assert!(!string_type.accepts(&Value::Long(1)));
    }

    #[test]
    fn test_get_unknown_type() {
        let registry = ValueTypeRegistry::with_builtins();
        let result = registry.get("GEOMETRY");
        assert!(matches!(result, Err(RepositoryError::UnknownValueType(_))));
    }

    #[test]
    fn test_parse_list_type() {
        let registry = ValueTypeRegistry::with_builtins();
        let list_type = registry.get("LIST<STRING>").unwrap();

        assert_eq!(list_type.name(), "LIST<STRING>");
        assert!(list_type.is_list());
        assert!(list_type.accepts(&Value::List(vec![Value::String("a".into())])));
        assert!(!list_type.accepts(&Value::List(vec![Value::Long(1)])));
        assert!(!list_type.accepts(&Value::String("a".into())));
    }

    #[test]
    fn test_parse_nested_list_type() {
        let registry = ValueTypeRegistry::with_builtins();
        let nested = registry.get("LIST<LIST<LONG>>").unwrap();

        assert_eq!(nested.name(), "LIST<LIST<LONG>>");
        assert!(nested.accepts(&Value::List(vec![Value::List(vec![Value::Long(1)])])));
        assert!(!nested.accepts(&Value::List(vec![Value::Long(1)])));
    }

    #[test]
    fn test_malformed_type_names() {
        let registry = ValueTypeRegistry::with_builtins();

        for name in ["LIST<", "LIST<>", "LIST<STRING>X", "", "LIST<STRING"] {
            let result = registry.get(name);
            assert!(
                matches!(result, Err(RepositoryError::MalformedTypeName(_))),
                "expected MalformedTypeName for {name:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_unknown_inner_type_is_unknown_not_malformed() {
        let registry = ValueTypeRegistry::with_builtins();
        let result = registry.get("LIST<GEOMETRY>");
        assert!(matches!(result, Err(RepositoryError::UnknownValueType(_))));
    }

    #[test]
    fn test_register_custom_scalar() {
        let registry = ValueTypeRegistry::with_builtins();
        registry
            .register(ScalarDescriptor::new("URI", |v| {
                matches!(v, Value::String(s) if s.contains("://"))
            }))
            .unwrap();

        let uri = registry.get("URI").unwrap();
        assert!(uri.accepts(&Value::String("https://example.org".into())));
        assert!(!uri.accepts(&Value::String("not a uri".into())));

        // List form of the custom scalar works too.
        let uris = registry.get("LIST<URI>").unwrap();
        assert_eq!(uris.name(), "LIST<URI>");
    }

    #[test]
    fn test_register_duplicate_scalar() {
        let registry = ValueTypeRegistry::with_builtins();
        let result = registry.register(ScalarDescriptor::new("STRING", |_| true));
        assert!(matches!(result, Err(RepositoryError::DuplicateValueType(_))));
    }

    #[test]
    fn test_value_type_serializes_as_name() {
        let registry = ValueTypeRegistry::with_builtins();
        let list_type = registry.get("LIST<STRING>").unwrap();
        let json = serde_json::to_string(&list_type).unwrap();
        assert_eq!(json, "\"LIST<STRING>\"");
    }
}
