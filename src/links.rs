//! Link values and resolution against variant dimensions.
//!
//! A link field either names its target absolutely or describes it as a
//! delta against the variant dimensions of the record holding the field.
//! Resolution is a pure function over the two dimension maps: delta
//! entries win, a `Remove` entry strips a dimension, dimensions absent
//! from the delta carry over from the context.

use crate::error::{RepositoryError, Result};
use crate::ids::{IdGenerator, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One dimension of a relative link's delta.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionPatch {
    /// Set the dimension to this value, overriding the context.
    Set(String),
    /// Strip the dimension from the context.
    Remove,
}

/// A reference to another record, stored as a field value of value type
/// LINK.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    Absolute(RecordId),
    Relative(BTreeMap<String, DimensionPatch>),
}

impl Link {
    /// An absolute link to `id`.
    pub fn to(id: RecordId) -> Self {
        Link::Absolute(id)
    }

    /// A relative link described by a dimension delta.
    pub fn relative(delta: impl IntoIterator<Item = (String, DimensionPatch)>) -> Self {
        Link::Relative(delta.into_iter().collect())
    }

    /// Resolve this link to a concrete record id.
    ///
    /// `context` is the id of the record holding the link field. Absolute
    /// links return their stored id unchanged; relative links overlay the
    /// delta onto the context's dimensions, on the context's master id.
    pub fn resolve(&self, context: &RecordId, ids: &IdGenerator) -> Result<RecordId> {
        match self {
            Link::Absolute(id) => Ok(id.clone()),
            Link::Relative(delta) => {
                let mut dimensions = context.dimensions().clone();
                for (name, patch) in delta {
                    match patch {
                        DimensionPatch::Set(value) => {
                            dimensions.insert(name.clone(), value.clone());
                        }
                        DimensionPatch::Remove => {
                            dimensions.remove(name);
                        }
                    }
                }

                ids.new_variant_id(&context.master(), dimensions)
                    .map_err(|err| RepositoryError::UnresolvableLink(err.to_string()))
            }
        }
    }
}

impl From<RecordId> for Link {
    fn from(id: RecordId) -> Self {
        Link::Absolute(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(ids: &IdGenerator, master: &RecordId, dims: &[(&str, &str)]) -> RecordId {
        ids.new_variant_id(
            master,
            dims.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_absolute_link_returns_target_unchanged() {
        let ids = IdGenerator::new();
        let target = ids.new_record_id();
        let context = ids.new_record_id();

        let link = Link::to(target.clone());
        assert_eq!(link.resolve(&context, &ids).unwrap(), target);
    }

    #[test]
    fn test_relative_link_overrides_dimension() {
        let ids = IdGenerator::new();
        let master = ids.new_record_id();
        let context = variant(&ids, &master, &[("language", "en"), ("branch", "dev")]);

        let link = Link::relative([(
            "language".to_string(),
            DimensionPatch::Set("nl".to_string()),
        )]);

        let resolved = link.resolve(&context, &ids).unwrap();
        assert_eq!(resolved, variant(&ids, &master, &[("language", "nl"), ("branch", "dev")]));
    }

    #[test]
    fn test_relative_link_removes_dimension() {
        let ids = IdGenerator::new();
        let master = ids.new_record_id();
        let context = variant(&ids, &master, &[("language", "en")]);

        let link = Link::relative([("language".to_string(), DimensionPatch::Remove)]);

        let resolved = link.resolve(&context, &ids).unwrap();
        assert_eq!(resolved, master);
        assert!(!resolved.is_variant());
    }

    #[test]
    fn test_empty_delta_resolves_to_context() {
        let ids = IdGenerator::new();
        let master = ids.new_record_id();
        let context = variant(&ids, &master, &[("language", "en")]);

        let link = Link::relative([]);
        assert_eq!(link.resolve(&context, &ids).unwrap(), context);
    }

    #[test]
    fn test_invalid_delta_is_unresolvable() {
        let ids = IdGenerator::new();
        let context = ids.new_record_id();

        let link = Link::relative([(
            "language".to_string(),
            DimensionPatch::Set("e,n".to_string()),
        )]);

        let result = link.resolve(&context, &ids);
        assert!(matches!(result, Err(RepositoryError::UnresolvableLink(_))));
    }
}
