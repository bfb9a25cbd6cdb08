//! Record identifiers and the generator that produces them.
//!
//! A record id is a master component plus an ordered set of variant
//! dimensions. Variant ids sharing a master form a variant group; an
//! empty dimension set denotes the master record itself.

use crate::error::{RepositoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Characters that cannot appear in user tokens, dimension names, or
/// dimension values: they delimit the canonical string form.
const RESERVED_CHARS: [char; 4] = ['.', ',', '=', ':'];

/// Master component of a record id: a generated token or a caller-supplied
/// one.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MasterId {
    Uuid(Uuid),
    User(String),
}

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterId::Uuid(uuid) => write!(f, "UUID.{uuid}"),
            MasterId::User(token) => write!(f, "USER.{token}"),
        }
    }
}

impl fmt::Debug for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterId({self})")
    }
}

/// Identifier of a record: master id plus variant dimensions.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    master: MasterId,
    dimensions: BTreeMap<String, String>,
}

impl RecordId {
    pub fn master_id(&self) -> &MasterId {
        &self.master
    }

    /// The variant dimensions, empty for a master record.
    pub fn dimensions(&self) -> &BTreeMap<String, String> {
        &self.dimensions
    }

    pub fn is_variant(&self) -> bool {
        !self.dimensions.is_empty()
    }

    /// The id with all variant dimensions stripped.
    pub fn master(&self) -> RecordId {
        RecordId {
            master: self.master.clone(),
            dimensions: BTreeMap::new(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.master)?;
        if !self.dimensions.is_empty() {
            write!(f, ".")?;
            for (i, (key, value)) in self.dimensions.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({self})")
    }
}

impl FromStr for RecordId {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        IdGenerator::new().from_string(s)
    }
}

/// Produces master and variant record identifiers.
///
/// Generated master ids are backed by UUID v4: 122 random bits, so the
/// collision probability stays below 2^-61 even after 2^30 generated ids.
#[derive(Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// A fresh, globally unique master id.
    pub fn new_record_id(&self) -> RecordId {
        RecordId {
            master: MasterId::Uuid(Uuid::new_v4()),
            dimensions: BTreeMap::new(),
        }
    }

    /// A deterministic master id from a caller-supplied token. The same
    /// token always yields the same id.
    pub fn new_record_id_from_token(&self, token: &str) -> Result<RecordId> {
        validate_token(token)?;
        Ok(RecordId {
            master: MasterId::User(token.to_string()),
            dimensions: BTreeMap::new(),
        })
    }

    /// A variant id on `master`'s master component. Dimension names and
    /// values must be non-empty and free of reserved characters.
    pub fn new_variant_id(
        &self,
        master: &RecordId,
        props: impl IntoIterator<Item = (String, String)>,
    ) -> Result<RecordId> {
        let mut dimensions = BTreeMap::new();
        for (key, value) in props {
            validate_dimension(&key, &value)?;
            dimensions.insert(key, value);
        }

        Ok(RecordId {
            master: master.master.clone(),
            dimensions,
        })
    }

    /// Parse the canonical string form produced by [`RecordId`]'s
    /// `Display`: `UUID.<uuid>` or `USER.<token>`, with variants appending
    /// `.name=value,name=value` in dimension-name order.
    pub fn from_string(&self, s: &str) -> Result<RecordId> {
        let mut parts = s.splitn(3, '.');
        let scheme = parts.next().unwrap_or_default();
        let token = parts
            .next()
            .ok_or_else(|| RepositoryError::InvalidIdToken(s.to_string()))?;

        let master = match scheme {
            "UUID" => {
                let uuid = Uuid::parse_str(token)
                    .map_err(|_| RepositoryError::InvalidIdToken(s.to_string()))?;
                MasterId::Uuid(uuid)
            }
            "USER" => {
                validate_token(token)?;
                MasterId::User(token.to_string())
            }
            _ => return Err(RepositoryError::InvalidIdToken(s.to_string())),
        };

        let mut dimensions = BTreeMap::new();
        if let Some(props) = parts.next() {
            for pair in props.split(',') {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| RepositoryError::InvalidIdToken(s.to_string()))?;
                validate_dimension(key, value)?;
                dimensions.insert(key.to_string(), value.to_string());
            }
        }

        Ok(RecordId {
            master,
            dimensions,
        })
    }
}

fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() || token.contains(&RESERVED_CHARS[..]) {
        return Err(RepositoryError::InvalidIdToken(token.to_string()));
    }
    Ok(())
}

fn validate_dimension(key: &str, value: &str) -> Result<()> {
    if key.is_empty() || key.contains(&RESERVED_CHARS[..]) {
        return Err(RepositoryError::InvalidVariantKey(key.to_string()));
    }
    if value.is_empty() || value.contains(&RESERVED_CHARS[..]) {
        return Err(RepositoryError::InvalidVariantKey(format!("{key}={value}")));
    }
    Ok(())
}
