//! Scope-partitioned field storage with per-scope version counters.
//!
//! Each stored record keeps three parallel field partitions, one per
//! [`Scope`]. The non-versioned partition holds current values only; the
//! two versioned partitions keep an append-only log of full snapshots
//! indexed by that scope's own version number. The versioned-mutable
//! partition additionally permits in-place correction of a past snapshot.

use crate::types::{QName, Scope, Value};
use std::collections::BTreeMap;

/// Current-values-only partition (NON_VERSIONED scope).
#[derive(Clone, Debug, Default)]
pub(crate) struct CurrentFields {
    version: u64,
    fields: BTreeMap<QName, Value>,
}

impl CurrentFields {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fields(&self) -> &BTreeMap<QName, Value> {
        &self.fields
    }

    /// Apply sets and deletes; bumps the version only when something
    /// actually changed.
    pub fn apply(&mut self, sets: &BTreeMap<QName, Value>, deletes: &[QName]) -> bool {
        if !is_change(&self.fields, sets, deletes) {
            return false;
        }
        apply_changes(&mut self.fields, sets, deletes);
        self.version += 1;
        true
    }
}

/// Append-only snapshot log (VERSIONED and VERSIONED_MUTABLE scopes).
#[derive(Clone, Debug, Default)]
pub(crate) struct ScopeLog {
    version: u64,
    log: BTreeMap<u64, BTreeMap<QName, Value>>,
}

impl ScopeLog {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The latest snapshot; empty before the first write.
    pub fn current(&self) -> BTreeMap<QName, Value> {
        self.log
            .get(&self.version)
            .cloned()
            .unwrap_or_default()
    }

    /// Apply sets and deletes as a new version; no-op (and no version
    /// bump) when nothing changed.
    pub fn apply(&mut self, sets: &BTreeMap<QName, Value>, deletes: &[QName]) -> bool {
        let current = self.current();
        if !is_change(&current, sets, deletes) {
            return false;
        }
        let mut next = current;
        apply_changes(&mut next, sets, deletes);
        self.version += 1;
        self.log.insert(self.version, next);
        true
    }

    /// The snapshot effective at `version`: the greatest logged entry not
    /// newer than it. None when nothing was logged yet at that version.
    pub fn as_of(&self, version: u64) -> Option<(u64, &BTreeMap<QName, Value>)> {
        self.log
            .range(..=version)
            .next_back()
            .map(|(v, fields)| (*v, fields))
    }

    /// Correct the snapshot effective at `version` in place, without
    /// creating a new version entry. Later snapshots are untouched.
    /// Returns the corrected version, None when no snapshot is effective
    /// at `version`.
    pub fn correct(&mut self, version: u64, sets: &BTreeMap<QName, Value>, deletes: &[QName]) -> Option<u64> {
        let effective = self.as_of(version).map(|(v, _)| v)?;
        let fields = self.log.get_mut(&effective).expect("effective version is logged");
        apply_changes(fields, sets, deletes);
        Some(effective)
    }
}

fn is_change(
    current: &BTreeMap<QName, Value>,
    sets: &BTreeMap<QName, Value>,
    deletes: &[QName],
) -> bool {
    sets.iter().any(|(name, value)| current.get(name) != Some(value))
        || deletes.iter().any(|name| current.contains_key(name))
}

fn apply_changes(
    fields: &mut BTreeMap<QName, Value>,
    sets: &BTreeMap<QName, Value>,
    deletes: &[QName],
) {
    for (name, value) in sets {
        fields.insert(name.clone(), value.clone());
    }
    for name in deletes {
        fields.remove(name);
    }
}

/// The three field partitions of one stored record.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScopedFields {
    pub non_versioned: CurrentFields,
    pub versioned: ScopeLog,
    pub versioned_mutable: ScopeLog,
}

impl ScopedFields {
    pub fn apply(&mut self, scope: Scope, sets: &BTreeMap<QName, Value>, deletes: &[QName]) -> bool {
        match scope {
            Scope::NonVersioned => self.non_versioned.apply(sets, deletes),
            Scope::Versioned => self.versioned.apply(sets, deletes),
            Scope::VersionedMutable => self.versioned_mutable.apply(sets, deletes),
        }
    }

    /// Whether applying sets and deletes to `scope` would change anything.
    /// Used for the optimistic-concurrency check before mutating.
    pub fn would_change(&self, scope: Scope, sets: &BTreeMap<QName, Value>, deletes: &[QName]) -> bool {
        match scope {
            Scope::NonVersioned => is_change(self.non_versioned.fields(), sets, deletes),
            Scope::Versioned => is_change(&self.versioned.current(), sets, deletes),
            Scope::VersionedMutable => is_change(&self.versioned_mutable.current(), sets, deletes),
        }
    }

    pub fn scope_version(&self, scope: Scope) -> u64 {
        match scope {
            Scope::NonVersioned => self.non_versioned.version(),
            Scope::Versioned => self.versioned.version(),
            Scope::VersionedMutable => self.versioned_mutable.version(),
        }
    }

    /// The record version: the highest version across the two versioned
    /// scopes, 0 when neither has fields.
    pub fn max_version(&self) -> u64 {
        self.versioned.version().max(self.versioned_mutable.version())
    }

    /// All fields at their latest versions, merged across scopes.
    pub fn latest(&self) -> BTreeMap<QName, Value> {
        let mut merged = self.non_versioned.fields().clone();
        merged.extend(self.versioned.current());
        merged.extend(self.versioned_mutable.current());
        merged
    }

    /// Versioned fields as of `version`, non-versioned fields always at
    /// their latest. The second element of each pair is the effective
    /// version of that scope's snapshot.
    pub fn as_of(&self, version: u64) -> (BTreeMap<QName, Value>, Vec<(Scope, u64)>) {
        let mut merged = self.non_versioned.fields().clone();
        let mut effective = Vec::new();

        for (scope, log) in [
            (Scope::Versioned, &self.versioned),
            (Scope::VersionedMutable, &self.versioned_mutable),
        ] {
            if let Some((v, fields)) = log.as_of(version) {
                merged.extend(fields.clone());
                effective.push((scope, v));
            }
        }

        (merged, effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(name: &str) -> QName {
        QName::new("test", name)
    }

    fn sets(pairs: &[(&str, &str)]) -> BTreeMap<QName, Value> {
        pairs
            .iter()
            .map(|(k, v)| (qn(k), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_scope_log_versions_accumulate() {
        let mut log = ScopeLog::default();

        assert!(log.apply(&sets(&[("title", "a")]), &[]));
        assert!(log.apply(&sets(&[("pages", "912")]), &[]));

        assert_eq!(log.version(), 2);
        assert_eq!(log.as_of(1).unwrap().1.len(), 1);
        assert_eq!(log.as_of(2).unwrap().1.len(), 2);
        // Reading past the head clamps to the latest snapshot.
        assert_eq!(log.as_of(9).unwrap().0, 2);
    }

    #[test]
    fn test_scope_log_noop_does_not_bump() {
        let mut log = ScopeLog::default();
        log.apply(&sets(&[("title", "a")]), &[]);

        assert!(!log.apply(&sets(&[("title", "a")]), &[]));
        assert_eq!(log.version(), 1);

        // Deleting a field that is not there is a no-op too.
        assert!(!log.apply(&BTreeMap::new(), &[qn("missing")]));
        assert_eq!(log.version(), 1);
    }

    #[test]
    fn test_scope_log_delete_creates_version() {
        let mut log = ScopeLog::default();
        log.apply(&sets(&[("title", "a")]), &[]);
        assert!(log.apply(&BTreeMap::new(), &[qn("title")]));

        assert_eq!(log.version(), 2);
        assert!(log.current().is_empty());
        // History keeps the deleted value.
        assert_eq!(log.as_of(1).unwrap().1.len(), 1);
    }

    #[test]
    fn test_scope_log_correct_in_place() {
        let mut log = ScopeLog::default();
        log.apply(&sets(&[("status", "draft")]), &[]);
        log.apply(&sets(&[("status", "reviewed")]), &[]);

        let corrected = log.correct(1, &sets(&[("status", "rejected")]), &[]);
        assert_eq!(corrected, Some(1));
        assert_eq!(log.version(), 2);

        assert_eq!(
            log.as_of(1).unwrap().1.get(&qn("status")),
            Some(&Value::String("rejected".into()))
        );
        // Later snapshot untouched.
        assert_eq!(
            log.as_of(2).unwrap().1.get(&qn("status")),
            Some(&Value::String("reviewed".into()))
        );
    }

    #[test]
    fn test_correct_before_first_snapshot() {
        let mut log = ScopeLog::default();
        assert_eq!(log.correct(1, &sets(&[("x", "y")]), &[]), None);
    }

    #[test]
    fn test_merged_reads_prefer_scope_partition() {
        let mut fields = ScopedFields::default();
        fields.apply(Scope::NonVersioned, &sets(&[("manager", "M")]), &[]);
        fields.apply(Scope::Versioned, &sets(&[("title", "a")]), &[]);
        fields.apply(Scope::Versioned, &sets(&[("title", "b")]), &[]);

        let latest = fields.latest();
        assert_eq!(latest.get(&qn("title")), Some(&Value::String("b".into())));
        assert_eq!(latest.get(&qn("manager")), Some(&Value::String("M".into())));

        // Non-versioned values read latest even for historical versions.
        let (at_v1, effective) = fields.as_of(1);
        assert_eq!(at_v1.get(&qn("title")), Some(&Value::String("a".into())));
        assert_eq!(at_v1.get(&qn("manager")), Some(&Value::String("M".into())));
        assert_eq!(effective, vec![(Scope::Versioned, 1)]);
    }
}
