//! Snapshot store for ACL rules and credential records
//!
//! Each kind of data lives behind its own `Arc<Snapshot<_>>`. Readers clone
//! the `Arc` and work on a frozen snapshot; a refresh builds a complete new
//! snapshot first and only then swaps the pointer. A reader therefore sees
//! either the old rows or the new rows, never a mix.

use crate::rule::{AclRule, CredentialRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Immutable, generation-numbered view of one kind of data
#[derive(Debug)]
pub struct Snapshot<T> {
    generation: u64,
    loaded_at: Option<DateTime<Utc>>,
    data: T,
}

impl<T> Snapshot<T> {
    fn initial(data: T) -> Self {
        Self {
            generation: 0,
            loaded_at: None,
            data,
        }
    }

    /// 0 until the first successful refresh, then incremented by each one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_initialized(&self) -> bool {
        self.generation > 0
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn data(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// Ordered ACL rules; order decides which rule is reported first
pub type RuleSnapshot = Snapshot<Vec<AclRule>>;

/// Credential records keyed by exact username
pub type CredentialSnapshot = Snapshot<HashMap<String, CredentialRecord>>;

/// Holder of the current rule and credential snapshots
#[derive(Debug)]
pub struct RuleStore {
    rules: RwLock<Arc<RuleSnapshot>>,
    credentials: RwLock<Arc<CredentialSnapshot>>,
}

impl RuleStore {
    /// Empty store: both snapshots are generation 0 with no entries
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::new(Snapshot::initial(Vec::new()))),
            credentials: RwLock::new(Arc::new(Snapshot::initial(HashMap::new()))),
        }
    }

    pub fn current_rules(&self) -> Arc<RuleSnapshot> {
        Arc::clone(&self.rules.read())
    }

    pub fn current_credentials(&self) -> Arc<CredentialSnapshot> {
        Arc::clone(&self.credentials.read())
    }

    /// Publish a new rule list, replacing the previous one wholesale.
    ///
    /// Returns the generation of the installed snapshot.
    pub fn replace_rules(&self, rules: Vec<AclRule>) -> u64 {
        Self::publish(&self.rules, rules)
    }

    /// Publish a new credential map, replacing the previous one wholesale.
    ///
    /// When a username appears more than once the first record is kept.
    /// Returns the generation of the installed snapshot.
    pub fn replace_credentials(&self, records: Vec<CredentialRecord>) -> u64 {
        let mut map = HashMap::with_capacity(records.len());
        for record in records {
            match map.entry(record.username.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(_) => {
                    warn!("Ignoring duplicate credential row for user {}", record.username);
                }
            }
        }
        Self::publish(&self.credentials, map)
    }

    fn publish<T>(slot: &RwLock<Arc<Snapshot<T>>>, data: T) -> u64 {
        let loaded_at = Some(Utc::now());
        let mut current = slot.write();
        let snapshot = Snapshot {
            generation: current.generation + 1,
            loaded_at,
            data,
        };
        let generation = snapshot.generation;
        let previous = std::mem::replace(&mut *current, Arc::new(snapshot));
        drop(current);

        // the last reference to a large snapshot is freed outside the lock
        drop(previous);
        generation
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::CaseSensitivity;
    use crate::rule::AclRow;

    fn rule(user: &str) -> AclRule {
        AclRule::compile(&AclRow::new(user, "TOPIC", "*", "READ"), CaseSensitivity::Sensitive)
            .unwrap()
    }

    #[test]
    fn test_store_starts_empty_and_uninitialized() {
        let store = RuleStore::new();
        let rules = store.current_rules();
        assert!(rules.is_empty());
        assert_eq!(rules.generation(), 0);
        assert!(!rules.is_initialized());
        assert!(rules.loaded_at().is_none());
        assert!(store.current_credentials().is_empty());
    }

    #[test]
    fn test_replace_bumps_generation() {
        let store = RuleStore::new();
        assert_eq!(store.replace_rules(vec![rule("alice")]), 1);
        assert_eq!(store.replace_rules(vec![rule("bob"), rule("carol")]), 2);

        let rules = store.current_rules();
        assert_eq!(rules.generation(), 2);
        assert_eq!(rules.len(), 2);
        assert!(rules.loaded_at().is_some());
    }

    #[test]
    fn test_replace_does_not_merge() {
        let store = RuleStore::new();
        store.replace_rules(vec![rule("alice"), rule("bob")]);
        store.replace_rules(vec![rule("carol")]);

        let rules = store.current_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].user_pattern.as_str(), "carol");
    }

    #[test]
    fn test_held_snapshot_is_unaffected_by_replace() {
        let store = RuleStore::new();
        store.replace_rules(vec![rule("alice")]);
        let held = store.current_rules();

        store.replace_rules(Vec::new());

        assert_eq!(held.generation(), 1);
        assert_eq!(held.len(), 1);
        assert!(store.current_rules().is_empty());
    }

    #[test]
    fn test_rule_and_credential_generations_are_independent() {
        let store = RuleStore::new();
        store.replace_rules(Vec::new());
        store.replace_rules(Vec::new());
        let generation = store.replace_credentials(vec![CredentialRecord::new("alice", "pw")]);

        assert_eq!(generation, 1);
        assert_eq!(store.current_rules().generation(), 2);
        assert!(store.current_credentials().contains_key("alice"));
    }

    #[test]
    fn test_duplicate_username_keeps_first_record() {
        let store = RuleStore::new();
        store.replace_credentials(vec![
            CredentialRecord::new("alice", "first"),
            CredentialRecord::new("bob", "bob-pw"),
            CredentialRecord::new("alice", "second"),
        ]);

        let credentials = store.current_credentials();
        assert_eq!(credentials.len(), 2);
        assert!(credentials["alice"].verify(b"first"));
        assert!(!credentials["alice"].verify(b"second"));
    }

    #[test]
    fn test_replace_releases_previous_snapshot() {
        let store = RuleStore::new();
        store.replace_rules(vec![rule("alice")]);
        let held = store.current_rules();
        let weak = Arc::downgrade(&held);
        drop(held);

        store.replace_rules(vec![rule("bob")]);

        // nothing else held the old snapshot, so it is gone once replaced
        assert!(weak.upgrade().is_none());
        assert!(store.rules.try_write().is_some());
        assert_eq!(store.current_rules()[0].user_pattern.as_str(), "bob");
    }
}
