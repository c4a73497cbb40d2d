//! Draft tracker
//!
//! In-memory map of fields currently being edited but not yet committed.
//! Process-scoped and entirely volatile: lost on restart, re-seeded from the
//! value resolver on mount. A field is dirty iff its current value differs
//! from the resolved value snapshotted when editing started.

use chrono::Utc;
use coachbook_common::model::{DraftEntry, FieldKey};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Cloneable handle to the session's draft map
#[derive(Clone, Default)]
pub struct DraftTracker {
    entries: Arc<Mutex<HashMap<FieldKey, DraftEntry>>>,
}

impl DraftTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit. Creates or replaces the entry for `field_key`; the
    /// entry is dirty iff `new_value != original_value`. A clean entry is
    /// kept (the field is still "being edited"), just not dirty.
    pub fn track_change(
        &self,
        field_key: &FieldKey,
        new_value: impl Into<String>,
        original_value: impl Into<String>,
    ) {
        let current_value = new_value.into();
        let original_value = original_value.into();
        let dirty = current_value != original_value;
        trace!(%field_key, dirty, "Tracking draft change");

        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            field_key.clone(),
            DraftEntry {
                field_key: field_key.clone(),
                current_value,
                original_value,
                dirty,
                last_changed_at: Utc::now(),
            },
        );
    }

    /// Drop the entry entirely (after a confirmed commit or explicit discard)
    pub fn clear_change(&self, field_key: &FieldKey) {
        self.entries.lock().unwrap().remove(field_key);
    }

    /// Whether an uncommitted edit exists for `field_key`
    pub fn is_dirty(&self, field_key: &FieldKey) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(field_key)
            .map(|e| e.dirty)
            .unwrap_or(false)
    }

    /// Snapshot of the entry for `field_key`, if any
    pub fn get(&self, field_key: &FieldKey) -> Option<DraftEntry> {
        self.entries.lock().unwrap().get(field_key).cloned()
    }

    /// Dirty value for `field_key`, if an uncommitted edit exists
    pub fn dirty_value(&self, field_key: &FieldKey) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(field_key)
            .filter(|e| e.dirty)
            .map(|e| e.current_value.clone())
    }

    /// All field keys with uncommitted edits
    pub fn dirty_keys(&self) -> HashSet<FieldKey> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.dirty)
            .map(|e| e.field_key.clone())
            .collect()
    }

    /// Number of tracked entries, dirty or not
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_iff_value_differs_from_original() {
        let drafts = DraftTracker::new();
        let key = FieldKey::new("foundation", "q1");

        drafts.track_change(&key, "edited", "original");
        assert!(drafts.is_dirty(&key));

        // Typing back the original value makes the entry clean but keeps it
        drafts.track_change(&key, "original", "original");
        assert!(!drafts.is_dirty(&key));
        assert!(drafts.get(&key).is_some());
        assert_eq!(drafts.len(), 1);
    }

    #[test]
    fn clear_removes_the_entry_entirely() {
        let drafts = DraftTracker::new();
        let key = FieldKey::new("foundation", "q1");

        drafts.track_change(&key, "edited", "original");
        drafts.clear_change(&key);
        assert!(drafts.get(&key).is_none());
        assert!(!drafts.is_dirty(&key));
    }

    #[test]
    fn dirty_keys_only_lists_dirty_entries() {
        let drafts = DraftTracker::new();
        let dirty = FieldKey::new("s", "dirty");
        let clean = FieldKey::new("s", "clean");

        drafts.track_change(&dirty, "a", "b");
        drafts.track_change(&clean, "same", "same");

        let keys = drafts.dirty_keys();
        assert!(keys.contains(&dirty));
        assert!(!keys.contains(&clean));
    }

    #[test]
    fn track_change_replaces_never_merges() {
        let drafts = DraftTracker::new();
        let key = FieldKey::new("s", "q");

        drafts.track_change(&key, "first", "orig");
        drafts.track_change(&key, "second", "orig");

        let entry = drafts.get(&key).unwrap();
        assert_eq!(entry.current_value, "second");
        assert_eq!(entry.original_value, "orig");
    }
}
