//! Value resolver
//!
//! Produces the single current value of a field from the three disagreeing
//! sources of truth. Pure and side-effect-free: callers hand it snapshots and
//! it consults them in strict priority order, so an active edit is never
//! silently overwritten by a concurrent remote refresh, and the freshest
//! persisted write always beats stale ones regardless of arrival order.
//!
//! Priority:
//! 1. Dirty draft entry (edit-in-progress always wins)
//! 2. Latest response record (max `updated_at`, ties by `record_id` desc)
//! 3. Processed projection maintained by the store client
//! 4. Durable local cache entry
//! 5. Empty string

use crate::drafts::DraftTracker;
use crate::store::latest_record;
use coachbook_common::model::{CacheEntry, FieldKey, ResponseRecord};
use std::collections::HashMap;

/// Which source supplied a resolved value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Draft,
    Remote,
    Processed,
    Cached,
    Empty,
}

/// A resolved field value, tagged with its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: ValueSource,
}

/// Resolve the current value of `key` from the given source snapshots
pub fn resolve(
    key: &FieldKey,
    drafts: &DraftTracker,
    records: &[ResponseRecord],
    processed: &HashMap<FieldKey, String>,
    cache_entry: Option<&CacheEntry>,
) -> Resolved {
    if let Some(value) = drafts.dirty_value(key) {
        return Resolved {
            value,
            source: ValueSource::Draft,
        };
    }

    if let Some(record) = latest_record(records, key) {
        return Resolved {
            value: record.value.clone(),
            source: ValueSource::Remote,
        };
    }

    if let Some(value) = processed.get(key) {
        return Resolved {
            value: value.clone(),
            source: ValueSource::Processed,
        };
    }

    if let Some(entry) = cache_entry.filter(|e| &e.field_key == key) {
        return Resolved {
            value: entry.value.clone(),
            source: ValueSource::Cached,
        };
    }

    Resolved {
        value: String::new(),
        source: ValueSource::Empty,
    }
}
