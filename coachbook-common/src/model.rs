//! Data model types shared across the sync engine
//!
//! All answer state is keyed by [`FieldKey`]; the remote record store is the
//! only durable source of truth, and every other structure here is
//! reconstructible from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Separator used in the string serialization of a [`FieldKey`]
const FIELD_KEY_SEPARATOR: &str = "::";

/// Stable identifier for one answer slot: a section plus a question within it.
///
/// Serialized as `"<section_id>::<question_id>"` for storage compatibility with
/// the legacy stringly-typed keys; the structured form is authoritative for
/// equality and hashing. Neither id may contain the separator itself, or the
/// string form would be ambiguous; parsing rejects such strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub section_id: String,
    pub question_id: String,
}

impl FieldKey {
    pub fn new(section_id: impl Into<String>, question_id: impl Into<String>) -> Self {
        let key = Self {
            section_id: section_id.into(),
            question_id: question_id.into(),
        };
        debug_assert!(
            !key.section_id.contains(FIELD_KEY_SEPARATOR)
                && !key.question_id.contains(FIELD_KEY_SEPARATOR),
            "field key ids must not contain {:?}: {:?}",
            FIELD_KEY_SEPARATOR,
            key
        );
        key
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.section_id, FIELD_KEY_SEPARATOR, self.question_id)
    }
}

impl FromStr for FieldKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section_id, question_id) = s.split_once(FIELD_KEY_SEPARATOR).ok_or_else(|| {
            crate::Error::InvalidInput(format!("malformed field key: {:?}", s))
        })?;
        // A second separator makes the split ambiguous; such keys can never
        // have been produced by `Display`
        if section_id.is_empty()
            || question_id.is_empty()
            || question_id.contains(FIELD_KEY_SEPARATOR)
        {
            return Err(crate::Error::InvalidInput(format!(
                "malformed field key: {:?}",
                s
            )));
        }
        Ok(Self::new(section_id, question_id))
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One persisted answer value in the remote record store.
///
/// Duplicate records for the same field key are legal (concurrent sessions may
/// each create one); readers must select the record with the maximum
/// `(updated_at, record_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub record_id: Uuid,
    pub field_key: FieldKey,
    pub value: String,
    pub section_title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory edit state for one field, scoped to the active session.
///
/// A field is dirty iff `current_value != original_value`; `original_value` is
/// the resolved value snapshotted when editing started.
#[derive(Debug, Clone)]
pub struct DraftEntry {
    pub field_key: FieldKey,
    pub current_value: String,
    pub original_value: String,
    pub dirty: bool,
    pub last_changed_at: DateTime<Utc>,
}

/// One mirrored value in the durable local cache. Best-effort, never
/// authoritative; may be stale relative to the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub field_key: FieldKey,
    pub value: String,
    pub written_at: DateTime<Utc>,
}

/// Persisted completion flag for one section. Existence means complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub section_title: String,
    pub step_number: u32,
    pub user_id: String,
}

/// Manifest of the questions belonging to one workbook section.
///
/// Supplied by the caller; the question content itself is out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    pub title: String,
    pub step_number: u32,
    pub question_ids: Vec<String>,
}

impl SectionSpec {
    /// Field keys for every question slot in this section
    pub fn field_keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.question_ids
            .iter()
            .map(|q| FieldKey::new(self.title.clone(), q.clone()))
    }
}

/// Live (derived) completion state of one section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStatus {
    pub completed: usize,
    pub total: usize,
    pub percentage: u32,
    pub is_complete: bool,
}

impl CompletionStatus {
    pub fn new(completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            (completed * 100 / total) as u32
        };
        Self {
            completed,
            total,
            percentage,
            is_complete: total > 0 && completed == total,
        }
    }
}

/// One item of a bulk transfer batch: externally captured text destined for a
/// target field, copied verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    /// Identifier in the external source (e.g. an interview question id)
    pub source_key: String,
    pub target: FieldKey,
    pub payload: String,
}

/// Final accounting of one bulk transfer batch. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub succeeded: usize,
    pub failed: usize,
}
