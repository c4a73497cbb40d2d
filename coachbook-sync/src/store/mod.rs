//! Record store access
//!
//! The remote record store is the canonical persistence layer for answers and
//! completion flags. [`RecordStore`] is the narrow seam the engine consumes;
//! [`StoreClient`] layers the per-session snapshot on top of it: the fetched
//! records, the latest-wins processed projection used by the value resolver,
//! and the per-key record-id map that makes repeat saves update the same
//! record instead of piling up duplicates.

pub mod http;
pub mod memory;

pub use http::HttpRecordStore;
pub use memory::MemoryRecordStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachbook_common::model::{CompletionRecord, FieldKey, ResponseRecord};
use coachbook_common::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Remote record store API consumed by the engine
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a new response record
    async fn create_response(
        &self,
        user_id: &str,
        step: u32,
        field_key: &FieldKey,
        value: &str,
        section_title: &str,
    ) -> Result<ResponseRecord>;

    /// Update the value of an existing response record
    async fn update_response(&self, record_id: Uuid, value: &str) -> Result<ResponseRecord>;

    /// Delete a response record
    async fn delete_response(&self, record_id: Uuid) -> Result<()>;

    /// Fetch all response records for one user and workbook step
    async fn list_responses(&self, user_id: &str, step: u32) -> Result<Vec<ResponseRecord>>;

    /// Persist a section completion flag
    async fn create_completion(&self, record: &CompletionRecord) -> Result<()>;

    /// Remove a section completion flag
    async fn delete_completion(&self, user_id: &str, section_title: &str) -> Result<()>;

    /// Fetch all completion flags for one user
    async fn list_completions(&self, user_id: &str) -> Result<Vec<CompletionRecord>>;
}

/// Select the authoritative record among duplicates for one field key:
/// maximum `updated_at`, ties broken by `record_id` descending.
pub fn latest_record<'a>(
    records: &'a [ResponseRecord],
    key: &FieldKey,
) -> Option<&'a ResponseRecord> {
    records
        .iter()
        .filter(|r| &r.field_key == key)
        .max_by_key(|r| (r.updated_at, r.record_id))
}

/// Per-session view of the record store.
///
/// Holds the record snapshot loaded at mount plus the bookkeeping that keeps
/// the session writing to one record per field key. All mutation replaces the
/// value at a key, never merges.
pub struct StoreClient {
    store: Arc<dyn RecordStore>,
    user_id: String,
    step: u32,
    records: RwLock<Vec<ResponseRecord>>,
    /// Denormalized latest-wins projection, one value per field key
    processed: RwLock<HashMap<FieldKey, String>>,
    /// Record id this session writes to, per field key
    record_ids: RwLock<HashMap<FieldKey, Uuid>>,
    /// Section titles with a persisted completion flag
    completed_sections: RwLock<Vec<String>>,
}

impl StoreClient {
    pub fn new(store: Arc<dyn RecordStore>, user_id: impl Into<String>, step: u32) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            step,
            records: RwLock::new(Vec::new()),
            processed: RwLock::new(HashMap::new()),
            record_ids: RwLock::new(HashMap::new()),
            completed_sections: RwLock::new(Vec::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Reload the session snapshot from the record store.
    ///
    /// Rebuilds the processed projection and record-id map from scratch; the
    /// snapshot is disposable state and is always reconstructible this way.
    pub async fn refresh(&self) -> Result<()> {
        let fetched = self.store.list_responses(&self.user_id, self.step).await?;
        let completions = self.store.list_completions(&self.user_id).await?;

        let mut processed = HashMap::new();
        let mut record_ids = HashMap::new();
        for record in &fetched {
            match latest_record(&fetched, &record.field_key) {
                Some(latest) => {
                    processed.insert(record.field_key.clone(), latest.value.clone());
                    record_ids.insert(record.field_key.clone(), latest.record_id);
                }
                None => continue,
            }
        }

        debug!(
            user_id = %self.user_id,
            step = self.step,
            records = fetched.len(),
            fields = processed.len(),
            "Refreshed record store snapshot"
        );

        *self.records.write().await = fetched;
        *self.processed.write().await = processed;
        *self.record_ids.write().await = record_ids;
        *self.completed_sections.write().await = completions
            .into_iter()
            .filter(|c| c.user_id == self.user_id)
            .map(|c| c.section_title)
            .collect();
        Ok(())
    }

    /// Current record snapshot (clone)
    pub async fn records(&self) -> Vec<ResponseRecord> {
        self.records.read().await.clone()
    }

    /// Current processed projection (clone)
    pub async fn processed(&self) -> HashMap<FieldKey, String> {
        self.processed.read().await.clone()
    }

    /// Number of records currently known for this user+step
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Persist one field value, creating a record on first save and updating
    /// the same record afterwards. Updates the session snapshot on success.
    pub async fn save(
        &self,
        field_key: &FieldKey,
        value: &str,
        section_title: &str,
    ) -> Result<ResponseRecord> {
        let existing_id = self.record_ids.read().await.get(field_key).copied();

        let saved = match existing_id {
            Some(record_id) => self.store.update_response(record_id, value).await?,
            None => {
                self.store
                    .create_response(&self.user_id, self.step, field_key, value, section_title)
                    .await?
            }
        };

        let mut records = self.records.write().await;
        if let Some(slot) = records.iter_mut().find(|r| r.record_id == saved.record_id) {
            *slot = saved.clone();
        } else {
            records.push(saved.clone());
        }
        drop(records);

        self.record_ids
            .write()
            .await
            .insert(field_key.clone(), saved.record_id);
        self.processed
            .write()
            .await
            .insert(field_key.clone(), saved.value.clone());

        Ok(saved)
    }

    /// Whether a completion flag is persisted for `section_title`
    pub async fn completion_exists(&self, section_title: &str) -> bool {
        self.completed_sections
            .read()
            .await
            .iter()
            .any(|s| s == section_title)
    }

    /// Persist a completion flag and record it in the snapshot
    pub async fn create_completion(&self, section_title: &str, step_number: u32) -> Result<()> {
        self.store
            .create_completion(&CompletionRecord {
                section_title: section_title.to_string(),
                step_number,
                user_id: self.user_id.clone(),
            })
            .await?;
        let mut sections = self.completed_sections.write().await;
        if !sections.iter().any(|s| s == section_title) {
            sections.push(section_title.to_string());
        }
        Ok(())
    }

    /// Remove a completion flag and drop it from the snapshot
    pub async fn delete_completion(&self, section_title: &str) -> Result<()> {
        self.store
            .delete_completion(&self.user_id, section_title)
            .await?;
        self.completed_sections
            .write()
            .await
            .retain(|s| s != section_title);
        Ok(())
    }
}

/// Construct a record with both timestamps set to `now`; shared by store
/// implementations.
pub(crate) fn new_record(
    field_key: &FieldKey,
    value: &str,
    section_title: &str,
    now: DateTime<Utc>,
) -> ResponseRecord {
    ResponseRecord {
        record_id: Uuid::new_v4(),
        field_key: field_key.clone(),
        value: value.to_string(),
        section_title: section_title.to_string(),
        created_at: now,
        updated_at: now,
    }
}
