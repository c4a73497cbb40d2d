//! In-memory record store
//!
//! Backs the engine's tests and offline demos. Supports injecting per-key
//! write failures and an artificial write delay so concurrency behavior
//! (in-flight writes, partial batch failures) can be exercised
//! deterministically.

use async_trait::async_trait;
use chrono::Utc;
use coachbook_common::model::{CompletionRecord, FieldKey, ResponseRecord};
use coachbook_common::{Error, Result};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    responses: Vec<ResponseRecord>,
    completions: Vec<CompletionRecord>,
    /// Field keys whose writes fail with an injected error
    failing_keys: HashSet<FieldKey>,
    /// Artificial latency applied before every write
    write_delay: Option<Duration>,
    create_calls: usize,
    update_calls: usize,
}

/// In-memory [`RecordStore`](super::RecordStore) implementation
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write for `key` fail until cleared
    pub fn fail_writes_for(&self, key: FieldKey) {
        self.inner.lock().unwrap().failing_keys.insert(key);
    }

    /// Clear all injected failures
    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failing_keys.clear();
    }

    /// Apply an artificial delay before each write completes
    pub fn set_write_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().write_delay = Some(delay);
    }

    /// Total create + update calls observed
    pub async fn write_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.create_calls + inner.update_calls
    }

    /// Number of stored response records
    pub async fn response_count(&self) -> usize {
        self.inner.lock().unwrap().responses.len()
    }

    /// Latest stored value for `key`, if any
    pub async fn value_of(&self, key: &FieldKey) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        super::latest_record(&inner.responses, key).map(|r| r.value.clone())
    }

    /// Whether a completion flag exists for `user_id` + `section_title`
    pub async fn has_completion(&self, user_id: &str, section_title: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .completions
            .iter()
            .any(|c| c.user_id == user_id && c.section_title == section_title)
    }

    async fn apply_write_delay(&self) {
        let delay = self.inner.lock().unwrap().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_injected_failure(&self, key: &FieldKey) -> Result<()> {
        if self.inner.lock().unwrap().failing_keys.contains(key) {
            return Err(Error::Internal(format!("injected write failure for {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl super::RecordStore for MemoryRecordStore {
    async fn create_response(
        &self,
        _user_id: &str,
        _step: u32,
        field_key: &FieldKey,
        value: &str,
        section_title: &str,
    ) -> Result<ResponseRecord> {
        self.apply_write_delay().await;
        self.check_injected_failure(field_key)?;

        let record = super::new_record(field_key, value, section_title, Utc::now());
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;
        inner.responses.push(record.clone());
        Ok(record)
    }

    async fn update_response(&self, record_id: Uuid, value: &str) -> Result<ResponseRecord> {
        self.apply_write_delay().await;

        let key = {
            let inner = self.inner.lock().unwrap();
            inner
                .responses
                .iter()
                .find(|r| r.record_id == record_id)
                .map(|r| r.field_key.clone())
                .ok_or_else(|| Error::NotFound(format!("response record {}", record_id)))?
        };
        self.check_injected_failure(&key)?;

        let mut inner = self.inner.lock().unwrap();
        inner.update_calls += 1;
        let record = inner
            .responses
            .iter_mut()
            .find(|r| r.record_id == record_id)
            .ok_or_else(|| Error::NotFound(format!("response record {}", record_id)))?;
        record.value = value.to_string();
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete_response(&self, record_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.responses.len();
        inner.responses.retain(|r| r.record_id != record_id);
        if inner.responses.len() == before {
            return Err(Error::NotFound(format!("response record {}", record_id)));
        }
        Ok(())
    }

    async fn list_responses(&self, _user_id: &str, _step: u32) -> Result<Vec<ResponseRecord>> {
        Ok(self.inner.lock().unwrap().responses.clone())
    }

    async fn create_completion(&self, record: &CompletionRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let exists = inner
            .completions
            .iter()
            .any(|c| c.user_id == record.user_id && c.section_title == record.section_title);
        if !exists {
            inner.completions.push(record.clone());
        }
        Ok(())
    }

    async fn delete_completion(&self, user_id: &str, section_title: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .completions
            .retain(|c| !(c.user_id == user_id && c.section_title == section_title));
        Ok(())
    }

    async fn list_completions(&self, user_id: &str) -> Result<Vec<CompletionRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .completions
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }
}
