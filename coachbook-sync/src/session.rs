//! Session lifecycle
//!
//! [`SyncSession`] wires the engine together for one user + workbook step:
//! store client snapshot, draft tracker, write coordinator, completion
//! evaluator, migration pass, transfer pipeline, event bus. It is created on
//! mount and shut down (flushing pending writes) on unmount; nothing in here
//! is an ambient singleton, so tests can run many sessions side by side.

use crate::cache::LocalCache;
use crate::completion::CompletionEvaluator;
use crate::drafts::DraftTracker;
use crate::migration::{MigrationEngine, MigrationOutcome};
use crate::resolver::{resolve, Resolved, ValueSource};
use crate::store::{RecordStore, StoreClient};
use crate::transfer::TransferPipeline;
use crate::writer::WriteCoordinator;
use coachbook_common::model::{FieldKey, SectionSpec, TransferItem, TransferSummary};
use coachbook_common::{EventBus, Result, SyncConfig};
use std::sync::Arc;
use tracing::info;

/// One mounted editing session against the record store
pub struct SyncSession {
    config: SyncConfig,
    client: Arc<StoreClient>,
    drafts: DraftTracker,
    cache: LocalCache,
    events: EventBus,
    coordinator: WriteCoordinator,
    evaluator: CompletionEvaluator,
    sections: Vec<SectionSpec>,
}

impl SyncSession {
    /// Mount a session: load the record snapshot, run the one-time legacy
    /// cache migration, and stand up the coordinators.
    pub async fn start(
        store: Arc<dyn RecordStore>,
        cache: LocalCache,
        config: SyncConfig,
        user_id: impl Into<String>,
        step: u32,
        sections: Vec<SectionSpec>,
    ) -> Result<Self> {
        let client = Arc::new(StoreClient::new(store, user_id, step));
        client.refresh().await?;

        let events = EventBus::new(config.event_capacity);
        let drafts = DraftTracker::new();

        let migration = MigrationEngine::new(client.clone(), cache.clone(), events.clone());
        let outcome = migration.migrate().await?;
        if outcome != MigrationOutcome::Empty {
            info!(?outcome, "Legacy cache migration pass finished");
        }

        let coordinator = WriteCoordinator::new(
            client.clone(),
            drafts.clone(),
            cache.clone(),
            events.clone(),
            config.debounce(),
        );
        let evaluator = CompletionEvaluator::new(
            client.clone(),
            drafts.clone(),
            cache.clone(),
            events.clone(),
            config.min_answer_len,
            config.debounce(),
        );

        Ok(Self {
            config,
            client,
            drafts,
            cache,
            events,
            coordinator,
            evaluator,
            sections,
        })
    }

    /// Resolve the current value of one field from all sources
    pub async fn resolve(&self, key: &FieldKey) -> Resolved {
        // A dirty draft wins outright; skip the storage round trips
        if let Some(value) = self.drafts.dirty_value(key) {
            return Resolved {
                value,
                source: ValueSource::Draft,
            };
        }

        let records = self.client.records().await;
        let processed = self.client.processed().await;
        let cache_entry = self
            .cache
            .mirror_get(self.client.user_id(), self.client.step(), key)
            .await;
        resolve(key, &self.drafts, &records, &processed, cache_entry.as_ref())
    }

    /// Record a user edit: track the draft, schedule the debounced write and
    /// the section completion reconcile.
    ///
    /// An empty (trimmed) value still updates the draft and the completion
    /// check but is rejected for persistence, surfaced as `InvalidInput`.
    pub async fn edit(&self, key: &FieldKey, new_value: &str) -> Result<()> {
        let original = match self.drafts.get(key) {
            Some(entry) => entry.original_value,
            None => self.resolve(key).await.value,
        };
        self.drafts.track_change(key, new_value, original);

        if let Some(section) = self.section_of(key) {
            self.evaluator.schedule_reconcile(section.clone());
        }

        let section_title = self
            .section_of(key)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| key.section_id.clone());
        self.coordinator.commit(key, new_value, &section_title)
    }

    /// Copy a batch of externally captured answers into the record store
    pub async fn transfer_all(&self, items: &[TransferItem]) -> TransferSummary {
        let pipeline = TransferPipeline::new(
            self.client.clone(),
            self.drafts.clone(),
            self.cache.clone(),
            self.events.clone(),
            self.config.transfer_pacing(),
        );
        pipeline.transfer_all(items).await
    }

    /// Flush every pending write before unmount
    pub async fn shutdown(&self) {
        self.coordinator.flush_all().await;
    }

    fn section_of(&self, key: &FieldKey) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.title == key.section_id)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn drafts(&self) -> &DraftTracker {
        &self.drafts
    }

    pub fn evaluator(&self) -> &CompletionEvaluator {
        &self.evaluator
    }

    pub fn coordinator(&self) -> &WriteCoordinator {
        &self.coordinator
    }

    pub fn client(&self) -> &Arc<StoreClient> {
        &self.client
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}
