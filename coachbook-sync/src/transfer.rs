//! Bulk transfer pipeline
//!
//! Copies externally captured text (interview answers, worksheet exports)
//! verbatim into target fields of the record store. Items run strictly
//! sequentially with a fixed pacing delay between them; one failing item is
//! counted and logged, never aborts the batch, and the final summary always
//! names the counts so partial failure is visible to the caller.

use crate::cache::LocalCache;
use crate::drafts::DraftTracker;
use crate::store::StoreClient;
use chrono::Utc;
use coachbook_common::model::{TransferItem, TransferSummary};
use coachbook_common::{EventBus, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Sequential batch copier into the record store
pub struct TransferPipeline {
    client: Arc<StoreClient>,
    drafts: DraftTracker,
    cache: LocalCache,
    events: EventBus,
    pacing: Duration,
}

impl TransferPipeline {
    pub fn new(
        client: Arc<StoreClient>,
        drafts: DraftTracker,
        cache: LocalCache,
        events: EventBus,
        pacing: Duration,
    ) -> Self {
        Self {
            client,
            drafts,
            cache,
            events,
            pacing,
        }
    }

    /// Process every item in order and return the final accounting.
    ///
    /// Writes go directly to the record store; this path is a verbatim copy,
    /// no AI synthesis. Drafts and the local cache are updated optimistically
    /// on each success.
    pub async fn transfer_all(&self, items: &[TransferItem]) -> TransferSummary {
        let total = items.len();
        let mut succeeded = 0;
        let mut failed = 0;

        for (index, item) in items.iter().enumerate() {
            self.events.emit(SyncEvent::TransferProgress {
                current: index + 1,
                total,
                succeeded,
                failed,
                timestamp: Utc::now(),
            });

            match self.transfer_one(item).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    error!(
                        source_key = %item.source_key,
                        target = %item.target,
                        error = %e,
                        "Transfer item failed; continuing with the rest"
                    );
                }
            }

            // Pacing between items so the record store is not hammered
            if index + 1 < total {
                tokio::time::sleep(self.pacing).await;
            }
        }

        let summary = TransferSummary { succeeded, failed };
        if summary.failed == 0 {
            info!(succeeded, "Bulk transfer finished");
        } else {
            warn!(succeeded, failed, "Bulk transfer finished with failures");
        }
        self.events.emit(SyncEvent::TransferFinished {
            summary,
            timestamp: Utc::now(),
        });
        summary
    }

    async fn transfer_one(&self, item: &TransferItem) -> coachbook_common::Result<()> {
        if item.payload.trim().is_empty() {
            return Err(coachbook_common::Error::InvalidInput(format!(
                "empty payload from {}",
                item.source_key
            )));
        }

        self.client
            .save(&item.target, &item.payload, &item.target.section_id)
            .await?;

        // Optimistic local state: the value is now the persisted truth
        self.drafts.clear_change(&item.target);
        if let Err(e) = self
            .cache
            .mirror_put(
                self.client.user_id(),
                self.client.step(),
                &item.target,
                &item.payload,
            )
            .await
        {
            warn!(target = %item.target, error = %e, "Cache mirror write failed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRecordStore, StoreClient};
    use coachbook_common::model::FieldKey;
    use sqlx::sqlite::SqlitePoolOptions;

    struct Harness {
        store: Arc<MemoryRecordStore>,
        events: EventBus,
        pipeline: TransferPipeline,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryRecordStore::new());
        let client = Arc::new(StoreClient::new(store.clone(), "user-1", 2));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = LocalCache::with_pool(pool).await.unwrap();
        let events = EventBus::new(64);
        let pipeline = TransferPipeline::new(
            client,
            DraftTracker::new(),
            cache,
            events.clone(),
            Duration::from_millis(150),
        );
        Harness {
            store,
            events,
            pipeline,
        }
    }

    fn items(n: usize) -> Vec<TransferItem> {
        (1..=n)
            .map(|i| TransferItem {
                source_key: format!("interview-{}", i),
                target: FieldKey::new("foundation", format!("q{}", i)),
                payload: format!("captured answer number {}", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn one_failing_item_does_not_abort_the_batch() {
        let h = harness().await;
        // Pause only after the harness: connecting the SQLite pool under a
        // paused clock trips the pool's acquire timeout
        tokio::time::pause();
        let items = items(5);
        h.store.fail_writes_for(items[2].target.clone());

        let summary = h.pipeline.transfer_all(&items).await;
        assert_eq!(summary, TransferSummary { succeeded: 4, failed: 1 });

        for (i, item) in items.iter().enumerate() {
            let stored = h.store.value_of(&item.target).await;
            if i == 2 {
                assert!(stored.is_none(), "failed item must not be persisted");
            } else {
                assert_eq!(stored.as_deref(), Some(item.payload.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn progress_events_cover_every_item_in_order() {
        let h = harness().await;
        tokio::time::pause();
        let mut rx = h.events.subscribe();

        let summary = h.pipeline.transfer_all(&items(3)).await;
        assert_eq!(summary, TransferSummary { succeeded: 3, failed: 0 });

        for expected in 1..=3 {
            match rx.recv().await.unwrap() {
                SyncEvent::TransferProgress { current, total, .. } => {
                    assert_eq!(current, expected);
                    assert_eq!(total, 3);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::TransferFinished { .. }
        ));
    }

    #[tokio::test]
    async fn empty_payload_counts_as_a_failure_without_a_store_call() {
        let h = harness().await;
        tokio::time::pause();
        let batch = vec![TransferItem {
            source_key: "interview-1".to_string(),
            target: FieldKey::new("foundation", "q1"),
            payload: "   ".to_string(),
        }];

        let summary = h.pipeline.transfer_all(&batch).await;
        assert_eq!(summary, TransferSummary { succeeded: 0, failed: 1 });
        assert_eq!(h.store.write_count().await, 0);
    }

    #[tokio::test]
    async fn empty_batch_finishes_immediately() {
        let h = harness().await;
        tokio::time::pause();
        let summary = h.pipeline.transfer_all(&[]).await;
        assert_eq!(summary, TransferSummary { succeeded: 0, failed: 0 });
    }
}
