//! Legacy cache migration
//!
//! One-time copy of answers that older clients kept only in the durable local
//! cache. Strictly one-way: if the record store already holds any records for
//! this user and step, the legacy entries are deleted instead of copied, so
//! stale local data can never overwrite or merge into remote data.
//! Idempotency comes from that existence check, not from a migration log.

use crate::cache::{self, LocalCache};
use crate::store::StoreClient;
use chrono::Utc;
use coachbook_common::model::FieldKey;
use coachbook_common::{EventBus, Result, SyncEvent};
use std::sync::Arc;
use tracing::{info, warn};

/// What a migration pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The record store was empty; `n` legacy values were copied into it
    Migrated(usize),
    /// The record store already had data; `n` legacy entries were deleted
    CleanedUp(usize),
    /// No legacy entries existed; nothing to do
    Empty,
}

/// Runs the one-time legacy cache migration for one session
pub struct MigrationEngine {
    client: Arc<StoreClient>,
    cache: LocalCache,
    events: EventBus,
}

impl MigrationEngine {
    pub fn new(client: Arc<StoreClient>, cache: LocalCache, events: EventBus) -> Self {
        Self {
            client,
            cache,
            events,
        }
    }

    /// Run the migration pass for the session's user and step.
    ///
    /// Safe to call on every mount; a populated record store turns the pass
    /// into pure cleanup.
    pub async fn migrate(&self) -> Result<MigrationOutcome> {
        let user_id = self.client.user_id().to_string();
        let step = self.client.step();
        // Dash-terminated so a sibling namespace never matches: the bare
        // namespace for (user-1, step 2) is a string prefix of both
        // (user-1, step 22) and (user-12, step 2)
        let prefix = format!("{}-", cache::namespace(&user_id, step));

        let legacy = self.cache.entries_with_prefix(&prefix).await;
        if legacy.is_empty() {
            return Ok(MigrationOutcome::Empty);
        }

        let remote = self.client.store().list_responses(&user_id, step).await?;
        let outcome = if remote.is_empty() {
            let mut migrated = 0;
            for (key, value) in &legacy {
                let field_key: FieldKey = match key
                    .strip_prefix(prefix.as_str())
                    .and_then(|suffix| suffix.parse().ok())
                {
                    Some(parsed) => parsed,
                    None => {
                        warn!(key, "Skipping unparseable legacy cache entry");
                        continue;
                    }
                };
                self.client
                    .save(&field_key, value, &field_key.section_id)
                    .await?;
                migrated += 1;
            }
            info!(user_id = %user_id, step, migrated, "Migrated legacy cache into record store");
            MigrationOutcome::Migrated(migrated)
        } else {
            // Remote data exists; legacy entries are stale by definition
            let removed = self.cache.remove_with_prefix(&prefix).await?;
            info!(user_id = %user_id, step, removed, "Cleaned up superseded legacy cache entries");
            MigrationOutcome::CleanedUp(removed)
        };

        let (migrated, cleaned_up) = match outcome {
            MigrationOutcome::Migrated(n) => (n, 0),
            MigrationOutcome::CleanedUp(n) => (0, n),
            MigrationOutcome::Empty => (0, 0),
        };
        self.events.emit(SyncEvent::MigrationFinished {
            migrated,
            cleaned_up,
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRecordStore, RecordStore};
    use sqlx::sqlite::SqlitePoolOptions;

    struct Harness {
        store: Arc<MemoryRecordStore>,
        cache: LocalCache,
        engine: MigrationEngine,
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
        let engine = MigrationEngine::new(client, cache.clone(), EventBus::new(64));
        Harness {
            store,
            cache,
            engine,
        }
    }

    async fn seed_legacy(cache: &LocalCache) {
        let ns = cache::namespace("user-1", 2);
        cache
            .put(&format!("{}-foundation::q1", ns), "answer one")
            .await
            .unwrap();
        cache
            .put(&format!("{}-foundation::q2", ns), "answer two")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_store_migrates_legacy_values() {
        let h = harness().await;
        seed_legacy(&h.cache).await;
        // An entry whose suffix is not a field key must be skipped, not fatal
        let ns = cache::namespace("user-1", 2);
        h.cache.put(&format!("{}-garbage", ns), "???").await.unwrap();

        let outcome = h.engine.migrate().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated(2));
        assert_eq!(h.store.response_count().await, 2);
        assert_eq!(
            h.store
                .value_of(&FieldKey::new("foundation", "q1"))
                .await
                .as_deref(),
            Some("answer one")
        );
    }

    #[tokio::test]
    async fn populated_store_cleans_up_instead_of_copying() {
        let h = harness().await;
        seed_legacy(&h.cache).await;
        h.store
            .create_response(
                "user-1",
                2,
                &FieldKey::new("foundation", "q1"),
                "remote truth",
                "foundation",
            )
            .await
            .unwrap();

        let outcome = h.engine.migrate().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::CleanedUp(2));
        // One-way: never creates records from cache once remote data exists
        assert_eq!(h.store.response_count().await, 1);
        assert_eq!(
            h.store
                .value_of(&FieldKey::new("foundation", "q1"))
                .await
                .as_deref(),
            Some("remote truth")
        );
        let ns = cache::namespace("user-1", 2);
        assert!(h.cache.entries_with_prefix(&ns).await.is_empty());
    }

    #[tokio::test]
    async fn rerunning_after_migration_becomes_cleanup_then_noop() {
        let h = harness().await;
        seed_legacy(&h.cache).await;

        assert_eq!(h.engine.migrate().await.unwrap(), MigrationOutcome::Migrated(2));
        // Legacy entries still present; the store is now populated, so the
        // second pass cleans them up
        assert_eq!(h.engine.migrate().await.unwrap(), MigrationOutcome::CleanedUp(2));
        assert_eq!(h.engine.migrate().await.unwrap(), MigrationOutcome::Empty);
        assert_eq!(h.store.response_count().await, 2);
    }

    #[tokio::test]
    async fn neighboring_namespaces_survive_a_cleanup_pass() {
        let h = harness().await;
        seed_legacy(&h.cache).await;
        // Same user at another step, and a user id sharing this one's prefix;
        // both are outside the (user-1, step 2) namespace
        let step22 = "coachbook-responses-user-1-22-foundation::q1";
        let user12 = "coachbook-responses-user-12-2-foundation::q1";
        h.cache.put(step22, "step 22 legacy answer").await.unwrap();
        h.cache.put(user12, "user-12 legacy answer").await.unwrap();
        h.store
            .create_response(
                "user-1",
                2,
                &FieldKey::new("foundation", "q1"),
                "remote truth",
                "foundation",
            )
            .await
            .unwrap();

        let outcome = h.engine.migrate().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::CleanedUp(2));
        assert_eq!(
            h.cache.get(step22).await.as_deref(),
            Some("step 22 legacy answer")
        );
        assert_eq!(
            h.cache.get(user12).await.as_deref(),
            Some("user-12 legacy answer")
        );
    }

    #[tokio::test]
    async fn only_this_namespace_is_copied_into_an_empty_store() {
        let h = harness().await;
        seed_legacy(&h.cache).await;
        let step22 = "coachbook-responses-user-1-22-foundation::q1";
        h.cache.put(step22, "step 22 legacy answer").await.unwrap();

        let outcome = h.engine.migrate().await.unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated(2));
        assert_eq!(h.store.response_count().await, 2);
        assert_eq!(
            h.cache.get(step22).await.as_deref(),
            Some("step 22 legacy answer")
        );
    }

    #[tokio::test]
    async fn no_legacy_entries_is_a_noop() {
        let h = harness().await;
        assert_eq!(h.engine.migrate().await.unwrap(), MigrationOutcome::Empty);
        assert_eq!(h.store.response_count().await, 0);
    }
}
