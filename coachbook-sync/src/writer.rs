//! Write coordinator
//!
//! Debounces and coalesces outgoing writes to the record store. Per field key:
//! a single cancelable debounce timer (a new commit aborts and restarts it,
//! never stacks a second one), at most one in-flight write, and a pending slot
//! holding the latest committed value. If the debounce fires while a write is
//! in flight the value is queued and sent immediately after the in-flight
//! write resolves, so values are never dropped and never reordered to an older
//! one.
//!
//! On success the draft entry is cleared (unless the user typed more in the
//! meantime) and the durable local cache is updated to mirror the written
//! value. On failure the draft stays dirty, so the value remains resolvable
//! and re-committable.

use crate::cache::LocalCache;
use crate::drafts::DraftTracker;
use crate::store::StoreClient;
use chrono::Utc;
use coachbook_common::model::FieldKey;
use coachbook_common::{Error, EventBus, Result, SyncEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone)]
struct PendingWrite {
    value: String,
    section_title: String,
}

#[derive(Default)]
struct KeyState {
    /// Latest committed value awaiting a flush
    pending: Option<PendingWrite>,
    /// A write for this key is currently on the wire
    in_flight: bool,
    /// The debounce fired while a write was in flight; flush immediately
    /// after it resolves
    queued: bool,
    /// Pending debounce timer; aborted and restarted on every commit
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    client: Arc<StoreClient>,
    drafts: DraftTracker,
    cache: LocalCache,
    events: EventBus,
    debounce: Duration,
    states: Mutex<HashMap<FieldKey, KeyState>>,
}

/// Debouncing write coordinator, one per session
#[derive(Clone)]
pub struct WriteCoordinator {
    inner: Arc<Inner>,
}

impl WriteCoordinator {
    pub fn new(
        client: Arc<StoreClient>,
        drafts: DraftTracker,
        cache: LocalCache,
        events: EventBus,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                drafts,
                cache,
                events,
                debounce,
                states: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Schedule a write of `value` for `field_key`.
    ///
    /// Repeated commits within the debounce window collapse into one outgoing
    /// write carrying the latest value. Empty (trimmed) values are rejected
    /// here, before any network traffic.
    pub fn commit(&self, field_key: &FieldKey, value: &str, section_title: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "refusing to save empty value for {}",
                field_key
            )));
        }

        let mut states = self.inner.states.lock().unwrap();
        let state = states.entry(field_key.clone()).or_default();
        state.pending = Some(PendingWrite {
            value: value.to_string(),
            section_title: section_title.to_string(),
        });

        // Restart the quiet period: one timer per key, never two
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let inner = Arc::clone(&self.inner);
        let key = field_key.clone();
        let debounce = self.inner.debounce;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Run the flush detached: aborting this timer must only ever
            // cancel the quiet period, never a write already underway
            tokio::spawn(async move {
                Inner::flush(&inner, &key).await;
            });
        }));

        Ok(())
    }

    /// Flush the pending value for `field_key` without waiting for the
    /// debounce timer (teardown and tests)
    pub async fn flush_now(&self, field_key: &FieldKey) {
        if let Some(state) = self.inner.states.lock().unwrap().get_mut(field_key) {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
        Inner::flush(&self.inner, field_key).await;
    }

    /// Flush every key with a pending value (session teardown)
    pub async fn flush_all(&self) {
        let keys: Vec<FieldKey> = self
            .inner
            .states
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.pending.is_some())
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            self.flush_now(&key).await;
        }
    }

    /// Whether a value is still waiting to be written for `field_key`
    pub fn has_pending(&self, field_key: &FieldKey) -> bool {
        self.inner
            .states
            .lock()
            .unwrap()
            .get(field_key)
            .map(|s| s.pending.is_some() || s.in_flight)
            .unwrap_or(false)
    }
}

impl Inner {
    /// Send the pending value for `key`, respecting the at-most-one-in-flight
    /// rule. Runs until neither a queued nor an immediately-flushable value
    /// remains.
    async fn flush(inner: &Arc<Inner>, key: &FieldKey) {
        loop {
            let pending = {
                let mut states = inner.states.lock().unwrap();
                let state = states.entry(key.clone()).or_default();
                if state.in_flight {
                    // Another write is on the wire; remember to flush as soon
                    // as it resolves
                    state.queued = state.pending.is_some();
                    return;
                }
                match state.pending.take() {
                    Some(pending) => {
                        state.in_flight = true;
                        state.queued = false;
                        pending
                    }
                    None => return,
                }
            };

            let result = inner
                .client
                .save(key, &pending.value, &pending.section_title)
                .await;

            match result {
                Ok(record) => {
                    // Clear the draft only if the user has not typed past the
                    // value we just wrote; a newer draft must stay resolvable
                    if inner
                        .drafts
                        .get(key)
                        .map(|e| e.current_value == record.value)
                        .unwrap_or(false)
                    {
                        inner.drafts.clear_change(key);
                    }

                    if let Err(e) = inner
                        .cache
                        .mirror_put(
                            inner.client.user_id(),
                            inner.client.step(),
                            key,
                            &record.value,
                        )
                        .await
                    {
                        warn!(field_key = %key, error = %e, "Cache mirror write failed");
                    }

                    debug!(field_key = %key, record_id = %record.record_id, "Response saved");
                    inner.events.emit(SyncEvent::ResponseSaved {
                        field_key: key.clone(),
                        record_id: record.record_id,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    // Draft stays dirty; the value remains resolvable and
                    // re-committable
                    warn!(field_key = %key, error = %e, "Write to record store failed");
                    inner.events.emit(SyncEvent::SaveFailed {
                        field_key: key.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }

            let flush_again = {
                let mut states = inner.states.lock().unwrap();
                let state = states.entry(key.clone()).or_default();
                state.in_flight = false;
                state.queued && state.pending.is_some()
            };
            if !flush_again {
                return;
            }
        }
    }
}
