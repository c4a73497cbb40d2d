//! Event types for the sync engine event system
//!
//! Components emit [`SyncEvent`]s on a broadcast [`EventBus`]; the UI layer
//! (out of scope here) subscribes to drive save indicators, progress bars and
//! completion badges. Emitting with no subscribers is always acceptable.

use crate::model::{CompletionStatus, FieldKey, TransferSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Sync engine event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A field value was durably written to the record store
    ResponseSaved {
        field_key: FieldKey,
        record_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A write to the record store failed; the draft stays dirty and
    /// re-committable
    SaveFailed {
        field_key: FieldKey,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A section transitioned incomplete -> complete
    SectionCompleted {
        section_title: String,
        status: CompletionStatus,
        timestamp: DateTime<Utc>,
    },

    /// A section transitioned complete -> incomplete
    SectionUncompleted {
        section_title: String,
        status: CompletionStatus,
        timestamp: DateTime<Utc>,
    },

    /// Bulk transfer advanced to the next item (sent before the item runs)
    TransferProgress {
        current: usize,
        total: usize,
        succeeded: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Bulk transfer batch finished
    TransferFinished {
        summary: TransferSummary,
        timestamp: DateTime<Utc>,
    },

    /// Legacy cache migration finished
    MigrationFinished {
        migrated: usize,
        cleaned_up: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus carrying [`SyncEvent`]s to any number of subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a new bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events; events emitted before subscription are
    /// not received
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}
