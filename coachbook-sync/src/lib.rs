//! # Coachbook Sync Engine
//!
//! Response reconciliation and persistence layer for the coaching workbook.
//! Keeps one logical answer value consistent across three disagreeing sources
//! of truth:
//! - the in-memory editing draft ([`drafts::DraftTracker`])
//! - the durable local cache ([`cache::LocalCache`])
//! - the remote record store ([`store::RecordStore`])
//!
//! Reads flow one way through the pure [`resolver`]; writes flow one way
//! through the debouncing [`writer::WriteCoordinator`] into the record store,
//! mirrored back to the local cache. [`completion`] derives per-section
//! completion from live values; [`migration`] copies legacy cache data
//! exactly once; [`transfer`] batch-copies externally captured answers.
//! [`session::SyncSession`] bundles the whole thing with an explicit
//! lifecycle.

pub mod assist;
pub mod cache;
pub mod completion;
pub mod drafts;
pub mod migration;
pub mod resolver;
pub mod session;
pub mod store;
pub mod transfer;
pub mod writer;

pub use cache::LocalCache;
pub use completion::CompletionEvaluator;
pub use drafts::DraftTracker;
pub use migration::{MigrationEngine, MigrationOutcome};
pub use resolver::{resolve, Resolved, ValueSource};
pub use session::SyncSession;
pub use store::{HttpRecordStore, MemoryRecordStore, RecordStore, StoreClient};
pub use transfer::TransferPipeline;
pub use writer::WriteCoordinator;
