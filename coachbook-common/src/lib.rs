//! # Coachbook Common Library
//!
//! Shared code for the coachbook response sync engine including:
//! - Data model types (field keys, response records, completion records)
//! - Event types (SyncEvent enum) and the broadcast event bus
//! - Error types
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod model;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent};
pub use model::FieldKey;
