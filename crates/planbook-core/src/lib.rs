//! planbook-core - Offline-first data core for Planbook
//!
//! This crate owns everything the planner needs to keep working without a
//! network: the versioned local store, the sync outbox, conflict resolution,
//! the hydration gate and the offline credential cache. Rendering and the
//! remote backend's wire format live elsewhere.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod hydration;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use models::{EntityId, EntityRecord, EntityTable};
pub use services::LocalStore;
pub use sync::{RemoteStore, SyncEngine};
