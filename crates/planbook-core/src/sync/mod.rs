//! Outbox draining, hydration and conflict resolution against a remote backend

mod engine;
#[cfg(test)]
pub(crate) mod fake;
mod remote;
pub mod resolver;

pub use engine::{
    DrainReport, Freshness, HydrationOutcome, MergeOutcome, MergeReport, ReadOptions, Snapshot,
    SyncEngine,
};
pub use remote::{PushAck, RemoteChange, RemoteError, RemoteResult, RemoteStore};
pub use resolver::{resolve, Resolution};
