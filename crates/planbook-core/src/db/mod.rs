//! Database layer for Planbook

mod conflict_log;
mod connection;
mod credentials_repository;
mod entity_repository;
pub mod migrations;
mod rows;
mod sync_queue;

pub use conflict_log::ConflictLog;
pub use connection::Database;
pub(crate) use connection::{begin, finish};
pub use credentials_repository::CredentialsRepository;
pub use entity_repository::{EntityRepository, LibSqlEntityRepository};
pub use sync_queue::SyncQueue;
