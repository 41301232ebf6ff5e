//! Services shared by every client of the core

mod local_store;

pub use local_store::LocalStore;
