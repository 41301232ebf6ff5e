pub mod common;
pub mod completions;
pub mod conflicts;
pub mod credentials;
pub mod entities;
pub mod queue;
pub mod status;
