//! Storage module: the single-writer SQLite handle that gets swapped under a running process.
//!
//! Layout:
//! - `schema.rs`: SQL for the record table, the seed row and the point lookup
//! - `ops.rs`: pool opening with the bounded setup retry, and reads with the prepare retry
//! - `actor.rs`: actor owning the live pool; its mailbox serializes reads and replacements

mod actor;
mod ops;
mod schema;

pub use actor::StorageHandle;
