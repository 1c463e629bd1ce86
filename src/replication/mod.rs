//! Replication role of this node.
//!
//! Slot allocation is authoritative on the master only; every other role
//! verifies the slot ids it replays.

pub mod types;

pub use types::{ReplicationParseError, ReplicationRole};
