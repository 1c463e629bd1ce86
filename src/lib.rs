//! tsmeta
//!
//! Child-table metadata core for the control-plane node of a distributed
//! time-series database.
//!
//! # Layout
//!
//! - [`sdb`]: replicated record store with an append-only log
//! - [`mgmt`]: account, database, vgroup and super-table managers
//! - [`ctable`]: child-table records, store callbacks and lifecycle
//! - [`wire`]: messages for storage nodes and clients
//! - [`dnode`]: fire-and-forget delivery to storage nodes

pub mod config;
pub mod constants;
pub mod ctable;
pub mod dnode;
pub mod error;
pub mod mgmt;
pub mod replication;
pub mod sdb;
pub mod types;
pub mod util;
pub mod wire;

pub use config::MetaConfig;
pub use ctable::{ChildTable, ChildTables, CreateTableRequest};
pub use error::{MetaError, Result};
