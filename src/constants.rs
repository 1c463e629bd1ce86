//! Fixed sizes and defaults shared across the crate.

/// Fixed on-wire/on-disk width of a table id, including the NUL terminator.
pub const TABLE_ID_LEN: usize = 192;

/// Fixed width of a column name in a schema entry.
pub const COL_NAME_LEN: usize = 64;

/// Name of the replicated store holding child-table records.
pub const CHILD_TABLE_STORE_NAME: &str = "ctables";

/// Default upper bound on child tables held by one node.
pub const DEFAULT_MAX_TABLES: usize = 100_000;

/// Default port storage nodes listen on for management requests.
pub const DEFAULT_DNODE_PORT: u16 = 6035;

/// Default capacity of the outbound storage-node request queue.
pub const DEFAULT_TRANSPORT_QUEUE: usize = 4096;

/// Extension of the store log file.
pub const EXT_SDB_LOG: &str = "log";
