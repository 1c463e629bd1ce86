//! Entity managers the child-table core collaborates with.
//!
//! Accounts, databases, vgroups and super tables are owned elsewhere. The core
//! only looks them up (receiving snapshots) and adjusts their counters through
//! the narrow calls below.

pub mod id_pool;
pub mod memory;

use crate::types::{ColumnSchema, SlotId, VgroupId, VnodeGid};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use id_pool::IdPool;
pub use memory::MemCatalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
  pub user: String,
  pub time_series_used: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
  pub name: String,
  /// Owning account.
  pub acct: String,
  /// Slot pool size of each vgroup in this database.
  pub max_sessions: i32,
  pub precision: u8,
  pub num_of_tables: i64,
  /// Vgroup ids in placement preference order (head is tried first).
  pub vgroups: Vec<VgroupId>,
}

impl Database {
  pub fn num_of_vgroups(&self) -> usize {
    self.vgroups.len()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vgroup {
  pub vg_id: VgroupId,
  pub db_name: String,
  pub vnodes: Vec<VnodeGid>,
  pub num_of_tables: i32,
  /// Table id per slot; `None` when the slot array was never allocated.
  pub table_list: Option<Vec<Option<String>>>,
}

impl Vgroup {
  pub fn num_of_vnodes(&self) -> usize {
    self.vnodes.len()
  }

  pub fn table_at(&self, sid: SlotId) -> Option<&str> {
    let list = self.table_list.as_ref()?;
    let slot = usize::try_from(sid).ok()?;
    list.get(slot)?.as_deref()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperTable {
  pub table_id: String,
  pub uid: u64,
  pub sversion: i32,
  pub num_of_columns: u16,
  pub num_of_tags: u16,
  /// Columns followed by tags.
  pub schema: Vec<ColumnSchema>,
}

impl SuperTable {
  /// Time series contributed by one child table (the timestamp column is
  /// not counted).
  pub fn time_series(&self) -> i64 {
    i64::from(self.num_of_columns) - 1
  }

  pub fn total_columns(&self) -> usize {
    usize::from(self.num_of_columns) + usize::from(self.num_of_tags)
  }
}

pub trait AccountManager: Send + Sync {
  fn get_account(&self, user: &str) -> Option<Account>;

  fn add_time_series(&self, user: &str, count: i64);

  fn restore_time_series(&self, user: &str, count: i64);
}

pub trait DbManager: Send + Sync {
  fn get_db(&self, name: &str) -> Option<Database>;

  /// Resolve the database a table id belongs to.
  fn get_db_by_table_id(&self, table_id: &str) -> Option<Database>;

  fn add_table_into_db(&self, name: &str);

  fn remove_table_from_db(&self, name: &str);

  /// Prefer `vg_id` for future placements.
  fn move_vgroup_to_head(&self, db: &str, vg_id: VgroupId);

  /// Deprioritize `vg_id` for future placements.
  fn move_vgroup_to_tail(&self, db: &str, vg_id: VgroupId);
}

pub trait VgroupManager: Send + Sync {
  fn get_vgroup(&self, vg_id: VgroupId) -> Option<Vgroup>;

  /// Allocate the next slot from the vgroup's pool.
  fn allocate_sid(&self, vg_id: VgroupId) -> Option<SlotId>;

  /// Register a table at `sid`, marking the slot used. Returns the vgroup's
  /// table count afterwards, or `None` if the slot is out of range or held by
  /// another table.
  fn add_table_into_vgroup(&self, vg_id: VgroupId, sid: SlotId, table_id: &str) -> Option<i32>;

  /// Clear slot `sid` and free it. Returns the remaining table count.
  fn remove_table_from_vgroup(&self, vg_id: VgroupId, sid: SlotId) -> Option<i32>;

  fn drop_vgroup(&self, db: &str, vg_id: VgroupId);
}

pub trait SuperTableManager: Send + Sync {
  fn get_super_table(&self, table_id: &str) -> Option<Arc<SuperTable>>;

  fn add_table_into_super_table(&self, table_id: &str);

  fn remove_table_from_super_table(&self, table_id: &str);

  fn num_of_child_tables(&self, table_id: &str) -> Option<i32>;
}

/// Every manager the child-table core needs.
pub trait MgmtContext: AccountManager + DbManager + VgroupManager + SuperTableManager {}

impl<T> MgmtContext for T where T: AccountManager + DbManager + VgroupManager + SuperTableManager {}
