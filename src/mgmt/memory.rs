//! In-memory entity managers.
//!
//! Used by single-process deployments and tests; every manager trait is
//! implemented over one lock.

use super::{
  Account, AccountManager, Database, DbManager, IdPool, SuperTable, SuperTableManager, Vgroup,
  VgroupManager,
};
use crate::error::{MetaError, Result};
use crate::types::{db_name_of_table, SlotId, VgroupId, VnodeGid};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct VgroupState {
  vgroup: Vgroup,
  pool: IdPool,
}

#[derive(Debug)]
struct SuperTableState {
  table: Arc<SuperTable>,
  num_of_tables: i32,
}

#[derive(Debug, Default)]
struct CatalogState {
  accounts: HashMap<String, Account>,
  dbs: HashMap<String, Database>,
  vgroups: HashMap<VgroupId, VgroupState>,
  super_tables: HashMap<String, SuperTableState>,
  dropped_vgroups: Vec<VgroupId>,
}

#[derive(Debug, Default)]
pub struct MemCatalog {
  state: Mutex<CatalogState>,
}

impl MemCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn create_account(&self, user: &str) {
    self.state.lock().accounts.insert(
      user.to_string(),
      Account {
        user: user.to_string(),
        time_series_used: 0,
      },
    );
  }

  pub fn create_db(&self, name: &str, acct: &str, max_sessions: i32, precision: u8) -> Result<()> {
    if max_sessions < 2 {
      return Err(MetaError::Config(format!(
        "db {name}: max_sessions must be at least 2"
      )));
    }
    let mut state = self.state.lock();
    if state.dbs.contains_key(name) {
      return Err(MetaError::OperationFailed(format!("db {name} already exists")));
    }
    state.dbs.insert(
      name.to_string(),
      Database {
        name: name.to_string(),
        acct: acct.to_string(),
        max_sessions,
        precision,
        num_of_tables: 0,
        vgroups: Vec::new(),
      },
    );
    Ok(())
  }

  /// Create a vgroup with an allocated slot array and append it to the
  /// database's preference list.
  pub fn create_vgroup(&self, db: &str, vg_id: VgroupId, vnodes: Vec<VnodeGid>) -> Result<()> {
    let mut state = self.state.lock();
    if vg_id == 0 || state.vgroups.contains_key(&vg_id) {
      return Err(MetaError::OperationFailed(format!(
        "vgroup {vg_id} is reserved or exists"
      )));
    }
    let database = state
      .dbs
      .get_mut(db)
      .ok_or_else(|| MetaError::NotFound(format!("db {db}")))?;
    let max_sessions = database.max_sessions as usize;
    database.vgroups.push(vg_id);

    state.vgroups.insert(
      vg_id,
      VgroupState {
        vgroup: Vgroup {
          vg_id,
          db_name: db.to_string(),
          vnodes,
          num_of_tables: 0,
          table_list: Some(vec![None; max_sessions]),
        },
        pool: IdPool::new(max_sessions),
      },
    );
    Ok(())
  }

  pub fn create_super_table(&self, table: SuperTable) {
    self.state.lock().super_tables.insert(
      table.table_id.clone(),
      SuperTableState {
        table: Arc::new(table),
        num_of_tables: 0,
      },
    );
  }

  pub fn remove_super_table(&self, table_id: &str) -> bool {
    self.state.lock().super_tables.remove(table_id).is_some()
  }

  /// Drop a vgroup's slot array, leaving the vgroup itself registered.
  pub fn release_table_list(&self, vg_id: VgroupId) -> bool {
    match self.state.lock().vgroups.get_mut(&vg_id) {
      Some(entry) => {
        entry.vgroup.table_list = None;
        true
      }
      None => false,
    }
  }

  /// Rename the database a vgroup claims to belong to.
  pub fn reassign_vgroup(&self, vg_id: VgroupId, db_name: &str) -> bool {
    match self.state.lock().vgroups.get_mut(&vg_id) {
      Some(entry) => {
        entry.vgroup.db_name = db_name.to_string();
        true
      }
      None => false,
    }
  }

  pub fn is_sid_used(&self, vg_id: VgroupId, sid: SlotId) -> bool {
    self
      .state
      .lock()
      .vgroups
      .get(&vg_id)
      .map(|entry| entry.pool.is_used(sid))
      .unwrap_or(false)
  }

  /// Vgroups removed through [`VgroupManager::drop_vgroup`].
  pub fn dropped_vgroups(&self) -> Vec<VgroupId> {
    self.state.lock().dropped_vgroups.clone()
  }
}

impl AccountManager for MemCatalog {
  fn get_account(&self, user: &str) -> Option<Account> {
    self.state.lock().accounts.get(user).cloned()
  }

  fn add_time_series(&self, user: &str, count: i64) {
    if let Some(account) = self.state.lock().accounts.get_mut(user) {
      account.time_series_used += count;
    }
  }

  fn restore_time_series(&self, user: &str, count: i64) {
    if let Some(account) = self.state.lock().accounts.get_mut(user) {
      account.time_series_used -= count;
    }
  }
}

impl DbManager for MemCatalog {
  fn get_db(&self, name: &str) -> Option<Database> {
    self.state.lock().dbs.get(name).cloned()
  }

  fn get_db_by_table_id(&self, table_id: &str) -> Option<Database> {
    let name = db_name_of_table(table_id)?;
    self.get_db(name)
  }

  fn add_table_into_db(&self, name: &str) {
    if let Some(db) = self.state.lock().dbs.get_mut(name) {
      db.num_of_tables += 1;
    }
  }

  fn remove_table_from_db(&self, name: &str) {
    if let Some(db) = self.state.lock().dbs.get_mut(name) {
      db.num_of_tables -= 1;
    }
  }

  fn move_vgroup_to_head(&self, db: &str, vg_id: VgroupId) {
    if let Some(db) = self.state.lock().dbs.get_mut(db) {
      if let Some(pos) = db.vgroups.iter().position(|id| *id == vg_id) {
        let id = db.vgroups.remove(pos);
        db.vgroups.insert(0, id);
      }
    }
  }

  fn move_vgroup_to_tail(&self, db: &str, vg_id: VgroupId) {
    if let Some(db) = self.state.lock().dbs.get_mut(db) {
      if let Some(pos) = db.vgroups.iter().position(|id| *id == vg_id) {
        let id = db.vgroups.remove(pos);
        db.vgroups.push(id);
      }
    }
  }
}

impl VgroupManager for MemCatalog {
  fn get_vgroup(&self, vg_id: VgroupId) -> Option<Vgroup> {
    self
      .state
      .lock()
      .vgroups
      .get(&vg_id)
      .map(|entry| entry.vgroup.clone())
  }

  fn allocate_sid(&self, vg_id: VgroupId) -> Option<SlotId> {
    self.state.lock().vgroups.get_mut(&vg_id)?.pool.allocate()
  }

  fn add_table_into_vgroup(&self, vg_id: VgroupId, sid: SlotId, table_id: &str) -> Option<i32> {
    let mut state = self.state.lock();
    let entry = state.vgroups.get_mut(&vg_id)?;
    let index = usize::try_from(sid).ok().filter(|index| *index >= 1)?;
    let slot = entry.vgroup.table_list.as_mut()?.get_mut(index)?;
    match slot.as_deref() {
      Some(existing) if existing != table_id => {
        debug!(vg_id, sid, existing, table_id, "slot held by another table");
        return None;
      }
      Some(_) => {}
      None => entry.vgroup.num_of_tables += 1,
    }
    *slot = Some(table_id.to_string());
    entry.pool.mark(sid, true);
    Some(entry.vgroup.num_of_tables)
  }

  fn remove_table_from_vgroup(&self, vg_id: VgroupId, sid: SlotId) -> Option<i32> {
    let mut state = self.state.lock();
    let entry = state.vgroups.get_mut(&vg_id)?;
    if let Some(slot) = entry
      .vgroup
      .table_list
      .as_mut()
      .and_then(|list| list.get_mut(usize::try_from(sid).ok()?))
    {
      if slot.take().is_some() {
        entry.vgroup.num_of_tables -= 1;
      }
    }
    entry.pool.free(sid);
    Some(entry.vgroup.num_of_tables)
  }

  fn drop_vgroup(&self, db: &str, vg_id: VgroupId) {
    let mut state = self.state.lock();
    if state.vgroups.remove(&vg_id).is_none() {
      return;
    }
    if let Some(database) = state.dbs.get_mut(db) {
      database.vgroups.retain(|id| *id != vg_id);
    }
    state.dropped_vgroups.push(vg_id);
    debug!(db, vg_id, "vgroup dropped");
  }
}

impl SuperTableManager for MemCatalog {
  fn get_super_table(&self, table_id: &str) -> Option<Arc<SuperTable>> {
    self
      .state
      .lock()
      .super_tables
      .get(table_id)
      .map(|entry| Arc::clone(&entry.table))
  }

  fn add_table_into_super_table(&self, table_id: &str) {
    if let Some(entry) = self.state.lock().super_tables.get_mut(table_id) {
      entry.num_of_tables += 1;
    }
  }

  fn remove_table_from_super_table(&self, table_id: &str) {
    if let Some(entry) = self.state.lock().super_tables.get_mut(table_id) {
      entry.num_of_tables -= 1;
    }
  }

  fn num_of_child_tables(&self, table_id: &str) -> Option<i32> {
    self
      .state
      .lock()
      .super_tables
      .get(table_id)
      .map(|entry| entry.num_of_tables)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  fn catalog_with_two_vgroups() -> MemCatalog {
    let catalog = MemCatalog::new();
    catalog.create_account("root");
    catalog.create_db("root.db", "root", 4, 0).expect("db");
    let vnode = VnodeGid::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, 1);
    catalog.create_vgroup("root.db", 1, vec![vnode]).expect("vg1");
    catalog.create_vgroup("root.db", 2, vec![vnode]).expect("vg2");
    catalog
  }

  #[test]
  fn preference_list_moves() {
    let catalog = catalog_with_two_vgroups();
    catalog.move_vgroup_to_tail("root.db", 1);
    assert_eq!(catalog.get_db("root.db").expect("db").vgroups, vec![2, 1]);
    catalog.move_vgroup_to_head("root.db", 1);
    assert_eq!(catalog.get_db("root.db").expect("db").vgroups, vec![1, 2]);
  }

  #[test]
  fn slot_registration_tracks_count_and_pool() {
    let catalog = catalog_with_two_vgroups();
    let sid = catalog.allocate_sid(1).expect("sid");
    assert_eq!(catalog.add_table_into_vgroup(1, sid, "root.db.t1"), Some(1));
    assert_eq!(catalog.add_table_into_vgroup(1, sid, "root.db.t1"), Some(1));
    assert_eq!(
      catalog.get_vgroup(1).expect("vg").table_at(sid),
      Some("root.db.t1")
    );

    assert_eq!(catalog.remove_table_from_vgroup(1, sid), Some(0));
    assert!(!catalog.is_sid_used(1, sid));
    assert_eq!(catalog.add_table_into_vgroup(1, 99, "root.db.t2"), None);
  }

  #[test]
  fn occupied_or_reserved_slot_refuses_another_table() {
    let catalog = catalog_with_two_vgroups();
    assert_eq!(catalog.add_table_into_vgroup(1, 1, "root.db.t1"), Some(1));
    assert_eq!(catalog.add_table_into_vgroup(1, 1, "root.db.t2"), None);
    assert_eq!(catalog.add_table_into_vgroup(1, 0, "root.db.t2"), None);

    let vgroup = catalog.get_vgroup(1).expect("vg");
    assert_eq!(vgroup.num_of_tables, 1);
    assert_eq!(vgroup.table_at(1), Some("root.db.t1"));
    assert_eq!(vgroup.table_at(0), None);
  }

  #[test]
  fn unallocated_table_list_refuses_registration() {
    let catalog = catalog_with_two_vgroups();
    assert!(catalog.release_table_list(2));
    assert_eq!(catalog.add_table_into_vgroup(2, 1, "root.db.t1"), None);
  }

  #[test]
  fn drop_vgroup_removes_from_db() {
    let catalog = catalog_with_two_vgroups();
    catalog.drop_vgroup("root.db", 1);
    assert!(catalog.get_vgroup(1).is_none());
    assert_eq!(catalog.get_db("root.db").expect("db").vgroups, vec![2]);
    assert_eq!(catalog.dropped_vgroups(), vec![1]);
  }

  #[test]
  fn db_resolved_from_table_id() {
    let catalog = catalog_with_two_vgroups();
    assert_eq!(
      catalog
        .get_db_by_table_id("root.db.cpu_01")
        .expect("db")
        .name,
      "root.db"
    );
    assert!(catalog.get_db_by_table_id("other.db.cpu").is_none());
  }
}
