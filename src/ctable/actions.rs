//! Store callbacks for child-table rows.
//!
//! Counter maintenance lives here rather than in the create/drop paths so the
//! same bookkeeping runs for fresh requests, replica catch-up and restarts.

use super::codec::{decode_child_table, encode_child_table, reset_child_table, CHILD_TABLE_RECORD_SIZE};
use super::ChildTable;
use crate::error::Result;
use crate::mgmt::{MgmtContext, SuperTable};
use crate::sdb::{ActionContext, RowActions};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct ChildTableActions {
  mgmt: Arc<dyn MgmtContext>,
}

impl ChildTableActions {
  pub fn new(mgmt: Arc<dyn MgmtContext>) -> Self {
    Self { mgmt }
  }

  fn resolve_super_table(&self, table: &ChildTable) -> Option<Arc<SuperTable>> {
    table
      .super_table
      .clone()
      .or_else(|| self.mgmt.get_super_table(&table.super_table_id))
  }
}

impl RowActions for ChildTableActions {
  type Row = ChildTable;

  fn key<'a>(&self, row: &'a ChildTable) -> &'a str {
    &row.table_id
  }

  fn encoded_size(&self) -> usize {
    CHILD_TABLE_RECORD_SIZE
  }

  fn insert(&self, table: &mut ChildTable, ctx: &ActionContext) {
    let mgmt = self.mgmt.as_ref();
    let Some(vgroup) = mgmt.get_vgroup(table.vg_id) else {
      error!(table = %table.table_id, vg_id = table.vg_id, "insert: vgroup not found");
      return;
    };
    let Some(db) = mgmt.get_db(&vgroup.db_name) else {
      error!(table = %table.table_id, db = %vgroup.db_name, "insert: db not found");
      return;
    };
    let Some(acct) = mgmt.get_account(&db.acct) else {
      error!(table = %table.table_id, acct = %db.acct, "insert: account not found");
      return;
    };

    let Some(super_table) = self.resolve_super_table(table) else {
      error!(
        table = %table.table_id,
        super_table = %table.super_table_id,
        "insert: super table not found"
      );
      return;
    };

    if !ctx.role.is_master() {
      let allocated = mgmt.allocate_sid(table.vg_id);
      if allocated != Some(table.sid) {
        error!(
          table = %table.table_id,
          vg_id = table.vg_id,
          sid = table.sid,
          ?allocated,
          version = ctx.version,
          "insert: sid mismatch with master"
        );
        if let Some(sid) = allocated {
          mgmt.remove_table_from_vgroup(table.vg_id, sid);
        }
        return;
      }
    }

    let Some(count) = mgmt.add_table_into_vgroup(table.vg_id, table.sid, &table.table_id) else {
      error!(
        table = %table.table_id,
        vg_id = table.vg_id,
        sid = table.sid,
        "insert: slot cannot be registered"
      );
      return;
    };

    mgmt.add_table_into_super_table(&super_table.table_id);
    mgmt.add_time_series(&acct.user, super_table.time_series());
    mgmt.add_table_into_db(&db.name);
    table.super_table = Some(super_table);

    if count >= db.max_sessions - 1 && db.num_of_vgroups() > 1 {
      debug!(db = %db.name, vg_id = table.vg_id, count, "vgroup nearly full, moved to tail");
      mgmt.move_vgroup_to_tail(&db.name, table.vg_id);
    }
  }

  fn delete(&self, table: &ChildTable, _ctx: &ActionContext) {
    if !table.is_placed() {
      return;
    }
    let mgmt = self.mgmt.as_ref();
    let Some(vgroup) = mgmt.get_vgroup(table.vg_id) else {
      error!(table = %table.table_id, vg_id = table.vg_id, "delete: vgroup not found");
      return;
    };
    if vgroup.table_at(table.sid) != Some(table.table_id.as_str()) {
      warn!(
        table = %table.table_id,
        vg_id = table.vg_id,
        sid = table.sid,
        "delete: slot not held by this table"
      );
      return;
    }
    let Some(db) = mgmt.get_db(&vgroup.db_name) else {
      error!(table = %table.table_id, db = %vgroup.db_name, "delete: db not found");
      return;
    };
    let Some(acct) = mgmt.get_account(&db.acct) else {
      error!(table = %table.table_id, acct = %db.acct, "delete: account not found");
      return;
    };
    let Some(super_table) = self.resolve_super_table(table) else {
      error!(
        table = %table.table_id,
        super_table = %table.super_table_id,
        "delete: super table not found"
      );
      return;
    };

    mgmt.restore_time_series(&acct.user, super_table.time_series());
    mgmt.remove_table_from_db(&db.name);
    mgmt.remove_table_from_super_table(&super_table.table_id);

    match mgmt.remove_table_from_vgroup(table.vg_id, table.sid) {
      Some(remaining) if remaining > 0 => mgmt.move_vgroup_to_head(&db.name, table.vg_id),
      Some(_) => {}
      None => warn!(table = %table.table_id, vg_id = table.vg_id, "delete: slot already gone"),
    }
  }

  fn update(&self, table: &mut ChildTable, bytes: &[u8]) -> Result<()> {
    self.reset(table, bytes)
  }

  fn encode(&self, table: &ChildTable, buf: &mut [u8]) -> Result<usize> {
    encode_child_table(table, buf)
  }

  fn decode(&self, bytes: &[u8]) -> Result<ChildTable> {
    decode_child_table(bytes)
  }

  fn reset(&self, table: &mut ChildTable, bytes: &[u8]) -> Result<()> {
    reset_child_table(table, bytes)
  }
}
