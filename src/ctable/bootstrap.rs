//! Startup reconciliation of persisted child tables.
//!
//! Derived counters are never persisted with the records, so they are rebuilt
//! here from the records that survive validation. Records that no longer fit
//! the catalog are deleted from the store.

use super::actions::ChildTableActions;
use super::ChildTable;
use crate::mgmt::{MgmtContext, SuperTable};
use crate::sdb::Sdb;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
  pub loaded: usize,
  pub discarded: usize,
}

struct Placement {
  acct: String,
  super_table: Arc<SuperTable>,
}

pub(crate) fn reconcile(sdb: &Sdb<ChildTableActions>, mgmt: &dyn MgmtContext) -> BootstrapReport {
  let mut report = BootstrapReport::default();

  for table in sdb.rows() {
    let placement = match validate(&table, mgmt) {
      Ok(placement) => placement,
      Err(reason) => {
        discard(sdb, &table, reason);
        report.discarded += 1;
        continue;
      }
    };

    if mgmt
      .add_table_into_vgroup(table.vg_id, table.sid, &table.table_id)
      .is_none()
    {
      discard(sdb, &table, "slot out of range or taken");
      report.discarded += 1;
      continue;
    }

    let super_table = Arc::clone(&placement.super_table);
    sdb.modify_row(&table.table_id, |row| row.super_table = Some(super_table));
    mgmt.add_table_into_super_table(&placement.super_table.table_id);
    mgmt.add_time_series(&placement.acct, placement.super_table.time_series());
    report.loaded += 1;
  }

  info!(
    loaded = report.loaded,
    discarded = report.discarded,
    "child tables reconciled"
  );
  report
}

fn validate(table: &ChildTable, mgmt: &dyn MgmtContext) -> Result<Placement, &'static str> {
  let db = mgmt
    .get_db_by_table_id(&table.table_id)
    .ok_or("db not found")?;
  let vgroup = mgmt.get_vgroup(table.vg_id).ok_or("vgroup not found")?;
  if vgroup.db_name != db.name {
    return Err("vgroup belongs to another db");
  }
  if vgroup.table_list.is_none() {
    return Err("vgroup slot array not allocated");
  }
  let super_table = mgmt
    .get_super_table(&table.super_table_id)
    .ok_or("super table not found")?;
  Ok(Placement {
    acct: db.acct,
    super_table,
  })
}

/// Unplace the record first so the delete callback leaves counters alone.
fn discard(sdb: &Sdb<ChildTableActions>, table: &ChildTable, reason: &str) {
  warn!(
    table = %table.table_id,
    vg_id = table.vg_id,
    sid = table.sid,
    reason,
    "discarding inconsistent child table"
  );
  sdb.modify_row(&table.table_id, |row| row.vg_id = 0);
  if let Err(error) = sdb.delete_row(&table.table_id) {
    warn!(table = %table.table_id, %error, "failed to delete inconsistent child table");
  }
}
