//! Child-table lifecycle.
//!
//! [`ChildTables`] owns the `"ctables"` store and exposes the create, drop and
//! lookup entry points. Counter bookkeeping happens in [`actions`], invoked by
//! the store for every committed insert and delete.

pub mod actions;
pub mod bootstrap;
pub mod codec;

use crate::config::MetaConfig;
use crate::constants::{CHILD_TABLE_STORE_NAME, EXT_SDB_LOG, TABLE_ID_LEN};
use crate::dnode::{DnodeTransport, IpSet};
use crate::error::{MetaError, Result};
use crate::mgmt::{Database, MgmtContext, SuperTable, Vgroup};
use crate::replication::ReplicationRole;
use crate::sdb::log::LogFrame;
use crate::sdb::{Sdb, SdbOptions};
use crate::types::{compose_uid, SlotId, TableType, VgroupId};
use crate::wire::{CreateTableMsg, RemoveTableMsg, TableMeta, VpeerDesc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub use actions::ChildTableActions;
pub use bootstrap::BootstrapReport;

/// A child-table record.
#[derive(Debug, Clone, Default)]
pub struct ChildTable {
  pub table_id: String,
  pub super_table_id: String,
  pub table_type: TableType,
  pub uid: u64,
  pub sid: SlotId,
  /// `0` when the table is not placed on any vgroup.
  pub vg_id: VgroupId,
  /// Milliseconds since the Unix epoch.
  pub created_time: i64,
  /// Resolved at load time; never persisted.
  pub super_table: Option<Arc<SuperTable>>,
}

impl ChildTable {
  pub fn is_placed(&self) -> bool {
    self.vg_id != 0
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableRequest {
  pub table_id: String,
  /// Id of the super table whose schema the child table uses.
  pub super_table_id: String,
  pub tag_data: Vec<u8>,
}

pub struct ChildTables {
  sdb: Sdb<ChildTableActions>,
  mgmt: Arc<dyn MgmtContext>,
  transport: Arc<dyn DnodeTransport>,
  config: MetaConfig,
  report: BootstrapReport,
}

impl ChildTables {
  /// Open the store, replay its log and reconcile every record against the
  /// catalog.
  pub fn open(
    config: MetaConfig,
    mgmt: Arc<dyn MgmtContext>,
    transport: Arc<dyn DnodeTransport>,
  ) -> Result<Self> {
    config.validate()?;

    let mut options = SdbOptions::new(CHILD_TABLE_STORE_NAME, config.max_tables)
      .role(config.replication_role);
    if let Some(dir) = config.data_dir.as_ref() {
      std::fs::create_dir_all(dir)?;
      options = options.log_path(dir.join(format!("{CHILD_TABLE_STORE_NAME}.{EXT_SDB_LOG}")));
    }

    let sdb = Sdb::open(options, ChildTableActions::new(Arc::clone(&mgmt)))?;
    let report = bootstrap::reconcile(&sdb, mgmt.as_ref());
    info!(
      tables = sdb.num_rows(),
      version = sdb.version(),
      role = %config.replication_role,
      "child tables opened"
    );

    Ok(Self {
      sdb,
      mgmt,
      transport,
      config,
      report,
    })
  }

  pub fn close(self) -> Result<()> {
    self.sdb.close()
  }

  pub fn role(&self) -> ReplicationRole {
    self.sdb.role()
  }

  /// Create a child table at slot `sid` of `vgroup`.
  ///
  /// Returns the message for the vgroup's storage nodes; see
  /// [`ChildTables::send_create`].
  pub fn create(
    &self,
    request: &CreateTableRequest,
    vgroup: &Vgroup,
    sid: SlotId,
  ) -> Result<(CreateTableMsg, Arc<ChildTable>)> {
    let current = self.sdb.num_rows();
    if current >= self.config.max_tables {
      return Err(MetaError::TooManyTables {
        current,
        max: self.config.max_tables,
      });
    }

    let super_table = self
      .mgmt
      .get_super_table(&request.super_table_id)
      .ok_or_else(|| {
        MetaError::InvalidTable(format!("super table {} not found", request.super_table_id))
      })?;
    if request.table_id.is_empty() || request.table_id.len() >= TABLE_ID_LEN {
      return Err(MetaError::InvalidTable(format!(
        "table id {:?} must be 1..{} bytes",
        request.table_id,
        TABLE_ID_LEN - 1
      )));
    }
    if super_table.schema.len() != super_table.total_columns() {
      return Err(MetaError::InvalidTable(format!(
        "super table {} has {} schema entries for {} columns and tags",
        super_table.table_id,
        super_table.schema.len(),
        super_table.total_columns()
      )));
    }
    self.check_slot(vgroup.vg_id, sid, &request.table_id)?;

    let row = ChildTable {
      table_id: request.table_id.clone(),
      super_table_id: super_table.table_id.clone(),
      table_type: TableType::Child,
      uid: compose_uid(vgroup.vg_id, sid, self.sdb.version()),
      sid,
      vg_id: vgroup.vg_id,
      created_time: now_millis(),
      super_table: Some(Arc::clone(&super_table)),
    };
    let table = self.sdb.insert_row(row).map_err(store_error)?;
    debug!(
      table = %table.table_id,
      vg_id = table.vg_id,
      sid = table.sid,
      uid = table.uid,
      "child table created"
    );

    let msg = create_message(&table, &super_table, vgroup, &request.tag_data);
    Ok((msg, table))
  }

  /// A slot is usable when it lies inside the vgroup's pool and holds no
  /// other table.
  fn check_slot(&self, vg_id: VgroupId, sid: SlotId, table_id: &str) -> Result<()> {
    let vgroup = self
      .mgmt
      .get_vgroup(vg_id)
      .ok_or_else(|| MetaError::OperationFailed(format!("vgroup {vg_id} not found")))?;
    let slots = vgroup.table_list.as_ref().map(Vec::len).unwrap_or(0);
    if sid < 1 || usize::try_from(sid).map_or(true, |slot| slot >= slots) {
      return Err(MetaError::InvalidTable(format!(
        "sid {sid} outside vgroup {vg_id} slots 1..{slots}"
      )));
    }
    match vgroup.table_at(sid) {
      Some(existing) if existing != table_id => Err(MetaError::InvalidTable(format!(
        "sid {sid} of vgroup {vg_id} is held by {existing}"
      ))),
      _ => Ok(()),
    }
  }

  /// Encode `msg` and hand it to the transport.
  pub fn send_create(&self, vgroup: &Vgroup, msg: &CreateTableMsg) -> Result<()> {
    let payload = msg.encode()?;
    self
      .transport
      .send_create_table(&IpSet::from_vgroup(vgroup, self.config.dnode_port), payload);
    Ok(())
  }

  /// Drop a child table. The removal message is sent before the record is
  /// deleted; a vgroup left without tables is dropped as well.
  pub fn drop_table(&self, db: &Database, table: &ChildTable) -> Result<RemoveTableMsg> {
    let vgroup = self.mgmt.get_vgroup(table.vg_id).ok_or_else(|| {
      MetaError::OperationFailed(format!(
        "vgroup {} of table {} not found",
        table.vg_id, table.table_id
      ))
    })?;

    let msg = RemoveTableMsg {
      table_id: table.table_id.clone(),
      sid: table.sid as u32,
      uid: table.uid,
      vpeers: VpeerDesc::internal(&vgroup.vnodes),
    };
    let payload = msg.encode()?;
    self
      .transport
      .send_remove_table(&IpSet::from_vgroup(&vgroup, self.config.dnode_port), payload);

    self.sdb.delete_row(&table.table_id).map_err(store_error)?;
    debug!(table = %table.table_id, vg_id = vgroup.vg_id, "child table dropped");

    let remaining = self
      .mgmt
      .get_vgroup(vgroup.vg_id)
      .map(|vgroup| vgroup.num_of_tables)
      .unwrap_or(0);
    if remaining <= 0 {
      info!(db = %db.name, vg_id = vgroup.vg_id, "last table gone, dropping vgroup");
      self.mgmt.drop_vgroup(&db.name, vgroup.vg_id);
    }
    Ok(msg)
  }

  pub fn get(&self, table_id: &str) -> Result<Arc<ChildTable>> {
    self
      .sdb
      .get_row(table_id)
      .ok_or_else(|| MetaError::NotFound(format!("child table {table_id}")))
  }

  /// Build the client-facing descriptor of `table`.
  pub fn describe(&self, db: &Database, table: &ChildTable, use_public_ip: bool) -> Result<TableMeta> {
    let super_table = table
      .super_table
      .clone()
      .or_else(|| self.mgmt.get_super_table(&table.super_table_id))
      .ok_or_else(|| {
        MetaError::InvalidTable(format!("super table {} not found", table.super_table_id))
      })?;
    let vgroup = self.mgmt.get_vgroup(table.vg_id).ok_or_else(|| {
      MetaError::InvalidTable(format!(
        "vgroup {} of table {} not found",
        table.vg_id, table.table_id
      ))
    })?;
    let vpeers = if use_public_ip {
      VpeerDesc::public(&vgroup.vnodes)
    } else {
      VpeerDesc::internal(&vgroup.vnodes)
    };

    Ok(TableMeta {
      table_id: table.table_id.clone(),
      uid: table.uid,
      sid: table.sid,
      vg_id: table.vg_id,
      sversion: super_table.sversion as u16,
      precision: db.precision,
      table_type: table.table_type,
      num_of_tags: super_table.num_of_tags,
      num_of_columns: super_table.num_of_columns,
      schema: super_table.schema.clone(),
      vpeers,
    })
  }

  /// Pick a vgroup and slot for a new table, following the database's
  /// preference list.
  pub fn choose_placement(&self, db_name: &str) -> Result<(Vgroup, SlotId)> {
    let db = self
      .mgmt
      .get_db(db_name)
      .ok_or_else(|| MetaError::NotFound(format!("db {db_name}")))?;
    for vg_id in &db.vgroups {
      let Some(sid) = self.mgmt.allocate_sid(*vg_id) else {
        continue;
      };
      if let Some(vgroup) = self.mgmt.get_vgroup(*vg_id) {
        return Ok((vgroup, sid));
      }
    }
    Err(MetaError::OperationFailed(format!(
      "db {db_name} has no free slot"
    )))
  }

  /// Apply a log frame shipped from the master.
  pub fn apply_frame(&self, frame: &LogFrame) -> Result<()> {
    self.sdb.apply_frame(frame)
  }

  pub fn num_of_tables(&self) -> usize {
    self.sdb.num_rows()
  }

  /// Every live table, oldest first.
  pub fn tables(&self) -> Vec<Arc<ChildTable>> {
    self.sdb.rows()
  }

  pub fn version(&self) -> u64 {
    self.sdb.version()
  }

  pub fn log_path(&self) -> Option<PathBuf> {
    self.sdb.log_path()
  }

  pub fn bootstrap_report(&self) -> BootstrapReport {
    self.report
  }

  pub fn sync(&self) -> Result<()> {
    self.sdb.sync()
  }
}

fn create_message(
  table: &ChildTable,
  super_table: &SuperTable,
  vgroup: &Vgroup,
  tag_data: &[u8],
) -> CreateTableMsg {
  CreateTableMsg {
    table_id: table.table_id.clone(),
    super_table_id: table.super_table_id.clone(),
    table_type: table.table_type,
    num_of_columns: super_table.num_of_columns,
    num_of_tags: super_table.num_of_tags,
    sid: table.sid as u32,
    sversion: super_table.sversion as u32,
    uid: table.uid,
    super_table_uid: super_table.uid,
    created_time: table.created_time as u64,
    vpeers: VpeerDesc::internal(&vgroup.vnodes),
    schema: super_table.schema.clone(),
    tag_data: tag_data.to_vec(),
  }
}

fn store_error(error: MetaError) -> MetaError {
  match error {
    MetaError::Store(_) => error,
    other => MetaError::Store(other.to_string()),
  }
}

fn now_millis() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|elapsed| elapsed.as_millis() as i64)
    .unwrap_or_default()
}
