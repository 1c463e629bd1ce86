use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tsmeta::dnode::{ChannelTransport, DnodeRequest};
use tsmeta::mgmt::{AccountManager, DbManager, MemCatalog, SuperTable, SuperTableManager, VgroupManager};
use tsmeta::types::{ColumnSchema, VnodeGid};
use tsmeta::wire::RemoveTableMsg;
use tsmeta::{ChildTables, CreateTableRequest, MetaConfig, MetaError};

const DB: &str = "root.db";

fn vnode(last: u8) -> VnodeGid {
  VnodeGid::new(
    Ipv4Addr::new(10, 0, 0, last),
    Ipv4Addr::new(203, 0, 113, last),
    i32::from(last),
  )
}

fn super_table(name: &str, num_of_columns: u16) -> SuperTable {
  let mut schema: Vec<ColumnSchema> = (0..num_of_columns)
    .map(|idx| ColumnSchema::new(7, 8, idx, format!("c{idx}")))
    .collect();
  schema.push(ColumnSchema::new(8, 16, num_of_columns, "host"));
  SuperTable {
    table_id: format!("{DB}.{name}"),
    uid: u64::from(num_of_columns),
    sversion: 1,
    num_of_columns,
    num_of_tags: 1,
    schema,
  }
}

fn catalog(max_sessions: i32, vgroups: &[i32]) -> Arc<MemCatalog> {
  let catalog = Arc::new(MemCatalog::new());
  catalog.create_account("root");
  catalog.create_db(DB, "root", max_sessions, 0).expect("create db");
  for vg_id in vgroups {
    catalog
      .create_vgroup(DB, *vg_id, vec![vnode(*vg_id as u8)])
      .expect("create vgroup");
  }
  catalog.create_super_table(super_table("cpu", 3));
  catalog.create_super_table(super_table("disk", 5));
  catalog
}

fn open(
  catalog: &Arc<MemCatalog>,
  max_tables: usize,
) -> (ChildTables, crossbeam_channel::Receiver<DnodeRequest>) {
  let (transport, rx) = ChannelTransport::new(1024);
  let tables = ChildTables::open(
    MetaConfig::new().max_tables(max_tables),
    catalog.clone(),
    Arc::new(transport),
  )
  .expect("open child tables");
  (tables, rx)
}

fn request(name: &str, super_table: &str) -> CreateTableRequest {
  CreateTableRequest {
    table_id: format!("{DB}.{name}"),
    super_table_id: format!("{DB}.{super_table}"),
    tag_data: vec![0u8; 16],
  }
}

fn create(tables: &ChildTables, name: &str, super_table: &str) -> i32 {
  let (vgroup, sid) = tables.choose_placement(DB).expect("placement");
  let (msg, table) = tables
    .create(&request(name, super_table), &vgroup, sid)
    .expect("create table");
  tables.send_create(&vgroup, &msg).expect("send create");
  table.vg_id
}

fn drop_named(catalog: &MemCatalog, tables: &ChildTables, name: &str) -> RemoveTableMsg {
  let db = catalog.get_db(DB).expect("db");
  let table = tables.get(&format!("{DB}.{name}")).expect("table");
  tables.drop_table(&db, &table).expect("drop table")
}

#[test]
fn create_then_get_matches_and_uids_are_unique() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, _rx) = open(&catalog, 64);

  let mut uids = HashSet::new();
  for idx in 0..10 {
    let name = format!("t{idx}");
    let (vgroup, sid) = tables.choose_placement(DB).expect("placement");
    let (_, created) = tables
      .create(&request(&name, "cpu"), &vgroup, sid)
      .expect("create");

    let fetched = tables.get(&format!("{DB}.{name}")).expect("get");
    assert_eq!(fetched.super_table_id, format!("{DB}.cpu"));
    assert_eq!(fetched.vg_id, vgroup.vg_id);
    assert_eq!(fetched.sid, sid);
    assert_eq!(fetched.uid, created.uid);
    assert!(uids.insert(fetched.uid), "uid reused: {}", fetched.uid);
  }
  assert_eq!(tables.num_of_tables(), 10);
}

#[test]
fn uid_stays_unique_when_a_slot_is_reused() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, _rx) = open(&catalog, 64);
  create(&tables, "keep", "cpu");
  create(&tables, "a", "cpu");
  let first = tables.get(&format!("{DB}.a")).expect("a");
  drop_named(&catalog, &tables, "a");

  let vgroup = catalog.get_vgroup(first.vg_id).expect("vgroup");
  let (_, second) = tables
    .create(&request("b", "cpu"), &vgroup, first.sid)
    .expect("reuse slot");
  assert_eq!(second.sid, first.sid);
  assert_ne!(second.uid, first.uid);
}

#[test]
fn account_usage_tracks_live_tables_through_random_churn() {
  let catalog = catalog(6, &[1, 2, 3]);
  let (tables, _rx) = open(&catalog, 256);
  let mut rng = StdRng::seed_from_u64(0x7ab1e5);
  let mut live: HashMap<String, i64> = HashMap::new();
  let mut next_vg = 4;

  for step in 0..300 {
    let drop = !live.is_empty() && rng.gen_bool(0.4);
    if drop {
      let idx = rng.gen_range(0..live.len());
      let name = live.keys().nth(idx).cloned().expect("live table");
      drop_named(&catalog, &tables, &name);
      live.remove(&name);
    } else {
      let placement = match tables.choose_placement(DB) {
        Ok(placement) => placement,
        Err(_) => {
          catalog
            .create_vgroup(DB, next_vg, vec![vnode(next_vg as u8)])
            .expect("grow vgroups");
          next_vg += 1;
          tables.choose_placement(DB).expect("placement after growth")
        }
      };
      let (super_name, series) = if rng.gen_bool(0.5) {
        ("cpu", 2)
      } else {
        ("disk", 4)
      };
      let name = format!("t{step}");
      tables
        .create(&request(&name, super_name), &placement.0, placement.1)
        .expect("create");
      live.insert(name, series);
    }

    let expected: i64 = live.values().sum();
    let account = catalog.get_account("root").expect("account");
    assert_eq!(account.time_series_used, expected, "after step {step}");
    assert_eq!(tables.num_of_tables(), live.len());
  }
}

#[test]
fn nearly_full_vgroup_moves_to_tail_and_back_to_head() {
  let catalog = catalog(4, &[1, 2]);
  let (tables, _rx) = open(&catalog, 64);

  assert_eq!(create(&tables, "t1", "cpu"), 1);
  assert_eq!(create(&tables, "t2", "cpu"), 1);
  assert_eq!(catalog.get_db(DB).expect("db").vgroups, vec![1, 2]);

  assert_eq!(create(&tables, "t3", "cpu"), 1);
  assert_eq!(catalog.get_vgroup(1).expect("vg1").num_of_tables, 3);
  assert_eq!(catalog.get_db(DB).expect("db").vgroups, vec![2, 1]);

  assert_eq!(create(&tables, "t4", "cpu"), 2);

  drop_named(&catalog, &tables, "t1");
  assert_eq!(catalog.get_vgroup(1).expect("vg1").num_of_tables, 2);
  assert_eq!(catalog.get_db(DB).expect("db").vgroups, vec![1, 2]);
}

#[test]
fn single_vgroup_is_never_reordered() {
  let catalog = catalog(4, &[1]);
  let (tables, _rx) = open(&catalog, 64);
  for name in ["t1", "t2", "t3"] {
    create(&tables, name, "cpu");
  }
  assert_eq!(catalog.get_db(DB).expect("db").vgroups, vec![1]);
  assert!(tables.choose_placement(DB).is_err());
}

#[test]
fn dropping_last_table_drops_the_vgroup() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, rx) = open(&catalog, 64);
  create(&tables, "t1", "cpu");
  let created = rx.try_recv().expect("create request");
  assert!(matches!(created, DnodeRequest::CreateTable { .. }));

  let msg = drop_named(&catalog, &tables, "t1");
  assert_eq!(msg.table_id, format!("{DB}.t1"));
  assert_eq!(msg.vpeers.len(), 1);

  let removed = rx.try_recv().expect("remove request");
  assert!(matches!(removed, DnodeRequest::RemoveTable { .. }));
  assert_eq!(
    RemoveTableMsg::decode(removed.payload()).expect("decode remove"),
    msg
  );

  assert_eq!(catalog.dropped_vgroups(), vec![1]);
  assert!(catalog.get_vgroup(1).is_none());
  assert_eq!(catalog.get_db(DB).expect("db").vgroups, vec![2]);
  assert_eq!(catalog.num_of_child_tables(&format!("{DB}.cpu")), Some(0));
  assert!(matches!(
    tables.get(&format!("{DB}.t1")),
    Err(MetaError::NotFound(_))
  ));
}

#[test]
fn drop_with_missing_vgroup_fails_and_keeps_the_record() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, _rx) = open(&catalog, 64);
  create(&tables, "t1", "cpu");
  let table = tables.get(&format!("{DB}.t1")).expect("table");
  let db = catalog.get_db(DB).expect("db");

  catalog.drop_vgroup(DB, table.vg_id);
  assert!(matches!(
    tables.drop_table(&db, &table),
    Err(MetaError::OperationFailed(_))
  ));
  assert!(tables.get(&format!("{DB}.t1")).is_ok());
}

#[test]
fn create_past_capacity_is_rejected_without_insert() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, _rx) = open(&catalog, 3);
  for name in ["t1", "t2", "t3"] {
    create(&tables, name, "cpu");
  }
  let version = tables.version();

  let (vgroup, sid) = tables.choose_placement(DB).expect("placement");
  let err = tables
    .create(&request("t4", "cpu"), &vgroup, sid)
    .expect_err("capacity reached");
  assert!(matches!(err, MetaError::TooManyTables { current: 3, max: 3 }));
  assert_eq!(tables.num_of_tables(), 3);
  assert_eq!(tables.version(), version);
  assert!(tables.get(&format!("{DB}.t4")).is_err());
  assert_eq!(catalog.get_account("root").expect("account").time_series_used, 6);
}

#[test]
fn describe_reports_placement_and_schema() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, _rx) = open(&catalog, 64);
  create(&tables, "t1", "disk");
  let table = tables.get(&format!("{DB}.t1")).expect("table");
  let db = catalog.get_db(DB).expect("db");

  let meta = tables.describe(&db, &table, true).expect("describe");
  assert_eq!(meta.uid, table.uid);
  assert_eq!(meta.sid, table.sid);
  assert_eq!(meta.vg_id, table.vg_id);
  assert_eq!(meta.num_of_columns, 5);
  assert_eq!(meta.num_of_tags, 1);
  assert_eq!(meta.schema.len(), 6);
  assert_eq!(meta.vpeers[0].ip, Ipv4Addr::new(203, 0, 113, 1));

  let bytes = meta.encode().expect("encode meta");
  assert_eq!(tsmeta::wire::TableMeta::decode(&bytes).expect("decode meta"), meta);

  let mut orphan = (*table).clone();
  orphan.vg_id = 99;
  assert!(matches!(
    tables.describe(&db, &orphan, false),
    Err(MetaError::InvalidTable(_))
  ));
}

#[test]
fn second_create_on_an_occupied_sid_is_rejected() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, _rx) = open(&catalog, 64);
  let (vgroup, sid) = tables.choose_placement(DB).expect("placement");
  tables
    .create(&request("a", "cpu"), &vgroup, sid)
    .expect("create a");

  assert!(matches!(
    tables.create(&request("b", "cpu"), &vgroup, sid),
    Err(MetaError::InvalidTable(_))
  ));
  assert!(tables.get(&format!("{DB}.b")).is_err());
  assert_eq!(tables.num_of_tables(), 1);
  assert_eq!(catalog.get_vgroup(vgroup.vg_id).expect("vgroup").num_of_tables, 1);
  assert_eq!(catalog.get_account("root").expect("account").time_series_used, 2);

  create(&tables, "c", "cpu");
  drop_named(&catalog, &tables, "a");
  assert!(catalog.get_vgroup(vgroup.vg_id).is_some());
  assert!(catalog.dropped_vgroups().is_empty());
  assert!(tables.get(&format!("{DB}.c")).is_ok());
}

#[test]
fn sid_outside_the_pool_is_rejected_without_side_effects() {
  let catalog = catalog(8, &[1, 2]);
  let (tables, _rx) = open(&catalog, 64);
  let vgroup = catalog.get_vgroup(1).expect("vgroup");

  for sid in [0, 8, 99, -1] {
    assert!(
      matches!(
        tables.create(&request("t1", "cpu"), &vgroup, sid),
        Err(MetaError::InvalidTable(_))
      ),
      "sid {sid} accepted"
    );
  }
  assert_eq!(tables.num_of_tables(), 0);
  assert_eq!(tables.version(), 0);
  assert_eq!(catalog.get_vgroup(1).expect("vgroup").num_of_tables, 0);
  assert_eq!(catalog.get_account("root").expect("account").time_series_used, 0);
  assert_eq!(catalog.get_db(DB).expect("db").num_of_tables, 0);
}
