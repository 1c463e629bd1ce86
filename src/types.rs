//! Core identifiers and shared value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Vgroup (shard) identifier. `0` means the table was never placed.
pub type VgroupId = i32;

/// Slot index inside a vgroup's allocation pool.
pub type SlotId = i32;

/// Table kinds as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum TableType {
  Super = 0,
  #[default]
  Child = 1,
  Normal = 2,
  Stream = 3,
}

impl TableType {
  pub fn from_u8(value: u8) -> Option<Self> {
    match value {
      0 => Some(Self::Super),
      1 => Some(Self::Child),
      2 => Some(Self::Normal),
      3 => Some(Self::Stream),
      _ => None,
    }
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }
}

impl fmt::Display for TableType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let value = match self {
      TableType::Super => "super",
      TableType::Child => "child",
      TableType::Normal => "normal",
      TableType::Stream => "stream",
    };
    write!(f, "{value}")
  }
}

/// One column or tag of a super table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
  pub col_type: u8,
  pub bytes: u16,
  pub col_id: u16,
  pub name: String,
}

impl ColumnSchema {
  pub fn new(col_type: u8, bytes: u16, col_id: u16, name: impl Into<String>) -> Self {
    Self {
      col_type,
      bytes,
      col_id,
      name: name.into(),
    }
  }
}

/// Placement of one vgroup replica on a storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnodeGid {
  pub ip: Ipv4Addr,
  pub public_ip: Ipv4Addr,
  pub vnode: i32,
}

impl VnodeGid {
  pub fn new(ip: Ipv4Addr, public_ip: Ipv4Addr, vnode: i32) -> Self {
    Self {
      ip,
      public_ip,
      vnode,
    }
  }
}

/// Compose a table uid from its placement and the store version at creation.
///
/// The low 16 bits carry the store version so that a reused slot still yields
/// a fresh uid.
pub fn compose_uid(vg_id: VgroupId, sid: SlotId, store_version: u64) -> u64 {
  ((vg_id as u64) << 40)
    .wrapping_add(((sid as u64) & ((1 << 24) - 1)) << 16)
    .wrapping_add(store_version & ((1 << 16) - 1))
}

/// Database name encoded in a table id (`acct.db.table` -> `acct.db`).
pub fn db_name_of_table(table_id: &str) -> Option<&str> {
  let first = table_id.find('.')?;
  let second = table_id[first + 1..].find('.')? + first + 1;
  Some(&table_id[..second])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn uid_packs_vgroup_slot_and_version() {
    let uid = compose_uid(3, 17, 0x1_0005);
    assert_eq!(uid >> 40, 3);
    assert_eq!((uid >> 16) & 0xFF_FFFF, 17);
    assert_eq!(uid & 0xFFFF, 5);
  }

  #[test]
  fn uid_changes_when_slot_is_reused() {
    let first = compose_uid(2, 9, 40);
    let second = compose_uid(2, 9, 41);
    assert_ne!(first, second);
  }

  #[test]
  fn db_name_is_first_two_components() {
    assert_eq!(db_name_of_table("root.metrics.t1"), Some("root.metrics"));
    assert_eq!(db_name_of_table("root.metrics.t.with.dots"), Some("root.metrics"));
    assert_eq!(db_name_of_table("root.metrics"), None);
    assert_eq!(db_name_of_table("plain"), None);
  }

  #[test]
  fn table_type_roundtrips_through_u8() {
    for kind in [
      TableType::Super,
      TableType::Child,
      TableType::Normal,
      TableType::Stream,
    ] {
      assert_eq!(TableType::from_u8(kind.as_u8()), Some(kind));
    }
    assert_eq!(TableType::from_u8(9), None);
  }
}
