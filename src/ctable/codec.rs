//! Persisted layout of a child-table record.
//!
//! Layout v1, little-endian:
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 1    | layout version   |
//! | 1      | 192  | table id         |
//! | 193    | 1    | table type       |
//! | 194    | 8    | uid              |
//! | 202    | 4    | sid              |
//! | 206    | 4    | vg id            |
//! | 210    | 8    | created time     |
//! | 218    | 192  | super table id   |
//! | 410    | 1    | reserved         |
//!
//! The super-table back reference is runtime state and never encoded.

use super::ChildTable;
use crate::constants::TABLE_ID_LEN;
use crate::error::{MetaError, Result};
use crate::types::TableType;
use crate::util::binary::{read_fixed_str, write_fixed_str};
use byteorder::{ByteOrder, LittleEndian};

pub const CHILD_TABLE_LAYOUT_VERSION: u8 = 1;

const OFF_VERSION: usize = 0;
const OFF_TABLE_ID: usize = OFF_VERSION + 1;
const OFF_TABLE_TYPE: usize = OFF_TABLE_ID + TABLE_ID_LEN;
const OFF_UID: usize = OFF_TABLE_TYPE + 1;
const OFF_SID: usize = OFF_UID + 8;
const OFF_VG_ID: usize = OFF_SID + 4;
const OFF_CREATED_TIME: usize = OFF_VG_ID + 4;
const OFF_SUPER_TABLE_ID: usize = OFF_CREATED_TIME + 8;
const OFF_RESERVED: usize = OFF_SUPER_TABLE_ID + TABLE_ID_LEN;

/// Bytes occupied by one encoded record.
pub const CHILD_TABLE_RECORD_SIZE: usize = OFF_RESERVED + 1;

/// Encode `table` into `buf`, returning the number of bytes written.
pub fn encode_child_table(table: &ChildTable, buf: &mut [u8]) -> Result<usize> {
  if buf.len() < CHILD_TABLE_RECORD_SIZE {
    return Err(MetaError::ShortBuffer {
      need: CHILD_TABLE_RECORD_SIZE,
      got: buf.len(),
    });
  }
  let buf = &mut buf[..CHILD_TABLE_RECORD_SIZE];

  buf[OFF_VERSION] = CHILD_TABLE_LAYOUT_VERSION;
  write_fixed_str(&mut buf[OFF_TABLE_ID..OFF_TABLE_TYPE], &table.table_id)?;
  buf[OFF_TABLE_TYPE] = table.table_type.as_u8();
  LittleEndian::write_u64(&mut buf[OFF_UID..OFF_SID], table.uid);
  LittleEndian::write_i32(&mut buf[OFF_SID..OFF_VG_ID], table.sid);
  LittleEndian::write_i32(&mut buf[OFF_VG_ID..OFF_CREATED_TIME], table.vg_id);
  LittleEndian::write_i64(
    &mut buf[OFF_CREATED_TIME..OFF_SUPER_TABLE_ID],
    table.created_time,
  );
  write_fixed_str(
    &mut buf[OFF_SUPER_TABLE_ID..OFF_RESERVED],
    &table.super_table_id,
  )?;
  buf[OFF_RESERVED] = 0;

  Ok(CHILD_TABLE_RECORD_SIZE)
}

/// Decode a record; the back reference is left unset.
pub fn decode_child_table(bytes: &[u8]) -> Result<ChildTable> {
  let mut table = ChildTable::default();
  reset_child_table(&mut table, bytes)?;
  Ok(table)
}

/// Overwrite the persisted fields of `table` in place.
///
/// On error `table` is left untouched.
pub fn reset_child_table(table: &mut ChildTable, bytes: &[u8]) -> Result<()> {
  if bytes.len() < CHILD_TABLE_RECORD_SIZE {
    return Err(MetaError::ShortBuffer {
      need: CHILD_TABLE_RECORD_SIZE,
      got: bytes.len(),
    });
  }

  let version = bytes[OFF_VERSION];
  if version != CHILD_TABLE_LAYOUT_VERSION {
    return Err(MetaError::VersionMismatch {
      found: u32::from(version),
      supported: u32::from(CHILD_TABLE_LAYOUT_VERSION),
    });
  }

  let table_type = TableType::from_u8(bytes[OFF_TABLE_TYPE]).ok_or_else(|| {
    MetaError::InvalidTable(format!("unknown table type {}", bytes[OFF_TABLE_TYPE]))
  })?;
  let table_id = read_fixed_str(&bytes[OFF_TABLE_ID..OFF_TABLE_TYPE])?;
  let super_table_id = read_fixed_str(&bytes[OFF_SUPER_TABLE_ID..OFF_RESERVED])?;

  table.table_id = table_id;
  table.table_type = table_type;
  table.uid = LittleEndian::read_u64(&bytes[OFF_UID..OFF_SID]);
  table.sid = LittleEndian::read_i32(&bytes[OFF_SID..OFF_VG_ID]);
  table.vg_id = LittleEndian::read_i32(&bytes[OFF_VG_ID..OFF_CREATED_TIME]);
  table.created_time = LittleEndian::read_i64(&bytes[OFF_CREATED_TIME..OFF_SUPER_TABLE_ID]);
  table.super_table_id = super_table_id;
  Ok(())
}
