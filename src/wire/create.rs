//! Create-table request sent to the storage nodes of a vgroup.

use super::{
  alloc_message, read_schema, read_vpeers, to_u32, truncated, write_schema, write_vpeers,
  VpeerDesc, SCHEMA_ENTRY_SIZE, VPEER_DESC_SIZE,
};
use crate::constants::TABLE_ID_LEN;
use crate::error::{MetaError, Result};
use crate::types::{ColumnSchema, TableType};
use crate::util::binary::{get_fixed_str, put_fixed_str};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

/// Size of the fixed header preceding the replica, schema and tag sections.
pub const CREATE_TABLE_HEADER_SIZE: usize = 2 * TABLE_ID_LEN + 1 + 2 + 2 + 6 * 4 + 3 * 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableMsg {
  pub table_id: String,
  pub super_table_id: String,
  pub table_type: TableType,
  pub num_of_columns: u16,
  pub num_of_tags: u16,
  pub sid: u32,
  pub sversion: u32,
  pub uid: u64,
  pub super_table_uid: u64,
  pub created_time: u64,
  pub vpeers: Vec<VpeerDesc>,
  /// Columns followed by tags.
  pub schema: Vec<ColumnSchema>,
  pub tag_data: Vec<u8>,
}

impl CreateTableMsg {
  pub fn encoded_len(&self) -> usize {
    CREATE_TABLE_HEADER_SIZE
      + self.vpeers.len() * VPEER_DESC_SIZE
      + self.schema.len() * SCHEMA_ENTRY_SIZE
      + self.tag_data.len()
  }

  pub fn encode(&self) -> Result<Vec<u8>> {
    let total_cols = usize::from(self.num_of_columns) + usize::from(self.num_of_tags);
    if self.schema.len() != total_cols {
      return Err(MetaError::InvalidMessage(format!(
        "schema has {} entries, expected {total_cols}",
        self.schema.len()
      )));
    }

    let cont_len = self.encoded_len();
    let mut out = alloc_message(cont_len)?;
    put_fixed_str(&mut out, &self.table_id, TABLE_ID_LEN)?;
    put_fixed_str(&mut out, &self.super_table_id, TABLE_ID_LEN)?;
    out.write_u8(self.table_type.as_u8())?;
    out.write_u16::<BigEndian>(self.num_of_columns)?;
    out.write_u16::<BigEndian>(self.num_of_tags)?;
    out.write_u32::<BigEndian>(self.sid)?;
    out.write_u32::<BigEndian>(self.sversion)?;
    out.write_u32::<BigEndian>(to_u32(self.tag_data.len(), "tag data")?)?;
    // sql data is never carried for child tables
    out.write_u32::<BigEndian>(0)?;
    out.write_u32::<BigEndian>(to_u32(cont_len, "message")?)?;
    out.write_u32::<BigEndian>(to_u32(self.vpeers.len(), "replica count")?)?;
    out.write_u64::<BigEndian>(self.uid)?;
    out.write_u64::<BigEndian>(self.super_table_uid)?;
    out.write_u64::<BigEndian>(self.created_time)?;
    write_vpeers(&mut out, &self.vpeers)?;
    write_schema(&mut out, &self.schema)?;
    out.extend_from_slice(&self.tag_data);

    debug_assert_eq!(out.len(), cont_len);
    Ok(out)
  }

  /// Parse a message as a storage node would.
  pub fn decode(bytes: &[u8]) -> Result<Self> {
    if bytes.len() < CREATE_TABLE_HEADER_SIZE {
      return Err(MetaError::ShortBuffer {
        need: CREATE_TABLE_HEADER_SIZE,
        got: bytes.len(),
      });
    }

    let mut cursor = Cursor::new(bytes);
    let table_id = get_fixed_str(&mut cursor, TABLE_ID_LEN)?;
    let super_table_id = get_fixed_str(&mut cursor, TABLE_ID_LEN)?;
    let raw_type = cursor.read_u8().map_err(truncated)?;
    let table_type = TableType::from_u8(raw_type)
      .ok_or_else(|| MetaError::InvalidMessage(format!("unknown table type {raw_type}")))?;
    let num_of_columns = cursor.read_u16::<BigEndian>().map_err(truncated)?;
    let num_of_tags = cursor.read_u16::<BigEndian>().map_err(truncated)?;
    let sid = cursor.read_u32::<BigEndian>().map_err(truncated)?;
    let sversion = cursor.read_u32::<BigEndian>().map_err(truncated)?;
    let tag_data_len = cursor.read_u32::<BigEndian>().map_err(truncated)? as usize;
    let sql_data_len = cursor.read_u32::<BigEndian>().map_err(truncated)?;
    let cont_len = cursor.read_u32::<BigEndian>().map_err(truncated)? as usize;
    let num_of_vpeers = cursor.read_u32::<BigEndian>().map_err(truncated)? as usize;
    let uid = cursor.read_u64::<BigEndian>().map_err(truncated)?;
    let super_table_uid = cursor.read_u64::<BigEndian>().map_err(truncated)?;
    let created_time = cursor.read_u64::<BigEndian>().map_err(truncated)?;

    if sql_data_len != 0 {
      return Err(MetaError::InvalidMessage(format!(
        "unexpected sql data of {sql_data_len} bytes"
      )));
    }
    if cont_len != bytes.len() {
      return Err(MetaError::InvalidMessage(format!(
        "content length {cont_len} does not match {} received bytes",
        bytes.len()
      )));
    }

    let total_cols = usize::from(num_of_columns) + usize::from(num_of_tags);
    let expected = CREATE_TABLE_HEADER_SIZE
      + num_of_vpeers * VPEER_DESC_SIZE
      + total_cols * SCHEMA_ENTRY_SIZE
      + tag_data_len;
    if expected != cont_len {
      return Err(MetaError::InvalidMessage(format!(
        "sections add up to {expected} bytes, content length is {cont_len}"
      )));
    }

    let vpeers = read_vpeers(&mut cursor, num_of_vpeers)?;
    let schema = read_schema(&mut cursor, total_cols)?;
    let mut tag_data = vec![0u8; tag_data_len];
    cursor.read_exact(&mut tag_data).map_err(truncated)?;

    Ok(Self {
      table_id,
      super_table_id,
      table_type,
      num_of_columns,
      num_of_tags,
      sid,
      sversion,
      uid,
      super_table_uid,
      created_time,
      vpeers,
      schema,
      tag_data,
    })
  }
}
