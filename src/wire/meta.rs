//! Table metadata descriptor returned to clients.

use super::{
  alloc_message, read_schema, read_vpeers, to_u32, truncated, write_schema, write_vpeers,
  VpeerDesc, SCHEMA_ENTRY_SIZE, VPEER_DESC_SIZE,
};
use crate::constants::TABLE_ID_LEN;
use crate::error::{MetaError, Result};
use crate::types::{ColumnSchema, SlotId, TableType, VgroupId};
use crate::util::binary::{get_fixed_str, put_fixed_str};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub const TABLE_META_HEADER_SIZE: usize = TABLE_ID_LEN + 8 + 4 + 4 + 2 + 1 + 1 + 2 + 2 + 1 + 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
  pub table_id: String,
  pub uid: u64,
  pub sid: SlotId,
  pub vg_id: VgroupId,
  pub sversion: u16,
  pub precision: u8,
  pub table_type: TableType,
  pub num_of_tags: u16,
  pub num_of_columns: u16,
  /// Columns followed by tags.
  pub schema: Vec<ColumnSchema>,
  pub vpeers: Vec<VpeerDesc>,
}

impl TableMeta {
  pub fn encoded_len(&self) -> usize {
    TABLE_META_HEADER_SIZE
      + self.vpeers.len() * VPEER_DESC_SIZE
      + self.schema.len() * SCHEMA_ENTRY_SIZE
  }

  pub fn encode(&self) -> Result<Vec<u8>> {
    let vpeer_count = u8::try_from(self.vpeers.len()).map_err(|_| {
      MetaError::InvalidMessage(format!("too many replicas: {}", self.vpeers.len()))
    })?;
    let cont_len = self.encoded_len();
    let mut out = alloc_message(cont_len)?;
    put_fixed_str(&mut out, &self.table_id, TABLE_ID_LEN)?;
    out.write_u64::<BigEndian>(self.uid)?;
    out.write_u32::<BigEndian>(self.sid as u32)?;
    out.write_u32::<BigEndian>(self.vg_id as u32)?;
    out.write_u16::<BigEndian>(self.sversion)?;
    out.write_u8(self.precision)?;
    out.write_u8(self.table_type.as_u8())?;
    out.write_u16::<BigEndian>(self.num_of_tags)?;
    out.write_u16::<BigEndian>(self.num_of_columns)?;
    out.write_u8(vpeer_count)?;
    out.write_u32::<BigEndian>(to_u32(cont_len, "table meta")?)?;
    write_vpeers(&mut out, &self.vpeers)?;
    write_schema(&mut out, &self.schema)?;
    Ok(out)
  }

  pub fn decode(bytes: &[u8]) -> Result<Self> {
    if bytes.len() < TABLE_META_HEADER_SIZE {
      return Err(MetaError::ShortBuffer {
        need: TABLE_META_HEADER_SIZE,
        got: bytes.len(),
      });
    }
    let mut cursor = Cursor::new(bytes);
    let table_id = get_fixed_str(&mut cursor, TABLE_ID_LEN)?;
    let uid = cursor.read_u64::<BigEndian>().map_err(truncated)?;
    let sid = cursor.read_u32::<BigEndian>().map_err(truncated)? as i32;
    let vg_id = cursor.read_u32::<BigEndian>().map_err(truncated)? as i32;
    let sversion = cursor.read_u16::<BigEndian>().map_err(truncated)?;
    let precision = cursor.read_u8().map_err(truncated)?;
    let raw_type = cursor.read_u8().map_err(truncated)?;
    let table_type = TableType::from_u8(raw_type)
      .ok_or_else(|| MetaError::InvalidMessage(format!("unknown table type {raw_type}")))?;
    let num_of_tags = cursor.read_u16::<BigEndian>().map_err(truncated)?;
    let num_of_columns = cursor.read_u16::<BigEndian>().map_err(truncated)?;
    let vpeer_count = usize::from(cursor.read_u8().map_err(truncated)?);
    let cont_len = cursor.read_u32::<BigEndian>().map_err(truncated)? as usize;
    if cont_len != bytes.len() {
      return Err(MetaError::InvalidMessage(format!(
        "content length {cont_len} does not match {} received bytes",
        bytes.len()
      )));
    }
    let vpeers = read_vpeers(&mut cursor, vpeer_count)?;
    let total_cols = usize::from(num_of_columns) + usize::from(num_of_tags);
    let schema = read_schema(&mut cursor, total_cols)?;
    Ok(Self {
      table_id,
      uid,
      sid,
      vg_id,
      sversion,
      precision,
      table_type,
      num_of_tags,
      num_of_columns,
      schema,
      vpeers,
    })
  }
}
