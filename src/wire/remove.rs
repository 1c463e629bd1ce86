//! Drop-table request sent to the storage nodes of a vgroup.

use super::{alloc_message, read_vpeers, to_u32, truncated, write_vpeers, VpeerDesc, VPEER_DESC_SIZE};
use crate::constants::TABLE_ID_LEN;
use crate::error::{MetaError, Result};
use crate::util::binary::{get_fixed_str, put_fixed_str};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub const REMOVE_TABLE_HEADER_SIZE: usize = TABLE_ID_LEN + 4 + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveTableMsg {
  pub table_id: String,
  pub sid: u32,
  pub uid: u64,
  pub vpeers: Vec<VpeerDesc>,
}

impl RemoveTableMsg {
  pub fn encoded_len(&self) -> usize {
    REMOVE_TABLE_HEADER_SIZE + self.vpeers.len() * VPEER_DESC_SIZE
  }

  pub fn encode(&self) -> Result<Vec<u8>> {
    let mut out = alloc_message(self.encoded_len())?;
    put_fixed_str(&mut out, &self.table_id, TABLE_ID_LEN)?;
    out.write_u32::<BigEndian>(self.sid)?;
    out.write_u64::<BigEndian>(self.uid)?;
    out.write_u32::<BigEndian>(to_u32(self.vpeers.len(), "replica count")?)?;
    write_vpeers(&mut out, &self.vpeers)?;
    Ok(out)
  }

  pub fn decode(bytes: &[u8]) -> Result<Self> {
    if bytes.len() < REMOVE_TABLE_HEADER_SIZE {
      return Err(MetaError::ShortBuffer {
        need: REMOVE_TABLE_HEADER_SIZE,
        got: bytes.len(),
      });
    }
    let mut cursor = Cursor::new(bytes);
    let table_id = get_fixed_str(&mut cursor, TABLE_ID_LEN)?;
    let sid = cursor.read_u32::<BigEndian>().map_err(truncated)?;
    let uid = cursor.read_u64::<BigEndian>().map_err(truncated)?;
    let count = cursor.read_u32::<BigEndian>().map_err(truncated)? as usize;
    if bytes.len() != REMOVE_TABLE_HEADER_SIZE + count * VPEER_DESC_SIZE {
      return Err(MetaError::InvalidMessage(format!(
        "remove message of {} bytes does not hold {count} replicas",
        bytes.len()
      )));
    }
    let vpeers = read_vpeers(&mut cursor, count)?;
    Ok(Self {
      table_id,
      sid,
      uid,
      vpeers,
    })
  }
}
