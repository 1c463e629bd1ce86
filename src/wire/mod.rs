//! Messages exchanged with storage nodes and clients.
//!
//! Every multi-byte integer is big-endian (network order). Each message type
//! owns its encode/decode pair so the byte layout can be checked on its own.

pub mod create;
pub mod meta;
pub mod remove;

use crate::constants::COL_NAME_LEN;
use crate::error::{MetaError, Result};
use crate::types::{ColumnSchema, VnodeGid};
use crate::util::binary::{get_fixed_str, put_fixed_str};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::net::Ipv4Addr;

pub use create::CreateTableMsg;
pub use meta::TableMeta;
pub use remove::RemoveTableMsg;

pub const VPEER_DESC_SIZE: usize = 8;
pub const SCHEMA_ENTRY_SIZE: usize = 1 + 2 + 2 + COL_NAME_LEN;

/// Address of one storage-node replica of a vgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpeerDesc {
  pub ip: Ipv4Addr,
  pub vnode: i32,
}

impl VpeerDesc {
  /// Internal address of every replica.
  pub fn internal(vnodes: &[VnodeGid]) -> Vec<VpeerDesc> {
    vnodes
      .iter()
      .map(|gid| VpeerDesc {
        ip: gid.ip,
        vnode: gid.vnode,
      })
      .collect()
  }

  /// Address of every replica as reachable from outside the cluster.
  pub fn public(vnodes: &[VnodeGid]) -> Vec<VpeerDesc> {
    vnodes
      .iter()
      .map(|gid| VpeerDesc {
        ip: gid.public_ip,
        vnode: gid.vnode,
      })
      .collect()
  }
}

/// Reserve exactly `len` bytes, reporting allocation failure as an error.
pub(crate) fn alloc_message(len: usize) -> Result<Vec<u8>> {
  let mut out = Vec::new();
  out
    .try_reserve_exact(len)
    .map_err(|error| MetaError::OutOfMemory(format!("message of {len} bytes: {error}")))?;
  Ok(out)
}

pub(crate) fn write_vpeers(out: &mut Vec<u8>, vpeers: &[VpeerDesc]) -> Result<()> {
  for vpeer in vpeers {
    out.write_u32::<BigEndian>(u32::from(vpeer.ip))?;
    out.write_u32::<BigEndian>(vpeer.vnode as u32)?;
  }
  Ok(())
}

pub(crate) fn read_vpeers<R: Read>(reader: &mut R, count: usize) -> Result<Vec<VpeerDesc>> {
  let mut vpeers = Vec::with_capacity(count.min(64));
  for _ in 0..count {
    let ip = Ipv4Addr::from(reader.read_u32::<BigEndian>().map_err(truncated)?);
    let vnode = reader.read_u32::<BigEndian>().map_err(truncated)? as i32;
    vpeers.push(VpeerDesc { ip, vnode });
  }
  Ok(vpeers)
}

pub(crate) fn write_schema(out: &mut Vec<u8>, schema: &[ColumnSchema]) -> Result<()> {
  for column in schema {
    out.write_u8(column.col_type)?;
    out.write_u16::<BigEndian>(column.bytes)?;
    out.write_u16::<BigEndian>(column.col_id)?;
    put_fixed_str(out, &column.name, COL_NAME_LEN)?;
  }
  Ok(())
}

pub(crate) fn read_schema<R: Read>(reader: &mut R, count: usize) -> Result<Vec<ColumnSchema>> {
  let mut schema = Vec::with_capacity(count.min(1024));
  for _ in 0..count {
    let col_type = reader.read_u8().map_err(truncated)?;
    let bytes = reader.read_u16::<BigEndian>().map_err(truncated)?;
    let col_id = reader.read_u16::<BigEndian>().map_err(truncated)?;
    let name = get_fixed_str(reader, COL_NAME_LEN)?;
    schema.push(ColumnSchema {
      col_type,
      bytes,
      col_id,
      name,
    });
  }
  Ok(schema)
}

pub(crate) fn truncated(error: std::io::Error) -> MetaError {
  MetaError::InvalidMessage(format!("message truncated: {error}"))
}

pub(crate) fn to_u32(value: usize, what: &str) -> Result<u32> {
  u32::try_from(value).map_err(|_| MetaError::InvalidMessage(format!("{what} too large: {value}")))
}
