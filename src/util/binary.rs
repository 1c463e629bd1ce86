//! Fixed-width string fields shared by the record codec and wire messages.

use crate::error::{MetaError, Result};
use std::io::Read;

/// Check that `value` fits in a NUL-terminated field of `width` bytes.
pub fn check_fixed_str(value: &str, width: usize) -> Result<()> {
  if value.len() >= width {
    return Err(MetaError::InvalidMessage(format!(
      "string of {} bytes does not fit a {width}-byte field",
      value.len()
    )));
  }
  if value.as_bytes().contains(&0) {
    return Err(MetaError::InvalidMessage(
      "string field contains an interior NUL".to_string(),
    ));
  }
  Ok(())
}

/// Write `value` into `field`, zero-filling the remainder.
pub fn write_fixed_str(field: &mut [u8], value: &str) -> Result<()> {
  check_fixed_str(value, field.len())?;
  let bytes = value.as_bytes();
  field[..bytes.len()].copy_from_slice(bytes);
  field[bytes.len()..].fill(0);
  Ok(())
}

/// Read a NUL-terminated string out of a fixed-width field.
pub fn read_fixed_str(field: &[u8]) -> Result<String> {
  let end = field.iter().position(|byte| *byte == 0).unwrap_or(field.len());
  std::str::from_utf8(&field[..end])
    .map(str::to_owned)
    .map_err(|error| MetaError::InvalidMessage(format!("string field is not UTF-8: {error}")))
}

/// Append `value` as a fixed-width field.
pub fn put_fixed_str(out: &mut Vec<u8>, value: &str, width: usize) -> Result<()> {
  check_fixed_str(value, width)?;
  out.extend_from_slice(value.as_bytes());
  out.resize(out.len() + (width - value.len()), 0);
  Ok(())
}

/// Read a fixed-width field from a stream.
pub fn get_fixed_str<R: Read>(reader: &mut R, width: usize) -> Result<String> {
  let mut field = vec![0u8; width];
  reader
    .read_exact(&mut field)
    .map_err(|_| MetaError::InvalidMessage(format!("truncated {width}-byte string field")))?;
  read_fixed_str(&field)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn fixed_field_zero_fills_and_reads_back() {
    let mut field = [0xAAu8; 8];
    write_fixed_str(&mut field, "abc").expect("write");
    assert_eq!(&field, b"abc\0\0\0\0\0");
    assert_eq!(read_fixed_str(&field).expect("read"), "abc");
  }

  #[test]
  fn rejects_value_without_room_for_terminator() {
    let mut field = [0u8; 4];
    assert!(write_fixed_str(&mut field, "abcd").is_err());
    assert!(write_fixed_str(&mut field, "abc").is_ok());
  }

  #[test]
  fn stream_helpers_agree() {
    let mut out = Vec::new();
    put_fixed_str(&mut out, "root.db.t1", 16).expect("put");
    assert_eq!(out.len(), 16);
    let value = get_fixed_str(&mut Cursor::new(&out), 16).expect("get");
    assert_eq!(value, "root.db.t1");
    assert!(get_fixed_str(&mut Cursor::new(&out[..10]), 16).is_err());
  }
}
