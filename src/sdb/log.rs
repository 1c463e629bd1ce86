//! Append-only action log backing a store.
//!
//! Each committed insert/delete/update is written as one CRC-framed record.
//! The same frames are what a master ships to its replicas.

use super::ActionKind;
use crate::error::{MetaError, Result};
use crate::util::crc::crc32_parts;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const FRAME_MAGIC: &[u8; 4] = b"SDB1";
pub const FRAME_HEADER_BYTES: usize = 28;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
  pub action: ActionKind,
  /// Store version after this frame was applied.
  pub version: u64,
  pub key: String,
  pub payload: Vec<u8>,
}

impl LogFrame {
  pub fn new(action: ActionKind, version: u64, key: impl Into<String>, payload: Vec<u8>) -> Self {
    Self {
      action,
      version,
      key: key.into(),
      payload,
    }
  }
}

pub fn encode_frame(frame: &LogFrame) -> Result<Vec<u8>> {
  if !frame.action.is_logged() {
    return Err(MetaError::Store(format!(
      "action {} is not a log action",
      frame.action
    )));
  }
  let key_len = u32::try_from(frame.key.len())
    .map_err(|_| MetaError::Store(format!("log key too large: {}", frame.key.len())))?;
  let payload_len = u32::try_from(frame.payload.len())
    .map_err(|_| MetaError::Store(format!("log payload too large: {}", frame.payload.len())))?;

  let mut bytes = Vec::with_capacity(FRAME_HEADER_BYTES + frame.key.len() + frame.payload.len());
  bytes.extend_from_slice(FRAME_MAGIC);
  bytes.write_u8(frame.action.as_u8())?;
  bytes.extend_from_slice(&[0u8; 3]);
  bytes.write_u64::<LittleEndian>(frame.version)?;
  bytes.write_u32::<LittleEndian>(key_len)?;
  bytes.write_u32::<LittleEndian>(payload_len)?;
  bytes.write_u32::<LittleEndian>(crc32_parts(&[frame.key.as_bytes(), &frame.payload]))?;
  bytes.extend_from_slice(frame.key.as_bytes());
  bytes.extend_from_slice(&frame.payload);
  Ok(bytes)
}

/// Decode one frame from the front of `bytes`, returning it and its length.
pub fn decode_frame(bytes: &[u8]) -> Result<(LogFrame, usize)> {
  if bytes.len() < FRAME_HEADER_BYTES {
    return Err(MetaError::ShortBuffer {
      need: FRAME_HEADER_BYTES,
      got: bytes.len(),
    });
  }
  if &bytes[..4] != FRAME_MAGIC {
    return Err(MetaError::Store("log frame has invalid magic".to_string()));
  }

  let mut cursor = Cursor::new(&bytes[4..FRAME_HEADER_BYTES]);
  let action_raw = cursor.read_u8()?;
  let action = ActionKind::from_u8(action_raw)
    .filter(|action| action.is_logged())
    .ok_or_else(|| MetaError::Store(format!("log frame has invalid action {action_raw}")))?;
  cursor.seek(SeekFrom::Current(3))?;
  let version = cursor.read_u64::<LittleEndian>()?;
  let key_len = cursor.read_u32::<LittleEndian>()? as usize;
  let payload_len = cursor.read_u32::<LittleEndian>()? as usize;
  let stored = cursor.read_u32::<LittleEndian>()?;

  let total = FRAME_HEADER_BYTES + key_len + payload_len;
  if bytes.len() < total {
    return Err(MetaError::ShortBuffer {
      need: total,
      got: bytes.len(),
    });
  }

  let key_bytes = &bytes[FRAME_HEADER_BYTES..FRAME_HEADER_BYTES + key_len];
  let payload = &bytes[FRAME_HEADER_BYTES + key_len..total];
  let computed = crc32_parts(&[key_bytes, payload]);
  if computed != stored {
    return Err(MetaError::CrcMismatch { stored, computed });
  }

  let key = std::str::from_utf8(key_bytes)
    .map_err(|error| MetaError::Store(format!("log frame key is not UTF-8: {error}")))?
    .to_string();

  Ok((
    LogFrame {
      action,
      version,
      key,
      payload: payload.to_vec(),
    },
    total,
  ))
}

/// Exclusive handle on a store log file.
#[derive(Debug)]
pub struct SdbLog {
  path: PathBuf,
  file: File,
}

impl SdbLog {
  /// Open (or create) the log and replay its valid prefix.
  ///
  /// A torn or corrupt tail is truncated so later appends stay aligned.
  pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<LogFrame>)> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
      .create(true)
      .truncate(false)
      .read(true)
      .write(true)
      .open(&path)?;
    file.try_lock_exclusive().map_err(|error| {
      MetaError::Store(format!("store log {} is locked: {error}", path.display()))
    })?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let mut frames = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
      match decode_frame(&bytes[offset..]) {
        Ok((frame, len)) => {
          frames.push(frame);
          offset += len;
        }
        Err(error) => {
          warn!(
            path = %path.display(),
            offset,
            dropped = bytes.len() - offset,
            %error,
            "truncating corrupt store log tail"
          );
          break;
        }
      }
    }

    if offset < bytes.len() {
      file.set_len(offset as u64)?;
      file.sync_all()?;
    }
    file.seek(SeekFrom::End(0))?;

    Ok((Self { path, file }, frames))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn append(&mut self, frame: &LogFrame) -> Result<()> {
    let bytes = encode_frame(frame)?;
    self.file.write_all(&bytes)?;
    Ok(())
  }

  pub fn sync(&mut self) -> Result<()> {
    self.file.sync_all()?;
    Ok(())
  }
}

impl Drop for SdbLog {
  fn drop(&mut self) {
    let _ = fs2::FileExt::unlock(&self.file);
  }
}

/// Read every valid frame of a log without taking its lock.
///
/// Used by replicas pulling from a master's log.
pub fn read_frames(path: impl AsRef<Path>) -> Result<Vec<LogFrame>> {
  let bytes = std::fs::read(path.as_ref())?;
  let mut frames = Vec::new();
  let mut offset = 0usize;
  while offset < bytes.len() {
    let (frame, len) = decode_frame(&bytes[offset..])?;
    frames.push(frame);
    offset += len;
  }
  Ok(frames)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn insert_frame(version: u64) -> LogFrame {
    LogFrame::new(ActionKind::Insert, version, "root.db.t1", vec![1, 2, 3, 4])
  }

  #[test]
  fn roundtrip_frame() {
    let bytes = encode_frame(&insert_frame(7)).expect("encode");
    let (decoded, len) = decode_frame(&bytes).expect("decode");
    assert_eq!(len, bytes.len());
    assert_eq!(decoded, insert_frame(7));
  }

  #[test]
  fn header_fields_are_little_endian() {
    let bytes = encode_frame(&insert_frame(0x0102)).expect("encode");
    assert_eq!(bytes.len(), FRAME_HEADER_BYTES + 10 + 4);
    assert_eq!(&bytes[..4], FRAME_MAGIC);
    assert_eq!(bytes[4], ActionKind::Insert.as_u8());
    assert_eq!(&bytes[8..16], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    assert_eq!(&bytes[16..20], &[10, 0, 0, 0]);
    assert_eq!(&bytes[20..24], &[4, 0, 0, 0]);
    assert_eq!(&bytes[FRAME_HEADER_BYTES..FRAME_HEADER_BYTES + 10], b"root.db.t1");
  }

  #[test]
  fn rejects_bad_magic_and_crc() {
    let mut bytes = encode_frame(&insert_frame(1)).expect("encode");
    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    assert!(decode_frame(&bad_magic).is_err());

    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    assert!(matches!(
      decode_frame(&bytes),
      Err(MetaError::CrcMismatch { .. })
    ));
  }

  #[test]
  fn non_log_actions_are_not_framed() {
    let frame = LogFrame::new(ActionKind::Encode, 1, "k", Vec::new());
    assert!(encode_frame(&frame).is_err());
  }

  #[test]
  fn open_truncates_torn_tail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ctables.log");

    {
      let (mut log, frames) = SdbLog::open(&path).expect("open");
      assert!(frames.is_empty());
      log.append(&insert_frame(1)).expect("append");
      log.append(&insert_frame(2)).expect("append");
      log.sync().expect("sync");
    }

    let full_len = std::fs::metadata(&path).expect("metadata").len();
    let mut bytes = std::fs::read(&path).expect("read");
    bytes.truncate(bytes.len() - 2);
    std::fs::write(&path, &bytes).expect("write torn");

    let (_log, frames) = SdbLog::open(&path).expect("reopen");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].version, 1);
    let kept_len = std::fs::metadata(&path).expect("metadata").len();
    assert_eq!(kept_len, full_len / 2);
  }

  #[test]
  fn second_open_is_refused_while_locked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ctables.log");
    let (_log, _) = SdbLog::open(&path).expect("open");
    assert!(SdbLog::open(&path).is_err());
  }
}
