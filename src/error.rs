//! Error types for the metadata core.

use thiserror::Error;

/// Stable error codes handed to the request layer for client translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
  Others = 0x0001,
  InvalidTable = 0x0008,
  ServOutOfMemory = 0x000c,
  SdbError = 0x000e,
  TooManyTables = 0x0011,
  NotFound = 0x0016,
  InvalidMessage = 0x0020,
}

impl ErrorCode {
  pub fn as_u16(self) -> u16 {
    self as u16
  }
}

#[derive(Debug, Error)]
pub enum MetaError {
  #[error("too many tables: {current} >= {max}")]
  TooManyTables { current: usize, max: usize },

  #[error("invalid table: {0}")]
  InvalidTable(String),

  #[error("out of memory: {0}")]
  OutOfMemory(String),

  #[error("store error: {0}")]
  Store(String),

  #[error("operation failed: {0}")]
  OperationFailed(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("buffer too short: need {need} bytes, got {got}")]
  ShortBuffer { need: usize, got: usize },

  #[error("invalid message: {0}")]
  InvalidMessage(String),

  #[error("layout version mismatch: found {found}, supported {supported}")]
  VersionMismatch { found: u32, supported: u32 },

  #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
  CrcMismatch { stored: u32, computed: u32 },

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("serialization error: {0}")]
  Serialization(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl MetaError {
  /// Code reported back to the requesting client.
  pub fn code(&self) -> ErrorCode {
    match self {
      MetaError::TooManyTables { .. } => ErrorCode::TooManyTables,
      MetaError::InvalidTable(_) => ErrorCode::InvalidTable,
      MetaError::OutOfMemory(_) => ErrorCode::ServOutOfMemory,
      MetaError::Store(_)
      | MetaError::CrcMismatch { .. }
      | MetaError::VersionMismatch { .. }
      | MetaError::Io(_) => ErrorCode::SdbError,
      MetaError::NotFound(_) => ErrorCode::NotFound,
      MetaError::ShortBuffer { .. } | MetaError::InvalidMessage(_) => ErrorCode::InvalidMessage,
      MetaError::OperationFailed(_) | MetaError::Config(_) | MetaError::Serialization(_) => {
        ErrorCode::Others
      }
    }
  }
}

pub type Result<T> = std::result::Result<T, MetaError>;
