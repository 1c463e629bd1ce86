//! Node configuration for the child-table core.

use crate::constants::{DEFAULT_DNODE_PORT, DEFAULT_MAX_TABLES, DEFAULT_TRANSPORT_QUEUE};
use crate::error::{MetaError, Result};
use crate::replication::ReplicationRole;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
  /// Maximum number of child tables; also sizes the store.
  pub max_tables: usize,
  /// Directory holding the store log. `None` keeps the store in memory.
  pub data_dir: Option<PathBuf>,
  pub replication_role: ReplicationRole,
  /// Port storage nodes accept management requests on.
  pub dnode_port: u16,
  /// Capacity of the outbound storage-node queue.
  pub transport_queue: usize,
}

impl Default for MetaConfig {
  fn default() -> Self {
    Self {
      max_tables: DEFAULT_MAX_TABLES,
      data_dir: None,
      replication_role: ReplicationRole::Disabled,
      dnode_port: DEFAULT_DNODE_PORT,
      transport_queue: DEFAULT_TRANSPORT_QUEUE,
    }
  }
}

impl MetaConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn max_tables(mut self, value: usize) -> Self {
    self.max_tables = value;
    self
  }

  pub fn data_dir(mut self, path: impl AsRef<Path>) -> Self {
    self.data_dir = Some(path.as_ref().to_path_buf());
    self
  }

  pub fn replication_role(mut self, role: ReplicationRole) -> Self {
    self.replication_role = role;
    self
  }

  pub fn dnode_port(mut self, port: u16) -> Self {
    self.dnode_port = port;
    self
  }

  pub fn transport_queue(mut self, capacity: usize) -> Self {
    self.transport_queue = capacity;
    self
  }

  pub fn from_json_str(raw: &str) -> Result<Self> {
    let config: MetaConfig = serde_json::from_str(raw)
      .map_err(|error| MetaError::Serialization(format!("decode meta config: {error}")))?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    Self::from_json_str(&raw)
  }

  pub fn validate(&self) -> Result<()> {
    if self.max_tables == 0 {
      return Err(MetaError::Config("max_tables must be positive".to_string()));
    }
    if self.transport_queue == 0 {
      return Err(MetaError::Config(
        "transport_queue must be positive".to_string(),
      ));
    }
    if let Some(dir) = self.data_dir.as_ref() {
      if dir.exists() && !dir.is_dir() {
        return Err(MetaError::Config(format!(
          "data_dir must be a directory: {}",
          dir.display()
        )));
      }
    }
    Ok(())
  }
}
