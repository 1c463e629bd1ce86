//! Replication role type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationRole {
  /// Single-node deployment; behaves as the master.
  #[default]
  Disabled,
  Primary,
  Replica,
}

impl ReplicationRole {
  /// Whether this node allocates slot ids itself rather than verifying them.
  pub fn is_master(self) -> bool {
    !matches!(self, ReplicationRole::Replica)
  }
}

impl fmt::Display for ReplicationRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let value = match self {
      ReplicationRole::Disabled => "disabled",
      ReplicationRole::Primary => "primary",
      ReplicationRole::Replica => "replica",
    };
    write!(f, "{value}")
  }
}

impl FromStr for ReplicationRole {
  type Err = ReplicationParseError;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw {
      "disabled" => Ok(Self::Disabled),
      "primary" | "master" => Ok(Self::Primary),
      "replica" | "slave" => Ok(Self::Replica),
      _ => Err(ReplicationParseError::new(format!(
        "invalid replication role: {raw}"
      ))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationParseError {
  message: String,
}

impl ReplicationParseError {
  fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

impl fmt::Display for ReplicationParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message)
  }
}

impl std::error::Error for ReplicationParseError {}
