//! Replicated record store.
//!
//! `Sdb` keeps one named table of rows keyed by string, serializes every
//! mutation under a single write lock, and calls back into a [`RowActions`]
//! implementation so that the owner can maintain derived state. Mutations are
//! appended to an optional log file which is replayed (decode only, no side
//! effects) on open, and whose frames can be applied on replicas.

pub mod log;

use crate::error::{MetaError, Result};
use crate::replication::ReplicationRole;
use indexmap::IndexMap;
use self::log::{LogFrame, SdbLog};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The seven row actions a store can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionKind {
  Insert = 1,
  Delete = 2,
  Update = 3,
  Encode = 4,
  Decode = 5,
  Reset = 6,
  Destroy = 7,
}

impl ActionKind {
  pub fn from_u8(value: u8) -> Option<Self> {
    match value {
      1 => Some(Self::Insert),
      2 => Some(Self::Delete),
      3 => Some(Self::Update),
      4 => Some(Self::Encode),
      5 => Some(Self::Decode),
      6 => Some(Self::Reset),
      7 => Some(Self::Destroy),
      _ => None,
    }
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }

  /// Whether this action is a committed mutation recorded in the log.
  pub fn is_logged(self) -> bool {
    matches!(self, Self::Insert | Self::Delete | Self::Update)
  }
}

impl fmt::Display for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let value = match self {
      ActionKind::Insert => "insert",
      ActionKind::Delete => "delete",
      ActionKind::Update => "update",
      ActionKind::Encode => "encode",
      ActionKind::Decode => "decode",
      ActionKind::Reset => "reset",
      ActionKind::Destroy => "destroy",
    };
    write!(f, "{value}")
  }
}

/// Context handed to insert/delete handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionContext {
  pub role: ReplicationRole,
  /// Store version of the mutation being applied.
  pub version: u64,
}

/// Per-row callbacks invoked by the store.
///
/// Insert and delete run with the store's write lock held, in log order.
/// They report failures through logging only: a committed log entry cannot
/// be rolled back.
pub trait RowActions: Send + Sync {
  type Row: Clone + Send + Sync;

  fn key<'a>(&self, row: &'a Self::Row) -> &'a str;

  /// Size of the persisted form of one row.
  fn encoded_size(&self) -> usize;

  fn insert(&self, row: &mut Self::Row, ctx: &ActionContext);

  fn delete(&self, row: &Self::Row, ctx: &ActionContext);

  fn update(&self, row: &mut Self::Row, bytes: &[u8]) -> Result<()>;

  fn encode(&self, row: &Self::Row, buf: &mut [u8]) -> Result<usize>;

  fn decode(&self, bytes: &[u8]) -> Result<Self::Row>;

  fn reset(&self, row: &mut Self::Row, bytes: &[u8]) -> Result<()>;

  /// Called when the store drops its handle on a row.
  fn destroy(&self, row: Arc<Self::Row>) {
    drop(row);
  }
}

#[derive(Debug, Clone)]
pub struct SdbOptions {
  pub name: String,
  pub max_rows: usize,
  pub log_path: Option<PathBuf>,
  pub role: ReplicationRole,
}

impl SdbOptions {
  pub fn new(name: impl Into<String>, max_rows: usize) -> Self {
    Self {
      name: name.into(),
      max_rows,
      log_path: None,
      role: ReplicationRole::Disabled,
    }
  }

  pub fn log_path(mut self, path: impl AsRef<Path>) -> Self {
    self.log_path = Some(path.as_ref().to_path_buf());
    self
  }

  pub fn role(mut self, role: ReplicationRole) -> Self {
    self.role = role;
    self
  }
}

pub struct Sdb<A: RowActions> {
  name: String,
  max_rows: usize,
  role: ReplicationRole,
  actions: A,
  rows: RwLock<IndexMap<String, Arc<A::Row>>>,
  version: AtomicU64,
  log: Mutex<Option<SdbLog>>,
}

impl<A: RowActions> Sdb<A> {
  /// Open the table and replay its log.
  ///
  /// Replay only decodes rows; derived state is left for the owner to rebuild.
  pub fn open(options: SdbOptions, actions: A) -> Result<Self> {
    let mut rows: IndexMap<String, Arc<A::Row>> = IndexMap::new();
    let mut version = 0u64;

    let log = match options.log_path.as_ref() {
      Some(path) => {
        let (log, frames) = SdbLog::open(path)?;
        for frame in frames {
          version = version.max(frame.version);
          if let Err(error) = replay_frame(&actions, &mut rows, &frame) {
            warn!(
              table = %options.name,
              key = %frame.key,
              action = %frame.action,
              %error,
              "skipping unreadable log frame"
            );
          }
        }
        Some(log)
      }
      None => None,
    };

    debug!(
      table = %options.name,
      rows = rows.len(),
      version,
      role = %options.role,
      "store opened"
    );

    Ok(Self {
      name: options.name,
      max_rows: options.max_rows,
      role: options.role,
      actions,
      rows: RwLock::new(rows),
      version: AtomicU64::new(version),
      log: Mutex::new(log),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn role(&self) -> ReplicationRole {
    self.role
  }

  pub fn max_rows(&self) -> usize {
    self.max_rows
  }

  pub fn actions(&self) -> &A {
    &self.actions
  }

  /// Monotonic version counter, bumped by every committed mutation.
  pub fn version(&self) -> u64 {
    self.version.load(Ordering::SeqCst)
  }

  pub fn num_rows(&self) -> usize {
    self.rows.read().len()
  }

  pub fn get_row(&self, key: &str) -> Option<Arc<A::Row>> {
    self.rows.read().get(key).cloned()
  }

  /// All rows in insertion order.
  pub fn rows(&self) -> Vec<Arc<A::Row>> {
    self.rows.read().values().cloned().collect()
  }

  pub fn log_path(&self) -> Option<PathBuf> {
    self.log.lock().as_ref().map(|log| log.path().to_path_buf())
  }

  pub fn insert_row(&self, row: A::Row) -> Result<Arc<A::Row>> {
    let mut rows = self.rows.write();
    let key = self.actions.key(&row).to_string();
    if rows.contains_key(&key) {
      return Err(MetaError::Store(format!(
        "{}: row {key} already exists",
        self.name
      )));
    }
    if rows.len() >= self.max_rows {
      return Err(MetaError::Store(format!(
        "{}: table is full ({} rows)",
        self.name, self.max_rows
      )));
    }

    let payload = self.encode_row(&row)?;
    let frame = LogFrame::new(ActionKind::Insert, self.version() + 1, key, payload);
    self.commit_insert(&mut rows, &frame, row)
  }

  pub fn delete_row(&self, key: &str) -> Result<()> {
    let mut rows = self.rows.write();
    if !rows.contains_key(key) {
      return Err(MetaError::Store(format!(
        "{}: row {key} does not exist",
        self.name
      )));
    }
    let frame = LogFrame::new(ActionKind::Delete, self.version() + 1, key, Vec::new());
    self.commit_delete(&mut rows, &frame)
  }

  /// Overwrite the persisted fields of an existing row.
  pub fn update_row(&self, bytes: &[u8]) -> Result<Arc<A::Row>> {
    let incoming = self.actions.decode(bytes)?;
    let key = self.actions.key(&incoming).to_string();
    let mut rows = self.rows.write();
    if !rows.contains_key(&key) {
      return Err(MetaError::Store(format!(
        "{}: row {key} does not exist",
        self.name
      )));
    }
    let payload = bytes[..bytes.len().min(self.actions.encoded_size())].to_vec();
    let frame = LogFrame::new(ActionKind::Update, self.version() + 1, key, payload);
    self.commit_update(&mut rows, &frame)
  }

  /// Apply a frame committed by the master.
  ///
  /// Frames at or below the local version were already applied and are
  /// skipped.
  pub fn apply_frame(&self, frame: &LogFrame) -> Result<()> {
    let mut rows = self.rows.write();
    let current = self.version();
    if frame.version <= current {
      debug!(
        table = %self.name,
        version = frame.version,
        current,
        "skipping already applied frame"
      );
      return Ok(());
    }

    match frame.action {
      ActionKind::Insert => {
        let row = self.actions.decode(&frame.payload)?;
        if self.actions.key(&row) != frame.key {
          return Err(MetaError::Store(format!(
            "{}: frame key {} does not match payload",
            self.name, frame.key
          )));
        }
        if rows.contains_key(&frame.key) {
          return Err(MetaError::Store(format!(
            "{}: replicated row {} already exists",
            self.name, frame.key
          )));
        }
        self.commit_insert(&mut rows, frame, row).map(|_| ())
      }
      ActionKind::Delete => {
        if !rows.contains_key(&frame.key) {
          return Err(MetaError::Store(format!(
            "{}: replicated delete of missing row {}",
            self.name, frame.key
          )));
        }
        self.commit_delete(&mut rows, frame)
      }
      ActionKind::Update => {
        if !rows.contains_key(&frame.key) {
          return Err(MetaError::Store(format!(
            "{}: replicated update of missing row {}",
            self.name, frame.key
          )));
        }
        self.commit_update(&mut rows, frame).map(|_| ())
      }
      other => Err(MetaError::Store(format!(
        "{}: action {other} cannot be replicated",
        self.name
      ))),
    }
  }

  /// Adjust runtime-only fields of a row. Nothing is logged.
  pub fn modify_row(&self, key: &str, f: impl FnOnce(&mut A::Row)) -> bool {
    let mut rows = self.rows.write();
    match rows.get_mut(key) {
      Some(row) => {
        f(Arc::make_mut(row));
        true
      }
      None => false,
    }
  }

  pub fn sync(&self) -> Result<()> {
    if let Some(log) = self.log.lock().as_mut() {
      log.sync()?;
    }
    Ok(())
  }

  /// Flush the log and release every row.
  pub fn close(self) -> Result<()> {
    self.sync()?;
    let rows = std::mem::take(&mut *self.rows.write());
    for (_, row) in rows {
      self.actions.destroy(row);
    }
    debug!(table = %self.name, "store closed");
    Ok(())
  }

  fn encode_row(&self, row: &A::Row) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; self.actions.encoded_size()];
    let written = self.actions.encode(row, &mut payload)?;
    payload.truncate(written);
    Ok(payload)
  }

  fn append(&self, frame: &LogFrame) -> Result<()> {
    if let Some(log) = self.log.lock().as_mut() {
      log.append(frame)?;
    }
    self.version.store(frame.version, Ordering::SeqCst);
    Ok(())
  }

  fn context(&self, version: u64) -> ActionContext {
    ActionContext {
      role: self.role,
      version,
    }
  }

  fn commit_insert(
    &self,
    rows: &mut IndexMap<String, Arc<A::Row>>,
    frame: &LogFrame,
    mut row: A::Row,
  ) -> Result<Arc<A::Row>> {
    self.append(frame)?;
    trace!(table = %self.name, key = %frame.key, version = frame.version, "insert");
    self.actions.insert(&mut row, &self.context(frame.version));
    let row = Arc::new(row);
    rows.insert(frame.key.clone(), Arc::clone(&row));
    Ok(row)
  }

  fn commit_delete(
    &self,
    rows: &mut IndexMap<String, Arc<A::Row>>,
    frame: &LogFrame,
  ) -> Result<()> {
    self.append(frame)?;
    trace!(table = %self.name, key = %frame.key, version = frame.version, "delete");
    if let Some(row) = rows.shift_remove(&frame.key) {
      self.actions.delete(&row, &self.context(frame.version));
      self.actions.destroy(row);
    }
    Ok(())
  }

  fn commit_update(
    &self,
    rows: &mut IndexMap<String, Arc<A::Row>>,
    frame: &LogFrame,
  ) -> Result<Arc<A::Row>> {
    let Some(entry) = rows.get_mut(&frame.key) else {
      return Err(MetaError::Store(format!(
        "{}: row {} does not exist",
        self.name, frame.key
      )));
    };
    // Validate against a scratch copy so a bad payload never reaches the log.
    let mut updated = (**entry).clone();
    self.actions.update(&mut updated, &frame.payload)?;
    self.append(frame)?;
    trace!(table = %self.name, key = %frame.key, version = frame.version, "update");
    *entry = Arc::new(updated);
    Ok(Arc::clone(entry))
  }
}

fn replay_frame<A: RowActions>(
  actions: &A,
  rows: &mut IndexMap<String, Arc<A::Row>>,
  frame: &LogFrame,
) -> Result<()> {
  match frame.action {
    ActionKind::Insert => {
      let row = actions.decode(&frame.payload)?;
      rows.insert(frame.key.clone(), Arc::new(row));
    }
    ActionKind::Delete => {
      if let Some(row) = rows.shift_remove(&frame.key) {
        actions.destroy(row);
      }
    }
    ActionKind::Update => match rows.get_mut(&frame.key) {
      Some(row) => actions.reset(Arc::make_mut(row), &frame.payload)?,
      None => {
        let row = actions.decode(&frame.payload)?;
        rows.insert(frame.key.clone(), Arc::new(row));
      }
    },
    other => {
      return Err(MetaError::Store(format!(
        "action {other} in log frame"
      )))
    }
  }
  Ok(())
}
