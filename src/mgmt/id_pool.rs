//! Slot id allocator for one vgroup.

/// Next-fit allocator over ids `1..max_id`; id `0` is reserved.
///
/// Allocation continues from the last id handed out, so two pools that see
/// the same sequence of allocate/free calls hand out the same ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPool {
  used: Vec<bool>,
  linear_pos: usize,
  num_used: usize,
}

impl IdPool {
  pub fn new(max_id: usize) -> Self {
    Self {
      used: vec![false; max_id.max(1)],
      linear_pos: 0,
      num_used: 0,
    }
  }

  /// Number of ids that can ever be allocated.
  pub fn capacity(&self) -> usize {
    self.used.len() - 1
  }

  pub fn num_used(&self) -> usize {
    self.num_used
  }

  pub fn allocate(&mut self) -> Option<i32> {
    let capacity = self.capacity();
    for step in 0..capacity {
      let id = (self.linear_pos + step) % capacity + 1;
      if !self.used[id] {
        self.used[id] = true;
        self.linear_pos = id;
        self.num_used += 1;
        return Some(id as i32);
      }
    }
    None
  }

  /// Force the status of an id. Returns `false` if it is out of range.
  pub fn mark(&mut self, id: i32, in_use: bool) -> bool {
    let Some(slot) = self.slot(id) else {
      return false;
    };
    if self.used[slot] != in_use {
      self.used[slot] = in_use;
      if in_use {
        self.num_used += 1;
      } else {
        self.num_used -= 1;
      }
    }
    true
  }

  pub fn free(&mut self, id: i32) -> bool {
    self.mark(id, false)
  }

  pub fn is_used(&self, id: i32) -> bool {
    self.slot(id).map(|slot| self.used[slot]).unwrap_or(false)
  }

  fn slot(&self, id: i32) -> Option<usize> {
    usize::try_from(id)
      .ok()
      .filter(|slot| *slot >= 1 && *slot < self.used.len())
  }
}
