//! Reference-counted file protection / 引用计数的文件保护

use std::collections::BTreeMap;

use log::warn;
use parking_lot::Mutex;

use crate::Cleaner;

/// Tracks protected ranges, nothing is ever deleted / 记录受保护区间，不做实际删除
#[derive(Default)]
pub struct MemCleaner {
  /// from_file -> count
  ranges: Mutex<BTreeMap<u32, usize>>,
}

impl MemCleaner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_protected(&self) -> bool {
    !self.ranges.lock().is_empty()
  }

  /// Files >= `file` may not be deleted / 文件 >= `file` 不可删除
  pub fn blocks(&self, file: u32) -> bool {
    self
      .ranges
      .lock()
      .keys()
      .next()
      .is_some_and(|&from| from <= file)
  }

  pub fn protect_count(&self) -> usize {
    self.ranges.lock().values().sum()
  }
}

impl Cleaner for MemCleaner {
  fn protect(&self, from_file: u32) {
    *self.ranges.lock().entry(from_file).or_default() += 1;
  }

  fn unprotect(&self, from_file: u32) {
    let mut ranges = self.ranges.lock();
    match ranges.get_mut(&from_file) {
      Some(n) if *n > 1 => *n -= 1,
      Some(_) => {
        ranges.remove(&from_file);
      }
      None => warn!("unprotect {from_file} without protect"),
    }
  }
}
