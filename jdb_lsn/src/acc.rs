//! LSN accumulator / LSN 累加器
//!
//! Collects LSNs grouped by file and hands them back in disk order.
//! The owner is told about every byte committed or released through
//! [`MemNote`], the accumulator itself knows nothing about limits.
//! 按文件分组收集 LSN，并按磁盘顺序返回。
//! 每次占用或释放内存都通过 [`MemNote`] 通知所有者，累加器本身不关心上限。

use std::collections::HashMap;

use crate::Lsn;

/// Offsets per accounting segment / 每个计量段的偏移数
pub const SEG_LEN: usize = 128;

/// Estimated bytes of one segment / 单段估算字节
pub const SEG_MEM: u64 = 16 + (SEG_LEN * size_of::<u32>()) as u64;

/// Estimated bytes of one file entry / 单文件条目估算字节
pub const FILE_MEM: u64 = 64;

/// Memory usage callback / 内存使用回调
pub trait MemNote {
  /// `delta` > 0 committed, < 0 released / 正数为占用，负数为释放
  fn note_mem(&mut self, delta: i64);
}

impl MemNote for i64 {
  #[inline]
  fn note_mem(&mut self, delta: i64) {
    *self += delta;
  }
}

impl MemNote for () {
  #[inline(always)]
  fn note_mem(&mut self, _: i64) {}
}

/// Pending LSNs of one scan batch / 一个扫描批次的待处理 LSN
#[derive(Debug, Default)]
pub struct LsnAcc {
  by_file: HashMap<u32, Vec<u32>>,
  total: usize,
  mem: u64,
}

impl LsnAcc {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add one LSN / 添加一个 LSN
  pub fn add(&mut self, lsn: Lsn, note: &mut impl MemNote) {
    let mut grow = 0;
    let offsets = self.by_file.entry(lsn.file()).or_insert_with(|| {
      grow += FILE_MEM;
      Vec::new()
    });
    if offsets.len() % SEG_LEN == 0 {
      grow += SEG_MEM;
    }
    offsets.push(lsn.offset());
    self.total += 1;
    if grow > 0 {
      self.mem += grow;
      note.note_mem(grow as i64);
    }
  }

  /// Number of pending LSNs / 待处理 LSN 数
  #[inline]
  pub fn pending(&self) -> usize {
    self.total
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.total == 0
  }

  /// Bytes committed so far / 已占用字节
  #[inline]
  pub fn mem(&self) -> u64 {
    self.mem
  }

  /// Remove all LSNs, ascending / 取出全部 LSN，升序
  pub fn drain_sorted(&mut self, note: &mut impl MemNote) -> Vec<Lsn> {
    let mut files: Vec<(u32, Vec<u32>)> = self.by_file.drain().collect();
    files.sort_unstable_by_key(|(file, _)| *file);

    let mut li = Vec::with_capacity(self.total);
    for (file, mut offsets) in files {
      offsets.sort_unstable();
      li.extend(offsets.into_iter().map(|offset| Lsn::new(file, offset)));
    }

    self.release(note);
    li
  }

  /// Drop everything / 清空
  pub fn clear(&mut self, note: &mut impl MemNote) {
    self.by_file.clear();
    self.release(note);
  }

  fn release(&mut self, note: &mut impl MemNote) {
    self.total = 0;
    if self.mem > 0 {
      note.note_mem(-(self.mem as i64));
      self.mem = 0;
    }
  }
}
