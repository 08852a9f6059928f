//! Collaborator interfaces: tree, log, cleaner
//! 协作方接口：树、日志、清理器
//!
//! Latches are guards: holding the value holds the latch, dropping releases it.
//! 闩锁即守卫：持有值即持有闩锁，Drop 即释放。

use std::{cmp::Ordering, collections::HashMap};

use jdb_lsn::Lsn;

use crate::{Bin, BinDelta, Entry, FileSummary, Result};

/// Resident record in a node / 节点中的常驻记录
#[derive(Debug, Clone, Copy)]
pub struct LnRef<'a> {
  pub data: &'a [u8],
  /// Not yet written to log / 尚未写入日志
  pub dirty: bool,
}

/// Leaf-containing node, latched or a private copy
/// 叶子父节点，已加闩锁或为私有副本
pub trait BinNode {
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn key(&self, i: usize) -> &[u8];

  fn lsn(&self, i: usize) -> Lsn;

  fn deleted(&self, i: usize) -> bool;

  /// Changed since last logged / 自上次写日志后有变更
  fn dirty(&self) -> bool;

  /// Resident record of slot / 槽位的常驻记录
  fn ln(&self, _i: usize) -> Option<LnRef<'_>> {
    None
  }
}

/// Latched second-level internal node / 已加闩锁的第二层内部节点
pub trait UpperNode {
  type Child<'a>: BinNode
  where
    Self: 'a;

  fn len(&self) -> usize;

  /// Lower bound key of child `i` / 子节点 `i` 的下界键
  fn key(&self, i: usize) -> &[u8];

  fn lsn(&self, i: usize) -> Lsn;

  /// Latch child `i` if resident / 若子节点常驻则加闩锁
  fn child(&self, i: usize) -> Option<Self::Child<'_>>;
}

/// B-tree collaborator / B 树协作方
pub trait Tree: Send + Sync {
  type Upper: UpperNode;

  /// Latched second-level node holding `key`, or the first one when `key` is None
  /// 包含 `key` 的第二层节点（已加闩锁），`key` 为 None 时返回第一个
  fn first_upper(&self, key: Option<&[u8]>) -> Result<Option<Self::Upper>>;

  /// Unlatch `prev` and latch its right sibling / 释放 `prev` 并锁住其右兄弟
  fn next_upper(&self, prev: Self::Upper) -> Result<Option<Self::Upper>>;

  fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
  }

  /// Sorted duplicates, data embedded in key / 有序重复键，数据嵌在键中
  fn dup(&self) -> bool;

  fn deferred_write(&self) -> bool {
    false
  }
}

/// Log collaborator / 日志协作方
pub trait Log: Send + Sync {
  /// Read and decode entry at `lsn` / 读取并解码 `lsn` 处的条目
  fn fetch(&self, lsn: Lsn) -> Result<Entry>;

  /// Node statistics per file / 每个文件的节点统计
  fn summaries(&self) -> HashMap<u32, FileSummary> {
    HashMap::new()
  }

  /// Rebuild a node from its delta and full version / 由增量和完整版本重建节点
  fn merge(&self, delta: BinDelta, mut full: Bin, cmp: &dyn Fn(&[u8], &[u8]) -> Ordering) -> Bin {
    delta.merge_into(&mut full, cmp);
    full
  }
}

/// File deletion control / 文件删除控制
pub trait Cleaner: Send + Sync {
  /// Keep files >= `from_file` / 保留 >= `from_file` 的文件
  fn protect(&self, from_file: u32);

  fn unprotect(&self, from_file: u32);
}

/// Protected range, released on drop / 受保护区间，Drop 时释放
pub struct Protect<'a, C: Cleaner + ?Sized> {
  cleaner: &'a C,
  from_file: u32,
}

impl<'a, C: Cleaner + ?Sized> Protect<'a, C> {
  pub fn new(cleaner: &'a C, from_file: u32) -> Self {
    cleaner.protect(from_file);
    Self { cleaner, from_file }
  }
}

impl<C: Cleaner + ?Sized> Drop for Protect<'_, C> {
  fn drop(&mut self) {
    self.cleaner.unprotect(self.from_file);
  }
}
