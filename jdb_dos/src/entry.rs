//! Decoded log entries / 解码后的日志条目

use std::cmp::Ordering;

use bytes::Bytes;
use jdb_lsn::Lsn;

use crate::BinNode;

/// Log entry kind / 日志条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
  /// Record (insert, update or delete) / 记录（插入、更新或删除）
  Ln,
  /// Full leaf-containing node / 完整叶子父节点
  Bin,
  /// Partial node, changes since last full / 部分节点，自上次完整记录以来的变更
  Delta,
}

pub const LN_ONLY: &[Kind] = &[Kind::Ln];
pub const BIN_ONLY: &[Kind] = &[Kind::Bin];
pub const BIN_OR_DELTA: &[Kind] = &[Kind::Delta, Kind::Bin];

/// Node slot / 节点槽位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
  pub key: Bytes,
  pub lsn: Lsn,
  /// Known or pending deleted / 已知或待删除
  pub deleted: bool,
}

/// Leaf-containing node as stored in the log / 日志中的叶子父节点
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bin {
  pub slots: Vec<Slot>,
}

/// Changed slots of a node, based on a full node at `full_lsn`
/// 节点的变更槽位，基于 `full_lsn` 处的完整节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinDelta {
  pub full_lsn: Lsn,
  pub slots: Vec<Slot>,
}

/// Record, `data` is None when deleted / 记录，删除时 `data` 为 None
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ln {
  pub key: Bytes,
  pub data: Option<Bytes>,
}

impl Ln {
  #[inline]
  pub fn is_deleted(&self) -> bool {
    self.data.is_none()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
  Ln(Ln),
  Bin(Bin),
  Delta(BinDelta),
}

impl Entry {
  pub fn kind(&self) -> Kind {
    match self {
      Entry::Ln(_) => Kind::Ln,
      Entry::Bin(_) => Kind::Bin,
      Entry::Delta(_) => Kind::Delta,
    }
  }
}

/// Node statistics of one log file / 单个日志文件的节点统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
  /// Full nodes + deltas / 完整节点 + 增量
  pub node_count: u64,
  pub node_size: u64,
}

impl FileSummary {
  /// Average node bytes / 平均节点字节
  #[inline]
  pub fn avg_node_size(&self) -> f64 {
    if self.node_count == 0 {
      0.0
    } else {
      self.node_size as f64 / self.node_count as f64
    }
  }
}

impl Bin {
  /// Slot index for key / 查找 key 的槽位
  pub fn find(&self, key: &[u8], cmp: &dyn Fn(&[u8], &[u8]) -> Ordering) -> Result<usize, usize> {
    self.slots.binary_search_by(|s| cmp(&s.key[..], key))
  }
}

impl BinDelta {
  /// Apply changes onto the full node / 将变更合并到完整节点
  pub fn merge_into(self, bin: &mut Bin, cmp: &dyn Fn(&[u8], &[u8]) -> Ordering) {
    for slot in self.slots {
      match bin.find(&slot.key, cmp) {
        Ok(i) => bin.slots[i] = slot,
        Err(i) => bin.slots.insert(i, slot),
      }
    }
  }
}

impl BinNode for Bin {
  #[inline]
  fn len(&self) -> usize {
    self.slots.len()
  }

  #[inline]
  fn key(&self, i: usize) -> &[u8] {
    &self.slots[i].key
  }

  #[inline]
  fn lsn(&self, i: usize) -> Lsn {
    self.slots[i].lsn
  }

  #[inline]
  fn deleted(&self, i: usize) -> bool {
    self.slots[i].deleted
  }

  /// Fetched copy, never dirty / 读取的副本，永不为脏
  #[inline]
  fn dirty(&self) -> bool {
    false
  }
}
