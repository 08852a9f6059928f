//! In-memory two-level B-tree / 内存两层 B 树
//!
//! Second-level nodes are fixed after build, leaf-containing nodes grow in
//! place (no splits). Every node keeps the LSN of its last logged version.
//! 第二层节点构建后固定，叶子父节点原地增长（不分裂）。每个节点记录其最后写入日志版本的 LSN。

use std::{cmp::Ordering, sync::Arc};

use bytes::Bytes;
use jdb_lsn::Lsn;
use parking_lot::{Mutex, MutexGuard, RawMutex, lock_api::ArcMutexGuard};

use super::MemLog;
use crate::{
  BIN_ONLY, BIN_OR_DELTA, Bin, BinDelta, BinNode, Entry, Error, Kind, Ln, LnRef, Log, Result,
  Slot, Tree, UpperNode, dup,
};

struct MemLn {
  data: Bytes,
  /// Not yet logged, deferred write only / 尚未写日志，仅延迟写
  dirty: bool,
}

struct MemSlot {
  key: Bytes,
  lsn: Lsn,
  deleted: bool,
  /// Changed since last full node / 自上次完整节点以来有变更
  changed: bool,
  ln: Option<MemLn>,
}

/// Resident leaf-containing node / 常驻叶子父节点
pub struct MemBin {
  slots: Vec<MemSlot>,
  dirty: bool,
  last_full: Lsn,
}

impl MemBin {
  fn from_full(bin: Bin, last_full: Lsn) -> Self {
    Self {
      slots: bin
        .slots
        .into_iter()
        .map(|s| MemSlot {
          key: s.key,
          lsn: s.lsn,
          deleted: s.deleted,
          changed: false,
          ln: None,
        })
        .collect(),
      dirty: false,
      last_full,
    }
  }

  fn find(&self, key: &[u8]) -> std::result::Result<usize, usize> {
    self.slots.binary_search_by(|s| s.key[..].cmp(key))
  }

  fn slot(s: &MemSlot) -> Slot {
    Slot {
      key: s.key.clone(),
      lsn: s.lsn,
      deleted: s.deleted,
    }
  }

  fn to_full(&self) -> Bin {
    Bin {
      slots: self.slots.iter().map(Self::slot).collect(),
    }
  }

  fn to_delta(&self) -> BinDelta {
    BinDelta {
      full_lsn: self.last_full,
      slots: self
        .slots
        .iter()
        .filter(|s| s.changed)
        .map(Self::slot)
        .collect(),
    }
  }
}

impl BinNode for MemBin {
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

  #[inline]
  fn dirty(&self) -> bool {
    self.dirty
  }

  fn ln(&self, i: usize) -> Option<LnRef<'_>> {
    self.slots[i].ln.as_ref().map(|ln| LnRef {
      data: &ln.data,
      dirty: ln.dirty,
    })
  }
}

/// Latched leaf-containing node / 已加闩锁的叶子父节点
pub struct BinLatch<'a>(MutexGuard<'a, MemBin>);

impl BinNode for BinLatch<'_> {
  #[inline]
  fn len(&self) -> usize {
    self.0.len()
  }

  #[inline]
  fn key(&self, i: usize) -> &[u8] {
    self.0.key(i)
  }

  #[inline]
  fn lsn(&self, i: usize) -> Lsn {
    self.0.lsn(i)
  }

  #[inline]
  fn deleted(&self, i: usize) -> bool {
    self.0.deleted(i)
  }

  #[inline]
  fn dirty(&self) -> bool {
    self.0.dirty()
  }

  #[inline]
  fn ln(&self, i: usize) -> Option<LnRef<'_>> {
    self.0.ln(i)
  }
}

struct Child {
  /// Lower bound, empty for the leftmost child / 下界，最左子节点为空
  key: Bytes,
  lsn: Lsn,
  bin: Option<Mutex<MemBin>>,
}

pub struct MemUpper {
  idx: usize,
  children: Vec<Child>,
}

impl MemUpper {
  fn child_idx(&self, key: &[u8]) -> usize {
    self
      .children
      .partition_point(|c| c.key[..] <= *key)
      .saturating_sub(1)
  }
}

/// Latched second-level node / 已加闩锁的第二层节点
pub struct UpperLatch(ArcMutexGuard<RawMutex, MemUpper>);

impl UpperNode for UpperLatch {
  type Child<'a>
    = BinLatch<'a>
  where
    Self: 'a;

  #[inline]
  fn len(&self) -> usize {
    self.0.children.len()
  }

  #[inline]
  fn key(&self, i: usize) -> &[u8] {
    &self.0.children[i].key
  }

  #[inline]
  fn lsn(&self, i: usize) -> Lsn {
    self.0.children[i].lsn
  }

  fn child(&self, i: usize) -> Option<BinLatch<'_>> {
    self.0.children[i]
      .bin
      .as_ref()
      .map(|bin| BinLatch(bin.lock()))
  }
}

/// Build options / 构建选项
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
  pub bin_cap: usize,
  pub upper_cap: usize,
  pub dup: bool,
  pub deferred_write: bool,
  pub resident: bool,
}

pub struct MemTree {
  uppers: Vec<Arc<Mutex<MemUpper>>>,
  /// Routing key of each upper / 每个上层节点的路由键
  firsts: Vec<Bytes>,
  log: Arc<MemLog>,
  dup: bool,
  deferred_write: bool,
}

impl MemTree {
  /// Log records in the given order, then every node in key order
  /// 按给定顺序写入记录，再按键序写入所有节点
  pub(crate) fn build(log: Arc<MemLog>, recs: Vec<(Bytes, Bytes)>, layout: Layout) -> Self {
    let mut written: Vec<(Bytes, Lsn, Bytes)> = recs
      .into_iter()
      .map(|(key, data)| {
        let lsn = log.append(&Entry::Ln(Ln {
          key: key.clone(),
          data: Some(data.clone()),
        }));
        (key, lsn, data)
      })
      .collect();

    // Later write wins / 后写入者生效
    written.reverse();
    written.sort_by(|a, b| a.0.cmp(&b.0));
    written.dedup_by(|a, b| a.0 == b.0);

    let bin_cap = layout.bin_cap.max(1);
    let chunks: Vec<&[(Bytes, Lsn, Bytes)]> = if written.is_empty() {
      vec![&written[..]]
    } else {
      written.chunks(bin_cap).collect()
    };

    let mut children = Vec::with_capacity(chunks.len());
    for (n, chunk) in chunks.into_iter().enumerate() {
      let slots = chunk
        .iter()
        .map(|(key, lsn, data)| MemSlot {
          key: key.clone(),
          lsn: *lsn,
          deleted: false,
          changed: false,
          ln: layout.resident.then(|| MemLn {
            data: data.clone(),
            dirty: false,
          }),
        })
        .collect();
      let mut bin = MemBin {
        slots,
        dirty: false,
        last_full: Lsn::NULL,
      };
      let lsn = log.append(&Entry::Bin(bin.to_full()));
      bin.last_full = lsn;

      let key = match (n, chunk.first()) {
        (0, _) | (_, None) => Bytes::new(),
        (_, Some(first)) => first.0.clone(),
      };
      children.push(Child {
        key,
        lsn,
        bin: layout.resident.then(|| Mutex::new(bin)),
      });
    }

    let upper_cap = layout.upper_cap.max(1);
    let mut uppers = Vec::new();
    let mut firsts = Vec::new();
    let mut iter = children.into_iter().peekable();
    while let Some(first) = iter.peek() {
      firsts.push(first.key.clone());
      let group: Vec<Child> = iter.by_ref().take(upper_cap).collect();
      uppers.push(Arc::new(Mutex::new(MemUpper {
        idx: uppers.len(),
        children: group,
      })));
    }

    Self {
      uppers,
      firsts,
      log,
      dup: layout.dup,
      deferred_write: layout.deferred_write,
    }
  }

  /// Key as stored in the tree / 树中存储的键
  pub fn tree_key(&self, key: &[u8], data: &[u8]) -> Bytes {
    if self.dup {
      dup::combine(key, data)
    } else {
      Bytes::copy_from_slice(key)
    }
  }

  fn upper_idx(&self, key: &[u8]) -> usize {
    self
      .firsts
      .partition_point(|f| self.cmp(f, key) != Ordering::Greater)
      .saturating_sub(1)
  }

  /// Make child resident, from its full node or delta / 从完整节点或增量载入子节点
  fn load(&self, child: &mut Child) -> Result<()> {
    if child.bin.is_some() {
      return Ok(());
    }
    let bin = match self.log.fetch(child.lsn)? {
      Entry::Bin(bin) => MemBin::from_full(bin, child.lsn),
      Entry::Delta(delta) => {
        let full_lsn = delta.full_lsn;
        let full = match self.log.fetch(full_lsn)? {
          Entry::Bin(bin) => bin,
          e => {
            return Err(Error::UnexpectedKind {
              lsn: full_lsn,
              expect: BIN_ONLY,
              got: e.kind(),
            });
          }
        };
        let changed: Vec<Bytes> = delta.slots.iter().map(|s| s.key.clone()).collect();
        let merged = self.log.merge(delta, full, &|a: &[u8], b: &[u8]| a.cmp(b));
        let mut bin = MemBin::from_full(merged, full_lsn);
        for s in &mut bin.slots {
          s.changed = changed.binary_search(&s.key).is_ok();
        }
        bin
      }
      Entry::Ln(_) => {
        return Err(Error::UnexpectedKind {
          lsn: child.lsn,
          expect: BIN_OR_DELTA,
          got: Kind::Ln,
        });
      }
    };
    child.bin = Some(Mutex::new(bin));
    Ok(())
  }

  /// Latch the node holding `key`, loading it if evicted
  /// 锁住包含 `key` 的节点，若已逐出则载入
  fn with_bin<R>(&self, key: &[u8], f: impl FnOnce(&mut MemBin) -> R) -> Result<R> {
    let mut upper = self.uppers[self.upper_idx(key)].lock();
    let i = upper.child_idx(key);
    let child = &mut upper.children[i];
    self.load(child)?;
    let Some(bin) = &child.bin else {
      return Err(Error::NoEntry(child.lsn));
    };
    let mut bin = bin.lock();
    Ok(f(&mut *bin))
  }

  /// Insert or update, record is logged and stays resident
  /// 插入或更新，记录写入日志并保持常驻
  pub fn put(&self, key: &[u8], data: &[u8]) -> Result<()> {
    let tree_key = self.tree_key(key, data);
    let data = Bytes::copy_from_slice(data);
    let lsn = self.log.append(&Entry::Ln(Ln {
      key: tree_key.clone(),
      data: Some(data.clone()),
    }));
    let ln = MemLn {
      data,
      dirty: self.deferred_write,
    };

    let route = tree_key.clone();
    self.with_bin(&route, |bin| {
      match bin.find(&tree_key) {
        Ok(i) => {
          let s = &mut bin.slots[i];
          s.lsn = lsn;
          s.deleted = false;
          s.changed = true;
          s.ln = Some(ln);
        }
        Err(i) => bin.slots.insert(
          i,
          MemSlot {
            key: tree_key,
            lsn,
            deleted: false,
            changed: true,
            ln: Some(ln),
          },
        ),
      }
      bin.dirty = true;
    })
  }

  /// Delete by tree key, see [`MemTree::tree_key`]. False if absent.
  /// 按树键删除，见 [`MemTree::tree_key`]。不存在返回 false。
  pub fn del(&self, tree_key: &[u8]) -> Result<bool> {
    self.with_bin(tree_key, |bin| {
      let Ok(i) = bin.find(tree_key) else {
        return false;
      };
      let s = &mut bin.slots[i];
      if s.deleted {
        return false;
      }
      s.lsn = self.log.append(&Entry::Ln(Ln {
        key: s.key.clone(),
        data: None,
      }));
      s.deleted = true;
      s.changed = true;
      s.ln = None;
      bin.dirty = true;
      true
    })
  }

  /// Checkpoint: log dirty nodes as deltas (when `delta` and a full version
  /// exists) or as full nodes. Returns nodes written.
  /// 检查点：将脏节点写为增量或完整节点，返回写入的节点数。
  pub fn flush(&self, delta: bool) -> usize {
    let mut n = 0;
    for upper in &self.uppers {
      let mut upper = upper.lock();
      for child in &mut upper.children {
        let Some(bin) = &child.bin else {
          continue;
        };
        let mut bin = bin.lock();
        for s in &mut bin.slots {
          if let Some(ln) = &mut s.ln {
            ln.dirty = false;
          }
        }
        if !bin.dirty {
          continue;
        }

        child.lsn = if delta && !bin.last_full.is_null() {
          self.log.append(&Entry::Delta(bin.to_delta()))
        } else {
          // Full node drops deleted slots / 完整节点丢弃已删除槽位
          bin.slots.retain(|s| !s.deleted);
          let lsn = self.log.append(&Entry::Bin(bin.to_full()));
          bin.last_full = lsn;
          for s in &mut bin.slots {
            s.changed = false;
          }
          lsn
        };
        bin.dirty = false;
        n += 1;
      }
    }
    n
  }

  /// Drop clean resident nodes, returns nodes dropped
  /// 丢弃干净的常驻节点，返回丢弃数
  pub fn evict(&self) -> usize {
    let mut n = 0;
    for upper in &self.uppers {
      let mut upper = upper.lock();
      for child in &mut upper.children {
        let clean = child.bin.as_ref().is_some_and(|bin| !bin.lock().dirty);
        if clean {
          child.bin = None;
          n += 1;
        }
      }
    }
    n
  }

  /// Drop clean resident records, nodes stay / 丢弃干净的常驻记录，节点保留
  pub fn evict_lns(&self) -> usize {
    let mut n = 0;
    for upper in &self.uppers {
      let upper = upper.lock();
      for bin in upper.children.iter().filter_map(|c| c.bin.as_ref()) {
        for s in &mut bin.lock().slots {
          if s.ln.as_ref().is_some_and(|ln| !ln.dirty) {
            s.ln = None;
            n += 1;
          }
        }
      }
    }
    n
  }

  pub fn upper_count(&self) -> usize {
    self.uppers.len()
  }

  pub fn bin_count(&self) -> usize {
    self.uppers.iter().map(|u| u.lock().children.len()).sum()
  }

  pub fn resident_count(&self) -> usize {
    self
      .uppers
      .iter()
      .map(|u| u.lock().children.iter().filter(|c| c.bin.is_some()).count())
      .sum()
  }
}

impl Tree for MemTree {
  type Upper = UpperLatch;

  fn first_upper(&self, key: Option<&[u8]>) -> Result<Option<UpperLatch>> {
    let idx = key.map_or(0, |k| self.upper_idx(k));
    Ok(self.uppers.get(idx).map(|u| UpperLatch(u.lock_arc())))
  }

  fn next_upper(&self, prev: UpperLatch) -> Result<Option<UpperLatch>> {
    let next = prev.0.idx + 1;
    drop(prev);
    Ok(self.uppers.get(next).map(|u| UpperLatch(u.lock_arc())))
  }

  #[inline]
  fn dup(&self) -> bool {
    self.dup
  }

  #[inline]
  fn deferred_write(&self) -> bool {
    self.deferred_write
  }
}
