//! Disk-ordered scanner / 磁盘顺序扫描器
//!
//! Each iteration has two phases:
//! 每轮迭代分两个阶段：
//!
//! - Phase I walks second-level nodes in key order under their latches and
//!   accumulates LSNs, of leaf-containing nodes (node mode) or of records
//!   (record mode), never both. It stops when the walk ends or the LSN batch
//!   size / memory limit is hit, then every latch is released.
//!   阶段一按键序遍历第二层节点并累加 LSN，达到上限或遍历结束即停止并释放所有闩锁。
//! - Phase II sorts the LSNs, fetches them in disk order without any latch
//!   and hands records to the [`Processor`], which may block.
//!   阶段二排序 LSN，无闩锁地按磁盘顺序读取，并交给可能阻塞的处理器。
//!
//! The next iteration restarts the walk at the highest key processed so far
//! and skips everything at or below it.
//! 下一轮从已处理的最大键处重新遍历，并跳过不大于它的键。
//!
//! A resident node is processed inline, latch held, only when the processor
//! reports it can take all of it without blocking. Dirty nodes that could not
//! be taken inline are read from the log, so results may lag back to the last
//! checkpoint.
//! 常驻节点仅在处理器确认不会阻塞时才于持闩锁期间内联处理；无法内联的脏节点从日志读取，
//! 结果可能滞后到上一个检查点。

use std::{cmp::Ordering, collections::HashMap};

use bytes::Bytes;
use jdb_lsn::{Lsn, LsnAcc, MemNote};
use log::debug;

use crate::{
  BIN_ONLY, BIN_OR_DELTA, Bin, BinDelta, BinNode, Entry, Error, FileSummary, Kind, LN_ONLY, Ln,
  Log, ParsedConf, Result, Tree, UpperNode, dup,
};

/// Sink of scanned records / 扫描记录的接收方
pub trait Processor {
  /// Take one record, user format. `data` is None in keys-only mode.
  /// 接收一条记录（用户格式），仅键模式下 `data` 为 None。
  fn process(&mut self, key: Bytes, data: Option<Bytes>) -> Result<()>;

  /// Whether `n` records can be taken right now without blocking
  /// 现在能否无阻塞地接收 `n` 条记录
  fn can_process(&mut self, n: usize) -> Result<bool>;

  /// Iteration `n` finished / 第 `n` 轮迭代结束
  fn on_iteration(&mut self, _n: u64) {}
}

/// Scan counters / 扫描计数
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
  pub iterations: u64,
  /// Dirty resident nodes processed under latch / 持闩锁处理的脏常驻节点
  pub inline_nodes: u64,
  /// Resident records processed under latch / 持闩锁处理的常驻记录
  pub inline_records: u64,
  /// LSNs accumulated / 累加的 LSN
  pub deferred: u64,
  pub deltas: u64,
  pub peak_pending: usize,
  /// Highest memory seen at a limit check / 上限检查时见到的最高内存
  pub peak_mem: u64,
}

#[derive(Debug, Default)]
struct Budget {
  used: u64,
}

impl MemNote for Budget {
  #[inline]
  fn note_mem(&mut self, delta: i64) {
    self.used = self.used.saturating_add_signed(delta);
  }
}

enum Node {
  Full(Bin),
  Delta(BinDelta),
}

#[inline]
fn unexpected(lsn: Lsn, expect: &'static [Kind], got: Kind) -> Error {
  Error::UnexpectedKind { lsn, expect, got }
}

pub struct Scanner<'a, T: Tree, L: Log, P: Processor> {
  tree: &'a T,
  log: &'a L,
  proc: &'a mut P,
  keys_only: bool,
  dup: bool,
  /// Node mode / 节点模式
  bins_only: bool,
  deferred_write: bool,
  lsn_batch_size: u64,
  mem_limit: u64,
  delta_factor: u32,
  summaries: HashMap<u32, FileSummary>,
  acc: LsnAcc,
  budget: Budget,
  prev_end: Option<Bytes>,
  new_end: Option<Bytes>,
  /// Iteration took something above prev_end / 本轮已接收高于 prev_end 的内容
  progress: bool,
  stats: ScanStats,
}

impl<'a, T: Tree, L: Log, P: Processor> Scanner<'a, T, L, P> {
  pub fn new(tree: &'a T, log: &'a L, proc: &'a mut P, conf: &ParsedConf) -> Self {
    let dup = tree.dup();
    Self {
      tree,
      log,
      proc,
      keys_only: conf.keys_only,
      dup,
      bins_only: dup || conf.keys_only,
      deferred_write: tree.deferred_write(),
      lsn_batch_size: conf.lsn_batch_size,
      mem_limit: conf.mem_limit,
      delta_factor: conf.delta_factor,
      summaries: log.summaries(),
      acc: LsnAcc::new(),
      budget: Budget::default(),
      prev_end: None,
      new_end: None,
      progress: false,
      stats: ScanStats::default(),
    }
  }

  pub fn stats(&self) -> &ScanStats {
    &self.stats
  }

  /// Highest key processed by finished iterations / 已完成迭代处理的最大键
  pub fn prev_end(&self) -> Option<&Bytes> {
    self.prev_end.as_ref()
  }

  /// Run until every record was handed to the processor
  /// 运行直到所有记录都交给处理器
  pub fn scan(&mut self) -> Result<()> {
    loop {
      self.progress = false;

      // Phase I / 阶段一
      let mut cur = self.tree.first_upper(self.prev_end.as_deref())?;
      let mut more = false;
      while let Some(upper) = cur.take() {
        if self.bins_only {
          self.acc_bins(&upper)?;
        } else {
          self.acc_lns(&upper)?;
        }
        if self.limit_hit() {
          more = true;
          break;
        }
        cur = self.tree.next_upper(upper)?;
      }

      // Phase II / 阶段二
      let lsns = self.acc.drain_sorted(&mut self.budget);
      if self.bins_only {
        self.fetch_bins(&lsns)?;
      } else {
        self.fetch_lns(&lsns)?;
      }

      self.stats.iterations += 1;
      self.proc.on_iteration(self.stats.iterations);
      debug!(
        "dos iteration {}: {} lsn, more={more}",
        self.stats.iterations,
        lsns.len()
      );

      if !more {
        return Ok(());
      }

      self.budget.used = 0;
      self.prev_end = self.new_end.clone();
    }
  }

  /// Checked once per node, overshoot by one node is fine
  /// 每个节点检查一次，超出一个节点可以接受
  fn limit_hit(&mut self) -> bool {
    let pending = self.acc.pending();
    self.stats.peak_pending = self.stats.peak_pending.max(pending);
    self.stats.peak_mem = self.stats.peak_mem.max(self.budget.used);
    self.progress
      && (self.budget.used >= self.mem_limit || pending as u64 > self.lsn_batch_size)
  }

  /// `key` <= prev_end / `key` 不大于 prev_end
  #[inline]
  fn done(&self, key: &[u8]) -> bool {
    self
      .prev_end
      .as_deref()
      .is_some_and(|end| self.tree.cmp(end, key) != Ordering::Less)
  }

  fn note_end(&mut self, key: &[u8]) {
    let higher = match &self.new_end {
      Some(end) => self.tree.cmp(end, key) == Ordering::Less,
      None => true,
    };
    if higher {
      self.new_end = Some(Bytes::copy_from_slice(key));
    }
  }

  /// Rough size of a deserialized delta / 反序列化增量的粗略大小
  fn delta_mem(&self, file: u32) -> u64 {
    // No nodes in file: LSN is a full node, no delta to hold
    // 文件中没有节点：LSN 指向完整节点，无需保存增量
    self
      .summaries
      .get(&file)
      .map_or(0, |s| (s.avg_node_size() * self.delta_factor as f64) as u64)
  }

  /// Phase I, node mode / 阶段一，节点模式
  fn acc_bins(&mut self, parent: &T::Upper) -> Result<()> {
    let n = parent.len();
    for i in 0..n {
      // Child i holds keys below key(i + 1) / 子节点 i 的键都小于 key(i + 1)
      if i + 1 < n && self.done(parent.key(i + 1)) {
        continue;
      }
      if self.limit_hit() {
        return Ok(());
      }

      let fresh = !self.done(parent.key(i));
      let child = parent.child(i);
      let inline = match &child {
        Some(bin) => bin.dirty() && self.proc.can_process(bin.len())?,
        None => false,
      };

      match child {
        Some(bin) if inline => {
          self.stats.inline_nodes += 1;
          self.process_bin(&bin)?;
        }
        _ => {
          let lsn = parent.lsn(i);
          self.acc.add(lsn, &mut self.budget);
          // Most node LSNs are deltas / 大多数节点 LSN 是增量
          let est = self.delta_mem(lsn.file());
          self.budget.note_mem(est as i64);
          self.stats.deferred += 1;
        }
      }

      // Node is fully processed by the end of phase II, so its lower bound is
      // covered even when it holds no live slot
      // 节点在阶段二结束前会被完整处理，即使没有存活槽位其下界也已覆盖
      if fresh {
        self.progress = true;
        self.note_end(parent.key(i));
      }
    }
    Ok(())
  }

  /// Phase I, record mode / 阶段一，记录模式
  fn acc_lns(&mut self, parent: &T::Upper) -> Result<()> {
    let n = parent.len();
    for i in 0..n {
      if i + 1 < n && self.done(parent.key(i + 1)) {
        continue;
      }
      if self.limit_hit() {
        return Ok(());
      }

      // Non-resident node is read in key order, not deferred
      // 非常驻节点按键序直接读取，不延后
      match parent.child(i) {
        Some(bin) => self.acc_bin_lns(&bin)?,
        None => {
          let bin = self.fetch_bin(parent.lsn(i))?;
          self.acc_bin_lns(&bin)?;
        }
      }
    }
    Ok(())
  }

  fn acc_bin_lns<B: BinNode + ?Sized>(&mut self, bin: &B) -> Result<()> {
    let deferred_write = self.deferred_write;
    for j in 0..bin.len() {
      let key = bin.key(j);
      if bin.deleted(j) || self.done(key) {
        continue;
      }
      self.progress = true;

      // Without deferred write every resident record is already logged
      // 非延迟写时所有常驻记录都已写入日志
      let ln = bin.ln(j).filter(|ln| !deferred_write || ln.dirty);
      let inline = match ln {
        Some(_) => self.proc.can_process(1)?,
        None => false,
      };

      match ln {
        Some(ln) if inline => {
          self.stats.inline_records += 1;
          self.emit(key, Some(Bytes::copy_from_slice(ln.data)))?;
        }
        _ => {
          self.acc.add(bin.lsn(j), &mut self.budget);
          self.stats.deferred += 1;
        }
      }
    }
    Ok(())
  }

  /// Phase II, node mode / 阶段二，节点模式
  fn fetch_bins(&mut self, lsns: &[Lsn]) -> Result<()> {
    // Sized for the worst case where every LSN is a delta, memory was budgeted in phase I
    // 按全是增量的最坏情况分配，内存已在阶段一计入
    let mut deltas = Vec::with_capacity(lsns.len());

    for &lsn in lsns {
      match self.fetch_node(lsn)? {
        Node::Full(bin) => self.process_bin(&bin)?,
        Node::Delta(delta) => deltas.push(delta),
      }
    }

    if deltas.is_empty() {
      return Ok(());
    }

    // Second pass in full node order / 第二遍按完整节点顺序
    deltas.sort_by_key(|d| d.full_lsn);
    self.stats.deltas += deltas.len() as u64;
    for delta in deltas {
      let full = self.fetch_full(delta.full_lsn)?;
      let bin = self.merge(delta, full);
      self.process_bin(&bin)?;
    }
    Ok(())
  }

  /// Phase II, record mode / 阶段二，记录模式
  fn fetch_lns(&mut self, lsns: &[Lsn]) -> Result<()> {
    for &lsn in lsns {
      let ln = self.fetch_ln(lsn)?;
      match ln.data {
        Some(data) => self.emit(&ln.key, Some(data))?,
        None => self.note_end(&ln.key),
      }
    }
    Ok(())
  }

  /// Keys of a node, data (if any) is split from dup keys
  /// 处理节点中的键，数据（如有）从重复键中拆出
  fn process_bin<B: BinNode + ?Sized>(&mut self, bin: &B) -> Result<()> {
    for j in 0..bin.len() {
      let key = bin.key(j);
      if self.done(key) {
        continue;
      }
      if bin.deleted(j) {
        self.note_end(key);
        continue;
      }
      self.emit(key, None)?;
    }
    Ok(())
  }

  /// Convert tree format to user format and hand it over
  /// 将树格式转为用户格式并交出
  fn emit(&mut self, tree_key: &[u8], data: Option<Bytes>) -> Result<()> {
    let (key, data) = if self.dup {
      let (key, data) = dup::split(tree_key).ok_or(Error::BadDupKey)?;
      (key, (!self.keys_only).then_some(data))
    } else {
      let data = if self.keys_only { None } else { data };
      (Bytes::copy_from_slice(tree_key), data)
    };
    self.proc.process(key, data)?;
    self.note_end(tree_key);
    Ok(())
  }

  fn merge(&self, delta: BinDelta, full: Bin) -> Bin {
    let tree = self.tree;
    self
      .log
      .merge(delta, full, &|a: &[u8], b: &[u8]| tree.cmp(a, b))
  }

  /// Node for record mode phase I / 记录模式阶段一所需节点
  fn fetch_bin(&self, lsn: Lsn) -> Result<Bin> {
    Ok(match self.fetch_node(lsn)? {
      Node::Full(bin) => bin,
      Node::Delta(delta) => {
        let full = self.fetch_full(delta.full_lsn)?;
        self.merge(delta, full)
      }
    })
  }

  fn fetch_node(&self, lsn: Lsn) -> Result<Node> {
    match self.log.fetch(lsn)? {
      Entry::Bin(bin) => Ok(Node::Full(bin)),
      Entry::Delta(delta) => Ok(Node::Delta(delta)),
      e => Err(unexpected(lsn, BIN_OR_DELTA, e.kind())),
    }
  }

  fn fetch_full(&self, lsn: Lsn) -> Result<Bin> {
    match self.log.fetch(lsn)? {
      Entry::Bin(bin) => Ok(bin),
      e => Err(unexpected(lsn, BIN_ONLY, e.kind())),
    }
  }

  fn fetch_ln(&self, lsn: Lsn) -> Result<Ln> {
    match self.log.fetch(lsn)? {
      Entry::Ln(ln) => Ok(ln),
      e => Err(unexpected(lsn, LN_ONLY, e.kind())),
    }
  }
}
