//! In-memory tree, log and cleaner / 内存树、日志与清理器
//!
//! Reference collaborators for the scanner, with node eviction, deltas and
//! log file rolling.
//! 扫描器的参考协作方，支持节点逐出、增量与日志文件切换。

mod cleaner;
pub mod codec;
mod log;
mod tree;

use std::sync::Arc;

use bytes::Bytes;

pub use self::{
  cleaner::MemCleaner,
  log::MemLog,
  tree::{BinLatch, MemBin, MemTree, MemUpper, UpperLatch},
};
use crate::{Conf, Cursor, Result};

pub const DEFAULT_BIN_CAP: usize = 128;
pub const DEFAULT_UPPER_CAP: usize = 16;
pub const DEFAULT_FILE_CAP: usize = 1 << 20;

/// Backend options / 后端配置
#[derive(Debug, Clone, Copy)]
pub enum MemConf {
  /// Slots per leaf-containing node at build / 构建时每个叶子父节点的槽位数
  BinCap(usize),
  /// Children per second-level node / 每个第二层节点的子节点数
  UpperCap(usize),
  /// Bytes per log file / 每个日志文件的字节数
  FileCap(usize),
  /// Sorted duplicates / 有序重复键
  Dup(bool),
  DeferredWrite(bool),
  /// Keep nodes and records cached after build / 构建后保持节点与记录常驻
  Resident(bool),
}

#[derive(Debug, Clone, Copy)]
struct ParsedMemConf {
  bin_cap: usize,
  upper_cap: usize,
  file_cap: usize,
  dup: bool,
  deferred_write: bool,
  resident: bool,
}

impl Default for ParsedMemConf {
  fn default() -> Self {
    Self {
      bin_cap: DEFAULT_BIN_CAP,
      upper_cap: DEFAULT_UPPER_CAP,
      file_cap: DEFAULT_FILE_CAP,
      dup: false,
      deferred_write: false,
      resident: false,
    }
  }
}

impl ParsedMemConf {
  fn parse(conf: &[MemConf]) -> Self {
    let mut c = Self::default();
    for i in conf {
      match *i {
        MemConf::BinCap(v) => c.bin_cap = v.max(1),
        MemConf::UpperCap(v) => c.upper_cap = v.max(1),
        MemConf::FileCap(v) => c.file_cap = v.clamp(1, u32::MAX as usize),
        MemConf::Dup(v) => c.dup = v,
        MemConf::DeferredWrite(v) => c.deferred_write = v,
        MemConf::Resident(v) => c.resident = v,
      }
    }
    c
  }
}

/// Tree, log and cleaner of one database / 单个数据库的树、日志与清理器
#[derive(Clone)]
pub struct MemDb {
  pub tree: Arc<MemTree>,
  pub log: Arc<MemLog>,
  pub cleaner: Arc<MemCleaner>,
}

impl MemDb {
  /// Load `kvs`, logging records in iteration order. Later duplicates of a
  /// key replace earlier ones (in dup mode only exact key + data repeats).
  /// 载入 `kvs`，按迭代顺序写日志。同键后者覆盖前者（重复键模式下仅键与数据都相同才覆盖）。
  pub fn new<K, V>(conf: &[MemConf], kvs: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
  {
    let conf = ParsedMemConf::parse(conf);
    let log = Arc::new(MemLog::new(conf.file_cap));

    let recs = kvs
      .into_iter()
      .map(|(k, v)| {
        let (k, v) = (k.as_ref(), v.as_ref());
        let key = if conf.dup {
          crate::dup::combine(k, v)
        } else {
          Bytes::copy_from_slice(k)
        };
        (key, Bytes::copy_from_slice(v))
      })
      .collect();

    let tree = MemTree::build(
      log.clone(),
      recs,
      tree::Layout {
        bin_cap: conf.bin_cap,
        upper_cap: conf.upper_cap,
        dup: conf.dup,
        deferred_write: conf.deferred_write,
        resident: conf.resident,
      },
    );

    Self {
      tree: Arc::new(tree),
      log,
      cleaner: Arc::new(MemCleaner::new()),
    }
  }

  /// Open a disk-ordered cursor / 打开磁盘顺序游标
  pub fn cursor(&self, conf: &[Conf]) -> Result<Cursor> {
    Cursor::open(
      self.tree.clone(),
      self.log.clone(),
      self.cleaner.clone(),
      conf,
    )
  }
}
