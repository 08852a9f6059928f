#![cfg_attr(docsrs, feature(doc_cfg))]

//! jdb_dos - Disk-ordered scan
//! 磁盘顺序扫描
//!
//! Enumerates every live record of a log-structured B-tree, reading record
//! locations in log order instead of key order to cut random I/O.
//! 枚举日志结构 B 树中的所有存活记录，按日志顺序而非键序读取以减少随机 I/O。

mod conf;
mod cursor;
pub mod dup;
mod entry;
mod error;
pub mod mem;
mod node;
mod scan;

pub use conf::{
  Conf, DEFAULT_DELTA_FACTOR, DEFAULT_OFFER_TIMEOUT, DEFAULT_POLL_TIMEOUT, DEFAULT_QUEUE_SIZE,
  ParsedConf,
};
pub use cursor::{Cursor, Rec, Status};
pub use entry::{
  BIN_ONLY, BIN_OR_DELTA, Bin, BinDelta, Entry, FileSummary, Kind, LN_ONLY, Ln, Slot,
};
pub use error::{Error, Result};
pub use jdb_lsn::Lsn;
pub use node::{BinNode, Cleaner, LnRef, Log, Protect, Tree, UpperNode};
pub use scan::{Processor, ScanStats, Scanner};
