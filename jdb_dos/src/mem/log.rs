//! In-memory log / 内存日志

use std::collections::HashMap;

use jdb_lsn::Lsn;
use parking_lot::{Mutex, RwLock};

use super::codec;
use crate::{Entry, Error, FileSummary, Kind, Log, Result};

#[derive(Default)]
struct Inner {
  files: Vec<Vec<u8>>,
  summaries: HashMap<u32, FileSummary>,
}

/// Append-only log split into files / 按文件切分的追加日志
pub struct MemLog {
  inner: RwLock<Inner>,
  file_cap: usize,
  /// LSNs in fetch order / 按读取顺序记录的 LSN
  trace: Mutex<Vec<Lsn>>,
}

impl MemLog {
  pub fn new(file_cap: usize) -> Self {
    Self {
      inner: RwLock::new(Inner::default()),
      file_cap: file_cap.max(1),
      trace: Mutex::new(Vec::new()),
    }
  }

  /// Write entry, roll to a new file when full / 写入条目，文件满则切换新文件
  pub fn append(&self, entry: &Entry) -> Lsn {
    let mut buf = Vec::new();
    codec::encode(entry, &mut buf);

    let mut inner = self.inner.write();
    let roll = match inner.files.last() {
      Some(f) => !f.is_empty() && f.len() + buf.len() > self.file_cap,
      None => true,
    };
    if roll {
      inner.files.push(Vec::with_capacity(self.file_cap));
    }

    let idx = inner.files.len() - 1;
    let f = &mut inner.files[idx];
    let offset = f.len() as u32;
    f.extend_from_slice(&buf);
    let file = idx as u32;

    if entry.kind() != Kind::Ln {
      let s = inner.summaries.entry(file).or_default();
      s.node_count += 1;
      s.node_size += buf.len() as u64;
    }
    Lsn::new(file, offset)
  }

  pub fn file_count(&self) -> usize {
    self.inner.read().files.len()
  }

  /// Total bytes written / 已写入总字节
  pub fn size(&self) -> u64 {
    self.inner.read().files.iter().map(|f| f.len() as u64).sum()
  }

  /// Fetched LSNs since last [`MemLog::clear_trace`] / 自上次清空以来读取的 LSN
  pub fn fetched(&self) -> Vec<Lsn> {
    self.trace.lock().clone()
  }

  pub fn clear_trace(&self) {
    self.trace.lock().clear();
  }
}

impl Log for MemLog {
  fn fetch(&self, lsn: Lsn) -> Result<Entry> {
    let entry = {
      let inner = self.inner.read();
      let buf = inner
        .files
        .get(lsn.file() as usize)
        .and_then(|f| f.get(lsn.offset() as usize..))
        .filter(|b| !b.is_empty())
        .ok_or(Error::NoEntry(lsn))?;
      codec::decode(lsn, buf)?.0
    };
    self.trace.lock().push(lsn);
    Ok(entry)
  }

  fn summaries(&self) -> HashMap<u32, FileSummary> {
    self.inner.read().summaries.clone()
  }
}
