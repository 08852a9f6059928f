//! Disk-ordered scan errors / 磁盘顺序扫描错误

use std::sync::Arc;

use jdb_lsn::Lsn;
use thiserror::Error;

use crate::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// Log entry kind mismatch, store is corrupted / 日志条目类型不符，存储已损坏
  #[error("unexpected state: expected {expect:?} but got {got:?} LSN={lsn}")]
  UnexpectedKind {
    lsn: Lsn,
    expect: &'static [Kind],
    got: Kind,
  },

  #[error("log entry not found: {0}")]
  NoEntry(Lsn),

  #[error("bad log entry at {0}")]
  Decode(Lsn),

  #[error("bad duplicate key / 无效的重复键")]
  BadDupKey,

  /// Raised on the consumer side, wraps the worker's failure
  /// 消费端抛出，包装生产线程的错误
  #[error("producer thread failure: {0}")]
  Producer(#[source] Arc<Error>),

  #[error("producer disconnected / 生产线程已断开")]
  Interrupted,

  /// Cooperative stop, never reaches the consumer / 协作停止，不会传给消费者
  #[error("producer shutdown requested / 生产线程被要求停止")]
  Shutdown,

  #[error("producer panicked: {0}")]
  Panic(String),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}
