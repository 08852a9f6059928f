//! Disk-ordered cursor configuration / 磁盘顺序游标配置

use std::time::Duration;

pub const DEFAULT_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_OFFER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_DELTA_FACTOR: u32 = 2;

/// Configuration options / 配置选项
#[derive(Debug, Clone, Copy)]
pub enum Conf {
  /// Emit keys only, default false / 只输出键，默认 false
  KeysOnly(bool),
  /// Max pending LSNs per batch, default unbounded
  /// 每批最多待处理 LSN 数，默认不限
  LsnBatchSize(u64),
  /// Max estimated accumulator bytes per batch, default unbounded
  /// 每批累加器估算内存上限，默认不限
  MemLimit(u64),
  /// Queue capacity, default 1000 / 队列容量，默认 1000
  QueueSize(usize),
  /// Producer per-attempt enqueue timeout / 生产者单次入队超时
  OfferTimeout(Duration),
  /// Consumer per-poll timeout / 消费者单次轮询超时
  PollTimeout(Duration),
  /// Delta memory estimate = avg node size in file * factor
  /// 增量内存估算 = 文件内平均节点大小 * 系数
  DeltaFactor(u32),
}

/// Parsed config / 解析后的配置
#[derive(Debug, Clone, Copy)]
pub struct ParsedConf {
  pub keys_only: bool,
  pub lsn_batch_size: u64,
  pub mem_limit: u64,
  pub queue_size: usize,
  pub offer_timeout: Duration,
  pub poll_timeout: Duration,
  pub delta_factor: u32,
}

impl Default for ParsedConf {
  fn default() -> Self {
    Self {
      keys_only: false,
      lsn_batch_size: u64::MAX,
      mem_limit: u64::MAX,
      queue_size: DEFAULT_QUEUE_SIZE,
      offer_timeout: DEFAULT_OFFER_TIMEOUT,
      poll_timeout: DEFAULT_POLL_TIMEOUT,
      delta_factor: DEFAULT_DELTA_FACTOR,
    }
  }
}

impl ParsedConf {
  pub fn parse(conf: &[Conf]) -> Self {
    let mut c = Self::default();
    for item in conf {
      match *item {
        Conf::KeysOnly(v) => c.keys_only = v,
        Conf::LsnBatchSize(v) => c.lsn_batch_size = v,
        Conf::MemLimit(v) => c.mem_limit = v,
        Conf::QueueSize(v) => c.queue_size = v,
        Conf::OfferTimeout(v) => c.offer_timeout = v,
        Conf::PollTimeout(v) => c.poll_timeout = v,
        Conf::DeltaFactor(v) => c.delta_factor = v,
      }
    }
    // At least 1 / 至少为 1
    c.mem_limit = c.mem_limit.max(1);
    c.queue_size = c.queue_size.max(1);
    c
  }
}
