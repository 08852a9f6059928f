//! Disk-ordered cursor / 磁盘顺序游标
//!
//! One producer thread runs the [`Scanner`] and pushes records into a bounded
//! queue; the consumer pulls them with [`Cursor::get_next`].
//! 一个生产线程运行扫描器并将记录推入有界队列，消费者通过 get_next 拉取。

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  thread,
};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::{Cleaner, Conf, Error, Log, ParsedConf, Processor, Protect, Result, Scanner, Tree};

const PRODUCER_NAME: &str = "dos-producer";

/// Scanned record, user format / 扫描到的记录（用户格式）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rec {
  pub key: Bytes,
  /// None in keys-only mode / 仅键模式下为 None
  pub data: Option<Bytes>,
}

/// Cursor operation status / 游标操作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Success,
  /// Scan finished / 扫描结束
  NotFound,
  /// No current record / 没有当前记录
  KeyEmpty,
}

enum Item {
  Rec(Rec),
  End,
}

enum Cur {
  Init,
  Rec(Rec),
  End,
}

/// State shared by producer and consumer / 生产者与消费者共享的状态
#[derive(Default)]
struct Shared {
  shutdown: AtomicBool,
  done: AtomicBool,
  iterations: AtomicU64,
  err: Mutex<Option<Arc<Error>>>,
}

impl Shared {
  #[inline]
  fn check(&self) -> Result<()> {
    if self.shutdown.load(Ordering::Acquire) {
      return Err(Error::Shutdown);
    }
    Ok(())
  }

  #[inline]
  fn err(&self) -> Option<Arc<Error>> {
    self.err.lock().clone()
  }
}

/// Queue side of the scanner / 扫描器的队列端
struct Sink {
  tx: Sender<Item>,
  cap: usize,
  offer_timeout: std::time::Duration,
  shared: Arc<Shared>,
}

impl Sink {
  /// Block until queued, retry while not shut down / 阻塞直到入队，未停止则重试
  fn offer(&self, mut item: Item) -> Result<()> {
    loop {
      self.shared.check()?;
      match self.tx.send_timeout(item, self.offer_timeout) {
        Ok(()) => return Ok(()),
        Err(SendTimeoutError::Timeout(back)) => item = back,
        Err(SendTimeoutError::Disconnected(_)) => {
          // Consumer is gone / 消费者已离开
          self.shared.shutdown.store(true, Ordering::Release);
          return Err(Error::Shutdown);
        }
      }
    }
  }

  fn close(&self) -> Result<()> {
    self.offer(Item::End)
  }
}

impl Processor for Sink {
  fn process(&mut self, key: Bytes, data: Option<Bytes>) -> Result<()> {
    self.offer(Item::Rec(Rec { key, data }))
  }

  fn can_process(&mut self, n: usize) -> Result<bool> {
    self.shared.check()?;
    Ok(self.cap.saturating_sub(self.tx.len()) >= n)
  }

  fn on_iteration(&mut self, n: u64) {
    self.shared.iterations.store(n, Ordering::Release);
  }
}

fn panic_msg(p: Box<dyn Any + Send>) -> String {
  if let Some(s) = p.downcast_ref::<&str>() {
    (*s).to_owned()
  } else if let Some(s) = p.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown".to_owned()
  }
}

/// Producer thread body / 生产线程主体
fn produce<T: Tree, L: Log, C: Cleaner>(
  tree: Arc<T>,
  log: Arc<L>,
  cleaner: Arc<C>,
  conf: ParsedConf,
  mut sink: Sink,
) {
  let shared = sink.shared.clone();
  {
    // Accumulated LSNs must stay readable / 累加的 LSN 必须保持可读
    let _protect = Protect::new(&*cleaner, 0);

    let r = panic::catch_unwind(AssertUnwindSafe(|| {
      Scanner::new(&*tree, &*log, &mut sink, &conf).scan()?;
      sink.close()
    }));

    let err = match r {
      Ok(Ok(())) => None,
      Ok(Err(Error::Shutdown)) => {
        debug!("{PRODUCER_NAME}: shutdown");
        None
      }
      Ok(Err(e)) => Some(e),
      Err(p) => Some(Error::Panic(panic_msg(p))),
    };

    if let Some(e) = err {
      warn!("{PRODUCER_NAME}: {e}");
      *shared.err.lock() = Some(Arc::new(e));
      // Best effort, the consumer also polls the error / 尽力而为，消费者也会轮询错误
      let _ = sink.tx.try_send(Item::End);
    }
  }
  shared.done.store(true, Ordering::Release);
}

/// Pull cursor over a disk-ordered scan / 磁盘顺序扫描的拉取游标
pub struct Cursor {
  rx: Receiver<Item>,
  cap: usize,
  poll_timeout: std::time::Duration,
  shared: Arc<Shared>,
  cur: Cur,
  closed: bool,
  /// Producer error already returned / 生产者错误已返回
  failed: bool,
}

impl Cursor {
  /// Start the producer thread / 启动生产线程
  pub fn open<T, L, C>(tree: Arc<T>, log: Arc<L>, cleaner: Arc<C>, conf: &[Conf]) -> Result<Self>
  where
    T: Tree + 'static,
    L: Log + 'static,
    C: Cleaner + 'static,
  {
    let conf = ParsedConf::parse(conf);
    let (tx, rx) = bounded(conf.queue_size);
    let shared = Arc::new(Shared::default());
    let sink = Sink {
      tx,
      cap: conf.queue_size,
      offer_timeout: conf.offer_timeout,
      shared: shared.clone(),
    };

    thread::Builder::new()
      .name(PRODUCER_NAME.into())
      .spawn(move || produce(tree, log, cleaner, conf, sink))?;

    Ok(Self {
      rx,
      cap: conf.queue_size,
      poll_timeout: conf.poll_timeout,
      shared,
      cur: Cur::Init,
      closed: false,
      failed: false,
    })
  }

  /// Next record, `NotFound` once the scan is over
  /// 下一条记录，扫描结束后返回 `NotFound`
  pub fn get_next(&mut self) -> Result<Status> {
    if self.closed || self.failed {
      return Ok(Status::NotFound);
    }

    // Never block again after the end / 结束后不再阻塞
    if !matches!(self.cur, Cur::End) {
      // Poll so a producer failure is seen even without a sentinel
      // 轮询，即使没有结束标记也能发现生产者错误
      let item = loop {
        match self.rx.recv_timeout(self.poll_timeout) {
          Ok(item) => break Some(item),
          Err(RecvTimeoutError::Timeout) => {
            if self.shared.err.lock().is_some() {
              break None;
            }
          }
          Err(RecvTimeoutError::Disconnected) => {
            if self.shared.err.lock().is_some() {
              break None;
            }
            self.cur = Cur::End;
            return Err(Error::Interrupted);
          }
        }
      };

      self.cur = match item {
        Some(Item::Rec(rec)) => Cur::Rec(rec),
        _ => Cur::End,
      };
    }

    // Raised once, later calls see the end / 只返回一次，之后的调用视为结束
    if let Some(e) = self.shared.err() {
      self.cur = Cur::End;
      self.failed = true;
      return Err(Error::Producer(e));
    }

    Ok(match self.cur {
      Cur::Rec(_) => Status::Success,
      _ => Status::NotFound,
    })
  }

  /// Status of the current record / 当前记录的状态
  pub fn get_current(&self) -> Status {
    match (&self.cur, self.closed) {
      (Cur::Rec(_), false) => Status::Success,
      _ => Status::KeyEmpty,
    }
  }

  /// Most recently returned record / 最近返回的记录
  pub fn current(&self) -> Option<&Rec> {
    match &self.cur {
      Cur::Rec(rec) if !self.closed => Some(rec),
      _ => None,
    }
  }

  /// Ask the producer to stop, does not wait / 通知生产者停止，不等待
  pub fn close(&mut self) {
    if self.closed {
      return;
    }
    self.shared.shutdown.store(true, Ordering::Release);
    self.closed = true;
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  pub fn remaining_capacity(&self) -> usize {
    self.cap.saturating_sub(self.rx.len())
  }

  /// Finished scanner iterations / 已完成的扫描迭代数
  pub fn iterations(&self) -> u64 {
    self.shared.iterations.load(Ordering::Acquire)
  }

  /// Producer thread has exited / 生产线程已退出
  pub fn producer_done(&self) -> bool {
    self.shared.done.load(Ordering::Acquire)
  }
}

impl Iterator for Cursor {
  type Item = Result<Rec>;

  fn next(&mut self) -> Option<Self::Item> {
    match self.get_next() {
      Ok(Status::Success) => self.current().cloned().map(Ok),
      Ok(_) => None,
      Err(e) => Some(Err(e)),
    }
  }
}

impl Drop for Cursor {
  fn drop(&mut self) {
    self.close();
  }
}
