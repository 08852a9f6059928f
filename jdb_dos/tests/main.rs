//! Cursor tests / 游标测试

use std::{
  collections::{BTreeMap, HashSet},
  sync::Arc,
  thread::sleep,
  time::Duration,
};

use aok::{OK, Void};
use bytes::Bytes;
use jdb_dos::{
  Bin, Conf, Cursor, Entry, Error, Kind, Log, Lsn, Result, Status,
  mem::{MemConf, MemDb, MemLog},
};
use log::info;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

fn kvs(n: usize) -> Vec<(String, String)> {
  (0..n)
    .map(|i| (format!("{i:06}"), format!("Record {i}")))
    .collect()
}

fn text(b: &Bytes) -> String {
  String::from_utf8_lossy(b).into_owned()
}

/// Wait up to 5s / 最多等待 5 秒
fn wait(f: impl Fn() -> bool) -> bool {
  for _ in 0..500 {
    if f() {
      return true;
    }
    sleep(Duration::from_millis(10));
  }
  false
}

#[test]
fn test_all_records() -> Void {
  let db = MemDb::new(
    &[MemConf::BinCap(64), MemConf::FileCap(1 << 14)],
    kvs(5000),
  );
  let mut cursor = db.cursor(&[Conf::QueueSize(1000)])?;
  assert_eq!(cursor.get_current(), Status::KeyEmpty);
  assert!(cursor.current().is_none());

  let mut got = BTreeMap::new();
  while cursor.get_next()? == Status::Success {
    assert_eq!(cursor.get_current(), Status::Success);
    let Some(rec) = cursor.current() else {
      panic!("no current record");
    };
    let prev = got.insert(text(&rec.key), rec.data.as_ref().map(text));
    assert!(prev.is_none());
  }

  assert_eq!(got.len(), 5000);
  for (k, v) in kvs(5000) {
    assert_eq!(got[&k], Some(v));
  }

  // End is sticky / 结束状态保持
  assert_eq!(cursor.get_next()?, Status::NotFound);
  assert_eq!(cursor.get_next()?, Status::NotFound);
  assert_eq!(cursor.get_current(), Status::KeyEmpty);
  assert!(cursor.iterations() >= 1);

  assert!(wait(|| cursor.producer_done()));
  assert!(!db.cleaner.is_protected());
  OK
}

#[test]
fn test_iterator() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(16)], kvs(300));
  let mut n = 0;
  for rec in db.cursor(&[Conf::LsnBatchSize(20)])? {
    let rec = rec?;
    assert!(rec.data.is_some());
    n += 1;
  }
  assert_eq!(n, 300);
  OK
}

#[test]
fn test_backpressure() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(8)], kvs(200));
  let mut cursor = db.cursor(&[Conf::QueueSize(1)])?;

  let mut keys = Vec::new();
  while cursor.get_next()? == Status::Success {
    assert!(cursor.remaining_capacity() <= 1);
    if let Some(rec) = cursor.current() {
      keys.push(text(&rec.key));
    }
    if keys.len() % 20 == 0 {
      sleep(Duration::from_millis(5));
    }
  }

  // Records logged in key order come back in key order
  // 按键序写入的记录按键序返回
  let want: Vec<String> = kvs(200).into_iter().map(|(k, _)| k).collect();
  assert_eq!(keys, want);
  OK
}

#[test]
fn test_keys_only() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(32), MemConf::Resident(true)], kvs(1000));
  let recs: Vec<_> = db
    .cursor(&[Conf::KeysOnly(true)])?
    .collect::<Result<_>>()?;
  assert_eq!(recs.len(), 1000);
  assert!(recs.iter().all(|r| r.data.is_none()));
  let keys: HashSet<String> = recs.iter().map(|r| text(&r.key)).collect();
  assert_eq!(keys.len(), 1000);
  OK
}

#[test]
fn test_dup() -> Void {
  let recs: Vec<(String, String)> = (0..300)
    .map(|i| (format!("k{}", i % 30), format!("d{i:04}")))
    .collect();
  let db = MemDb::new(&[MemConf::Dup(true), MemConf::BinCap(16)], recs.clone());

  let mut got: Vec<(String, String)> = Vec::new();
  for rec in db.cursor(&[Conf::LsnBatchSize(4)])? {
    let rec = rec?;
    got.push((text(&rec.key), rec.data.as_ref().map(text).unwrap_or_default()));
  }
  got.sort();
  let mut want = recs;
  want.sort();
  assert_eq!(got, want);
  OK
}

#[test]
fn test_close_mid_scan() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(64)], kvs(5000));
  let mut cursor = db.cursor(&[
    Conf::QueueSize(10),
    Conf::OfferTimeout(Duration::from_millis(20)),
  ])?;

  for _ in 0..5 {
    assert_eq!(cursor.get_next()?, Status::Success);
  }
  assert!(db.cleaner.is_protected());

  cursor.close();
  cursor.close();
  assert!(cursor.is_closed());
  assert_eq!(cursor.get_next()?, Status::NotFound);
  assert_eq!(cursor.get_current(), Status::KeyEmpty);
  assert!(cursor.current().is_none());

  assert!(wait(|| cursor.producer_done()));
  assert!(!db.cleaner.is_protected());
  OK
}

#[test]
fn test_drop_mid_scan() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(64)], kvs(5000));
  {
    let mut cursor = db.cursor(&[Conf::QueueSize(4)])?;
    assert_eq!(cursor.get_next()?, Status::Success);
  }
  // Dropped receiver wakes the producer at once / 接收端释放后生产者立即醒来
  assert!(wait(|| !db.cleaner.is_protected()));
  OK
}

/// Returns a node where a record is expected / 在期望记录处返回节点
struct WrongKind(Arc<MemLog>);

impl Log for WrongKind {
  fn fetch(&self, lsn: Lsn) -> Result<Entry> {
    match self.0.fetch(lsn)? {
      Entry::Ln(_) => Ok(Entry::Bin(Bin::default())),
      e => Ok(e),
    }
  }
}

#[test]
fn test_wrong_kind() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(16)], kvs(100));
  let mut cursor = Cursor::open(
    db.tree.clone(),
    Arc::new(WrongKind(db.log.clone())),
    db.cleaner.clone(),
    &[Conf::PollTimeout(Duration::from_millis(50))],
  )?;

  let err = match cursor.get_next() {
    Err(e) => e,
    Ok(s) => panic!("expected error, got {s:?}"),
  };
  info!("{err}");
  let Error::Producer(inner) = &err else {
    panic!("expected producer error, got {err:?}");
  };
  assert!(matches!(
    &**inner,
    Error::UnexpectedKind {
      expect: [Kind::Ln],
      got: Kind::Bin,
      ..
    }
  ));
  assert!(inner.to_string().contains("unexpected state"));

  // Raised once, then the cursor is at its end / 只返回一次，之后游标处于结束状态
  assert_eq!(cursor.get_next()?, Status::NotFound);
  assert_eq!(cursor.get_next()?, Status::NotFound);
  assert_eq!(cursor.get_current(), Status::KeyEmpty);
  cursor.close();
  assert_eq!(cursor.get_next()?, Status::NotFound);
  assert!(wait(|| !db.cleaner.is_protected()));
  OK
}

#[test]
fn test_iterator_ends_after_error() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(16)], kvs(100));
  let cursor = Cursor::open(
    db.tree.clone(),
    Arc::new(WrongKind(db.log.clone())),
    db.cleaner.clone(),
    &[Conf::PollTimeout(Duration::from_millis(50))],
  )?;

  let items: Vec<Result<_>> = cursor.take(1000).collect();
  assert_eq!(items.len(), 1);
  assert!(matches!(items[0], Err(Error::Producer(_))));
  OK
}

struct Boom(Arc<MemLog>);

impl Log for Boom {
  fn fetch(&self, lsn: Lsn) -> Result<Entry> {
    if let Ok(Entry::Ln(_)) = self.0.fetch(lsn) {
      panic!("boom");
    }
    self.0.fetch(lsn)
  }
}

#[test]
fn test_producer_panic() -> Void {
  let db = MemDb::new(&[], kvs(10));
  let mut cursor = Cursor::open(
    db.tree.clone(),
    Arc::new(Boom(db.log.clone())),
    db.cleaner.clone(),
    &[Conf::PollTimeout(Duration::from_millis(50))],
  )?;

  match cursor.get_next() {
    Err(Error::Producer(e)) => assert!(matches!(&*e, Error::Panic(m) if m == "boom")),
    r => panic!("expected panic error, got {r:?}"),
  }
  assert!(wait(|| cursor.producer_done()));
  assert!(!db.cleaner.is_protected());
  OK
}

#[test]
fn test_concurrent_writes() -> Void {
  let db = MemDb::new(&[MemConf::BinCap(16), MemConf::Resident(true)], kvs(2000));
  let mut cursor = db.cursor(&[Conf::QueueSize(8), Conf::LsnBatchSize(64)])?;

  // Writer runs while the scan is in progress / 扫描进行中写入
  let tree = db.tree.clone();
  let writer = std::thread::spawn(move || -> Result<()> {
    for i in 2000..2100 {
      tree.put(format!("{i:06}").as_bytes(), b"late")?;
    }
    Ok(())
  });

  let mut keys = HashSet::new();
  while cursor.get_next()? == Status::Success {
    if let Some(rec) = cursor.current() {
      assert!(keys.insert(text(&rec.key)));
    }
  }
  assert!(writer.join().is_ok_and(|r| r.is_ok()));

  // Every record present before the scan is returned / 扫描前已存在的记录都会返回
  for (k, _) in kvs(2000) {
    assert!(keys.contains(&k));
  }
  OK
}
