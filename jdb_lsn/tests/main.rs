use aok::{OK, Void};
use jdb_lsn::{FILE_MEM, Lsn, LsnAcc, SEG_LEN, SEG_MEM};
use log::info;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

#[test]
fn test_lsn_order() -> Void {
  let a = Lsn::new(1, 900);
  let b = Lsn::new(2, 10);
  let c = Lsn::new(2, 11);
  assert!(a < b);
  assert!(b < c);
  assert_eq!(b.file(), 2);
  assert_eq!(b.offset(), 10);
  assert_eq!(Lsn::from_raw(c.raw()), c);
  assert_eq!(format!("{c}"), "0x2/0xb");
  assert!(Lsn::NULL.is_null());
  assert_eq!(format!("{}", Lsn::NULL), "NULL_LSN");
  OK
}

#[test]
fn test_null_reserved() -> Void {
  // Last real location sorts below NULL / 最后一个真实位置排在 NULL 之前
  let last = Lsn::new(Lsn::MAX_FILE, u32::MAX);
  assert!(!last.is_null());
  assert!(last < Lsn::NULL);
  assert_eq!(Lsn::try_new(Lsn::MAX_FILE, u32::MAX), Some(last));
  assert_eq!(Lsn::try_new(u32::MAX, 0), None);
  assert_eq!(Lsn::try_new(u32::MAX, u32::MAX), None);
  OK
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "reserved")]
fn test_null_file_rejected() {
  let _ = Lsn::new(u32::MAX, u32::MAX);
}

#[test]
fn test_drain_sorted() -> Void {
  let mut acc = LsnAcc::new();
  let mut mem = 0i64;

  // Insert out of order / 乱序插入
  for (file, offset) in [(3, 5), (1, 70), (3, 1), (2, 0), (1, 2)] {
    acc.add(Lsn::new(file, offset), &mut mem);
  }
  assert_eq!(acc.pending(), 5);
  assert_eq!(mem as u64, acc.mem());
  assert_eq!(acc.mem(), 3 * (FILE_MEM + SEG_MEM));

  let li = acc.drain_sorted(&mut mem);
  let want: Vec<Lsn> = [(1, 2), (1, 70), (2, 0), (3, 1), (3, 5)]
    .into_iter()
    .map(|(f, o)| Lsn::new(f, o))
    .collect();
  assert_eq!(li, want);

  // Drain releases everything / 取出后释放全部
  assert!(acc.is_empty());
  assert_eq!(mem, 0);
  assert_eq!(acc.mem(), 0);
  info!("drain sorted ok");
  OK
}

#[test]
fn test_segment_accounting() -> Void {
  let mut acc = LsnAcc::new();
  let mut mem = 0i64;

  for i in 0..SEG_LEN as u32 {
    acc.add(Lsn::new(7, i), &mut mem);
  }
  assert_eq!(mem as u64, FILE_MEM + SEG_MEM);

  // Next offset opens a new segment / 下一个偏移开启新段
  acc.add(Lsn::new(7, SEG_LEN as u32), &mut mem);
  assert_eq!(mem as u64, FILE_MEM + 2 * SEG_MEM);

  acc.clear(&mut mem);
  assert_eq!(mem, 0);
  assert_eq!(acc.pending(), 0);

  // Reusable after clear / 清空后可复用
  acc.add(Lsn::new(1, 1), &mut ());
  assert_eq!(acc.pending(), 1);
  OK
}
