//! Property tests for LSN accumulator / LSN 累加器属性测试

use jdb_lsn::{Lsn, LsnAcc};
use proptest::prelude::*;

fn arb_lsn() -> impl Strategy<Value = Lsn> {
  (0u32..16, any::<u32>()).prop_map(|(file, offset)| Lsn::new(file, offset))
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(100))]

  /// Drain returns every added LSN in ascending order, memory returns to zero
  /// 取出返回全部已添加 LSN 且升序，内存归零
  #[test]
  fn prop_drain_is_sorted_permutation(li in prop::collection::vec(arb_lsn(), 0..600)) {
    let mut acc = LsnAcc::new();
    let mut mem = 0i64;
    for lsn in &li {
      acc.add(*lsn, &mut mem);
      prop_assert!(mem >= 0);
      prop_assert_eq!(mem as u64, acc.mem());
    }
    prop_assert_eq!(acc.pending(), li.len());

    let out = acc.drain_sorted(&mut mem);
    let mut want = li.clone();
    want.sort();
    prop_assert_eq!(out, want);
    prop_assert_eq!(mem, 0);
  }
}

#[test]
fn shuffled_files_come_back_grouped() {
  let mut li: Vec<Lsn> = (0..1000u32).map(|i| Lsn::new(i % 7, i * 3)).collect();
  fastrand::shuffle(&mut li);

  let mut acc = LsnAcc::new();
  for lsn in &li {
    acc.add(*lsn, &mut ());
  }
  let out = acc.drain_sorted(&mut ());
  assert!(out.windows(2).all(|w| w[0] < w[1]));
  assert_eq!(out.len(), 1000);
}
