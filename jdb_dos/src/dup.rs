//! Duplicate database key codec / 重复键数据库的键编码
//!
//! Tree key = key ‖ data ‖ u32-le(key.len()), so slots with the same key
//! are ordered by data.
//! 树键 = key ‖ data ‖ u32-le(key.len())，同键槽位按数据排序。

use bytes::{BufMut, Bytes, BytesMut};

const LEN_SIZE: usize = 4;

/// Largest key a tree key can carry / 树键可承载的最大键长
pub const MAX_KEY_LEN: usize = u32::MAX as usize;

/// Build tree key, `key` must not exceed [`MAX_KEY_LEN`] bytes
/// 构建树键，`key` 不得超过 [`MAX_KEY_LEN`] 字节
pub fn combine(key: &[u8], data: &[u8]) -> Bytes {
  debug_assert!(key.len() <= MAX_KEY_LEN, "dup key too long");
  let mut buf = BytesMut::with_capacity(key.len() + data.len() + LEN_SIZE);
  buf.put_slice(key);
  buf.put_slice(data);
  buf.put_u32_le(key.len() as u32);
  buf.freeze()
}

/// Split tree key into (key, data) / 拆分树键为 (key, data)
pub fn split(tree_key: &[u8]) -> Option<(Bytes, Bytes)> {
  let body_len = tree_key.len().checked_sub(LEN_SIZE)?;
  let (body, len) = tree_key.split_at(body_len);
  let key_len = u32::from_le_bytes(len.try_into().ok()?) as usize;
  if key_len > body.len() {
    return None;
  }
  let (key, data) = body.split_at(key_len);
  Some((Bytes::copy_from_slice(key), Bytes::copy_from_slice(data)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn combine_split() {
    let k = combine(b"user", b"1001");
    let (key, data) = split(&k).unwrap();
    assert_eq!(&key[..], b"user");
    assert_eq!(&data[..], b"1001");

    let k = combine(b"", b"");
    let (key, data) = split(&k).unwrap();
    assert!(key.is_empty() && data.is_empty());
  }

  #[test]
  fn same_key_sorted_by_data() {
    assert!(combine(b"a", b"1") < combine(b"a", b"2"));
    assert!(combine(b"a", b"9") < combine(b"b", b"0"));
  }

  #[test]
  fn len_trailer() {
    let k = combine(b"ab", b"c");
    assert_eq!(&k[k.len() - LEN_SIZE..], &2u32.to_le_bytes());
    assert_eq!(MAX_KEY_LEN as u64, u64::from(u32::MAX));
  }

  #[test]
  fn malformed() {
    assert!(split(b"abc").is_none());
    assert!(split(&[0, 9, 0, 0, 0]).is_none());
  }
}
