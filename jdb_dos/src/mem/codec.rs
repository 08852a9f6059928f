//! Log entry codec / 日志条目编解码
//!
//! Entry: [kind u8] [len u32] [payload]
//! - LN: [flag u8] [key_len u32] [key] ([data_len u32] [data] if live)
//! - BIN: [count u32] [slot]*
//! - Delta: [full_lsn u64] [count u32] [slot]*
//! - slot: [flag u8] [key_len u32] [key] [lsn u64]
//!
//! Lengths and counts are u32, the in-memory log addresses files with u32
//! offsets anyway.
//! 长度与计数为 u32，内存日志本身也以 u32 偏移寻址。

use bytes::{BufMut, Bytes};
use jdb_lsn::Lsn;

use crate::{Bin, BinDelta, Entry, Error, Kind, Ln, Result, Slot};

pub const HEAD_SIZE: usize = 5;

const KIND_LN: u8 = 1;
const KIND_BIN: u8 = 2;
const KIND_DELTA: u8 = 3;

const FLAG_DELETED: u8 = 1;

#[inline]
pub fn kind_byte(kind: Kind) -> u8 {
  match kind {
    Kind::Ln => KIND_LN,
    Kind::Bin => KIND_BIN,
    Kind::Delta => KIND_DELTA,
  }
}

fn put_slots(buf: &mut Vec<u8>, slots: &[Slot]) {
  buf.put_u32_le(slots.len() as u32);
  for s in slots {
    buf.put_u8(if s.deleted { FLAG_DELETED } else { 0 });
    buf.put_u32_le(s.key.len() as u32);
    buf.put_slice(&s.key);
    buf.put_u64_le(s.lsn.raw());
  }
}

/// Append encoded entry to `buf` / 将编码后的条目追加到 `buf`
pub fn encode(entry: &Entry, buf: &mut Vec<u8>) {
  let start = buf.len();
  buf.put_u8(kind_byte(entry.kind()));
  buf.put_u32_le(0);

  match entry {
    Entry::Ln(ln) => {
      buf.put_u8(if ln.is_deleted() { FLAG_DELETED } else { 0 });
      buf.put_u32_le(ln.key.len() as u32);
      buf.put_slice(&ln.key);
      if let Some(data) = &ln.data {
        buf.put_u32_le(data.len() as u32);
        buf.put_slice(data);
      }
    }
    Entry::Bin(bin) => put_slots(buf, &bin.slots),
    Entry::Delta(delta) => {
      buf.put_u64_le(delta.full_lsn.raw());
      put_slots(buf, &delta.slots);
    }
  }

  let len = (buf.len() - start - HEAD_SIZE) as u32;
  buf[start + 1..start + HEAD_SIZE].copy_from_slice(&len.to_le_bytes());
}

/// Bounds-checked reader / 带边界检查的读取器
struct Rd<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> Rd<'a> {
  fn take(&mut self, n: usize) -> Option<&'a [u8]> {
    let end = self.pos.checked_add(n)?;
    let s = self.buf.get(self.pos..end)?;
    self.pos = end;
    Some(s)
  }

  fn u8(&mut self) -> Option<u8> {
    Some(self.take(1)?[0])
  }

  fn u32(&mut self) -> Option<u32> {
    Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
  }

  fn u64(&mut self) -> Option<u64> {
    Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
  }

  fn bytes(&mut self, n: usize) -> Option<Bytes> {
    self.take(n).map(Bytes::copy_from_slice)
  }

  fn slots(&mut self) -> Option<Vec<Slot>> {
    let count = self.u32()? as usize;
    // Each slot takes at least 13 bytes / 每个槽位至少 13 字节
    let mut slots = Vec::with_capacity(count.min(self.buf.len() / 13));
    for _ in 0..count {
      let deleted = self.u8()? & FLAG_DELETED != 0;
      let klen = self.u32()? as usize;
      let key = self.bytes(klen)?;
      let lsn = Lsn::from_raw(self.u64()?);
      slots.push(Slot { key, lsn, deleted });
    }
    Some(slots)
  }
}

fn decode_payload(kind: u8, payload: &[u8]) -> Option<Entry> {
  let mut rd = Rd {
    buf: payload,
    pos: 0,
  };
  let entry = match kind {
    KIND_LN => {
      let deleted = rd.u8()? & FLAG_DELETED != 0;
      let klen = rd.u32()? as usize;
      let key = rd.bytes(klen)?;
      let data = if deleted {
        None
      } else {
        let dlen = rd.u32()? as usize;
        Some(rd.bytes(dlen)?)
      };
      Entry::Ln(Ln { key, data })
    }
    KIND_BIN => Entry::Bin(Bin { slots: rd.slots()? }),
    KIND_DELTA => {
      let full_lsn = Lsn::from_raw(rd.u64()?);
      Entry::Delta(BinDelta {
        full_lsn,
        slots: rd.slots()?,
      })
    }
    _ => return None,
  };
  (rd.pos == payload.len()).then_some(entry)
}

/// Decode entry starting at `buf[0]`, return (entry, encoded size)
/// 解码从 `buf[0]` 开始的条目，返回 (条目, 编码长度)
pub fn decode(lsn: Lsn, buf: &[u8]) -> Result<(Entry, usize)> {
  let head = buf.get(..HEAD_SIZE).ok_or(Error::Decode(lsn))?;
  let kind = head[0];
  let len = u32::from_le_bytes([head[1], head[2], head[3], head[4]]) as usize;
  let payload = buf
    .get(HEAD_SIZE..HEAD_SIZE + len)
    .ok_or(Error::Decode(lsn))?;
  let entry = decode_payload(kind, payload).ok_or(Error::Decode(lsn))?;
  Ok((entry, HEAD_SIZE + len))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn slot(k: &'static [u8], n: u32, deleted: bool) -> Slot {
    Slot {
      key: Bytes::from_static(k),
      lsn: Lsn::new(1, n),
      deleted,
    }
  }

  #[test]
  fn entries_survive_codec() {
    let entries = [
      Entry::Ln(Ln {
        key: Bytes::from_static(b"k1"),
        data: Some(Bytes::from_static(b"v1")),
      }),
      Entry::Ln(Ln {
        key: Bytes::from_static(b"gone"),
        data: None,
      }),
      Entry::Bin(Bin {
        slots: vec![slot(b"a", 1, false), slot(b"b", 2, true)],
      }),
      Entry::Delta(BinDelta {
        full_lsn: Lsn::new(3, 40),
        slots: vec![slot(b"c", 9, false)],
      }),
    ];

    let mut buf = Vec::new();
    let mut offsets = Vec::new();
    for e in &entries {
      offsets.push(buf.len());
      encode(e, &mut buf);
    }

    for (e, off) in entries.iter().zip(offsets) {
      let (got, _) = decode(Lsn::new(0, off as u32), &buf[off..]).unwrap();
      assert_eq!(&got, e);
    }
  }

  #[test]
  fn truncated_and_unknown() {
    let mut buf = Vec::new();
    encode(
      &Entry::Bin(Bin {
        slots: vec![slot(b"key", 1, false)],
      }),
      &mut buf,
    );
    let lsn = Lsn::new(0, 0);
    assert!(matches!(
      decode(lsn, &buf[..buf.len() - 1]),
      Err(Error::Decode(_))
    ));

    buf[0] = 77;
    assert!(matches!(decode(lsn, &buf), Err(Error::Decode(_))));
  }

  #[test]
  fn wide_counts_and_keys() {
    let big_key = Bytes::from(vec![7u8; 70_000]);
    let entries = [
      Entry::Bin(Bin {
        slots: (0..70_000u32)
          .map(|i| Slot {
            key: Bytes::copy_from_slice(&i.to_be_bytes()),
            lsn: Lsn::new(0, i),
            deleted: false,
          })
          .collect(),
      }),
      Entry::Ln(Ln {
        key: big_key.clone(),
        data: Some(Bytes::from_static(b"v")),
      }),
      Entry::Delta(BinDelta {
        full_lsn: Lsn::new(0, 0),
        slots: vec![Slot {
          key: big_key,
          lsn: Lsn::new(1, 1),
          deleted: true,
        }],
      }),
    ];
    for e in &entries {
      let mut buf = Vec::new();
      encode(e, &mut buf);
      let (got, n) = decode(Lsn::new(0, 0), &buf).unwrap();
      assert_eq!(n, buf.len());
      assert_eq!(&got, e);
    }
  }
}
