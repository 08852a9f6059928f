//! Log sequence number / 日志序号

use std::fmt;

/// Physical location of an entry in the append-only log
/// 追加日志中条目的物理位置
///
/// Packed as `file << 32 | offset`, so the derived order is (file, offset).
/// 按 `file << 32 | offset` 打包，派生顺序即 (file, offset)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(u64);

impl Lsn {
  /// No location, file `u32::MAX` is reserved for it / 空位置，文件号 `u32::MAX` 为其保留
  pub const NULL: Lsn = Lsn(u64::MAX);

  /// Highest usable file number / 可用的最大文件号
  pub const MAX_FILE: u32 = u32::MAX - 1;

  /// `file` must not exceed [`Lsn::MAX_FILE`], use [`Lsn::try_new`] for
  /// unchecked input
  /// `file` 不得超过 [`Lsn::MAX_FILE`]，未校验的输入请用 [`Lsn::try_new`]
  #[inline]
  pub const fn new(file: u32, offset: u32) -> Self {
    debug_assert!(file <= Self::MAX_FILE, "file number reserved for NULL_LSN");
    Self(((file as u64) << 32) | offset as u64)
  }

  /// None for the reserved file number / 文件号为保留值时返回 None
  #[inline]
  pub const fn try_new(file: u32, offset: u32) -> Option<Self> {
    if file > Self::MAX_FILE {
      return None;
    }
    Some(Self(((file as u64) << 32) | offset as u64))
  }

  /// File number / 文件号
  #[inline]
  pub const fn file(self) -> u32 {
    (self.0 >> 32) as u32
  }

  /// Byte offset in file / 文件内字节偏移
  #[inline]
  pub const fn offset(self) -> u32 {
    self.0 as u32
  }

  #[inline]
  pub const fn is_null(self) -> bool {
    self.0 == u64::MAX
  }

  #[inline]
  pub const fn raw(self) -> u64 {
    self.0
  }

  #[inline]
  pub const fn from_raw(raw: u64) -> Self {
    Self(raw)
  }
}

impl fmt::Display for Lsn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_null() {
      return f.write_str("NULL_LSN");
    }
    write!(f, "0x{:x}/0x{:x}", self.file(), self.offset())
  }
}

impl From<Lsn> for u64 {
  #[inline]
  fn from(lsn: Lsn) -> u64 {
    lsn.0
  }
}
