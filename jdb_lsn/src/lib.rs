#![cfg_attr(docsrs, feature(doc_cfg))]

//! jdb_lsn - Log sequence number & LSN accumulator
//! 日志序号与 LSN 累加器

mod acc;
mod lsn;

pub use acc::{FILE_MEM, LsnAcc, MemNote, SEG_LEN, SEG_MEM};
pub use lsn::Lsn;
