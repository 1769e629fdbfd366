//! Table identifiers, row references and index sizing.
//!
//! - [`TableId`] - the 45 tables and their numbering
//! - [`TableIndex`] - zero-based row reference
//! - [`CodedIndexType`] / [`CodedSlot`] - polymorphic references and their tag layout
//! - [`TableInfo`] - row counts plus heap widths, decides every column width

mod codedindex;
mod index;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndexType, CodedSlot};
pub use index::TableIndex;
pub use tableid::{TableId, TABLE_COUNT};
pub use tableinfo::TableInfo;
