//! The metadata tables.
//!
//! The table stream (`#~`, or `#-` for unoptimized metadata) holds up to 45 tables of fixed
//! size rows. Column widths depend on table row counts and heap sizes, so both directions
//! of the codec go through raw `u32` column values first:
//!
//! - reading: [`read_tables`] decodes the rows into a [`RawValueStorage`], then
//!   [`MetadataTables`] is resolved from it through a [`ReadContext`]
//! - writing: [`MetadataTables`] is flattened into a [`RawValueStorage`] through a
//!   [`WriteContext`] that fills the heaps, then [`write_tables`] encodes it with the final
//!   widths
//!
//! # Key Components
//!
//! - [`TableId`], [`TableIndex`], [`CodedIndexType`] - identifying tables and rows
//! - [`TableInfo`] - column and row sizes
//! - [`ColumnSchema`] / [`ColumnValue`] - the schema registry and the per-type conversions
//! - one `*Row` struct per table and the [`MetadataTables`] container
//! - attribute flags such as [`TypeAttributes`] and [`MethodAttributes`]
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::metadata::tables::{ColumnKind, CodedIndexType, TableId};
//!
//! let columns = TableId::TypeDef.columns();
//! assert_eq!(columns[1].name, "name");
//! assert_eq!(
//!     columns[3].kind,
//!     ColumnKind::CodedTableIndexNullable(CodedIndexType::TypeDefOrRef)
//! );
//! ```

#[macro_use]
mod macros;

mod codec;
mod columns;
mod context;
mod definitions;
mod flags;
mod lookup;
mod schema;
mod storage;
mod types;

pub use codec::{read_tables, tables_stream_size, write_tables};
pub use context::{ReadContext, WriteContext};
pub use definitions::*;
pub use flags::*;
pub use schema::{ColumnKind, ColumnSchema, ColumnValue};
pub use storage::RawValueStorage;
pub use types::*;

pub(crate) use schema::{kind_mismatch, raw_value};
