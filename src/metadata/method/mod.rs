//! Method bodies and CIL instructions.
//!
//! `MethodDef.RVA` points at a method body: a tiny or fat header, the IL code and optional
//! exception handling sections. The body is decoded into [`Instruction`]s whose operands
//! reference metadata rows through [`crate::metadata::tables::TableIndex`] and carry `ldstr`
//! literals as strings, so a body can be moved between images without fixing up tokens.
//!
//! # Key Components
//!
//! - [`MethodBody`] - header fields, instructions and exception blocks
//! - [`Instruction`] / [`Operand`] - one decoded instruction
//! - [`OpCode`] - the ECMA-335 Partition III opcode table
//! - [`ExceptionBlock`] - one protected region
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::metadata::{
//!     method::{Instruction, MethodBody, OpCode, Operand},
//!     streams::UserStringsBuilder,
//! };
//!
//! let body = MethodBody::new(vec![
//!     Instruction::with_operand(OpCode::LDC_I4_S, Operand::Int8(42)),
//!     Instruction::new(OpCode::RET),
//! ]);
//!
//! let mut user_strings = UserStringsBuilder::new();
//! assert_eq!(body.encode(&mut user_strings)?, [0x0E, 0x1F, 0x2A, 0x2A]);
//! # Ok::<(), dotmeta::Error>(())
//! ```
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Common Intermediate Language physical layout
//! - ECMA-335 6th Edition, Partition III - CIL instruction set

mod body;
mod exceptions;
mod instruction;
mod opcodes;

pub use body::*;
pub use exceptions::*;
pub use instruction::*;
pub use opcodes::*;

use crate::{
    metadata::tables::{
        kind_mismatch, ColumnKind, ColumnSchema, ColumnValue, ReadContext, WriteContext,
    },
    Result,
};

/// `MethodDef.RVA`: the body is loaded after the tables, once the sections are known.
impl ColumnValue for Option<MethodBody> {
    fn read_column(
        _ctx: &ReadContext,
        column: &ColumnSchema,
        _raw: &[u32],
        _index: usize,
    ) -> Result<Self> {
        if column.kind != ColumnKind::Rva {
            return Err(kind_mismatch(column));
        }
        Ok(None)
    }

    fn write_column(
        &self,
        ctx: &mut WriteContext,
        column: &ColumnSchema,
        _previous: &[u32],
    ) -> Result<u32> {
        if column.kind != ColumnKind::Rva {
            return Err(kind_mismatch(column));
        }
        if let Some(body) = self {
            let encoded = body.encode(&mut ctx.user_strings)?;
            let row = ctx.current.index;
            ctx.method_bodies.push((row, encoded));
        }
        Ok(0)
    }
}
