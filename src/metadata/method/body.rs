//! Method bodies: header, IL code and exception sections (ECMA-335 II.25.4).
//!
//! A tiny header is a single byte holding the code size, used for bodies with fewer than 64
//! bytes of code, no locals, no exception handling, a stack of at most 8 and without
//! `InitLocals`. Every other body gets a 12-byte fat header.

use bitflags::bitflags;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::{
        method::{
            decode_instructions, encode_instructions, exception_sections_size,
            read_exception_sections, write_exception_sections, ExceptionBlock, Instruction,
        },
        streams::{UserStrings, UserStringsBuilder},
        tables::{TableId, TableIndex},
        token::Token,
    },
    Result,
};

/// Largest code size of a tiny header.
pub const MAX_TINY_CODE_SIZE: usize = 63;

/// Stack size implied by a tiny header.
pub const TINY_MAX_STACK: u16 = 8;

/// Size of a fat header in bytes.
pub const FAT_HEADER_SIZE: usize = 12;

bitflags! {
    /// Flags of the method header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodHeaderFlags: u16 {
        /// Tiny header
        const TINY_FORMAT = 0x2;
        /// Fat header
        const FAT_FORMAT = 0x3;
        /// Data sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize locals
        const INIT_LOCALS = 0x10;
    }
}

/// A decoded method body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Whether locals are zero-initialized
    pub init_locals: bool,
    /// `StandAloneSig` row describing the locals
    pub local_var_sig: Option<TableIndex>,
    /// The IL code
    pub instructions: Vec<Instruction>,
    /// Protected regions
    pub exception_blocks: Vec<ExceptionBlock>,
}

impl MethodBody {
    /// A body with the default stack size of 8 and no locals.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        MethodBody {
            max_stack: TINY_MAX_STACK,
            init_locals: false,
            local_var_sig: None,
            instructions,
            exception_blocks: Vec::new(),
        }
    }

    /// Size of the IL code in bytes.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.instructions.iter().map(Instruction::size).sum()
    }

    /// Whether a body with `code_size` bytes of IL is written with a tiny header.
    #[must_use]
    pub fn fits_tiny_header(&self, code_size: usize) -> bool {
        code_size <= MAX_TINY_CODE_SIZE
            && self.exception_blocks.is_empty()
            && self.max_stack <= TINY_MAX_STACK
            && self.local_var_sig.is_none()
            && !self.init_locals
    }

    /// Encoded size of the body, header and exception sections included.
    #[must_use]
    pub fn size(&self) -> usize {
        let code_size = self.code_size();
        if self.fits_tiny_header(code_size) {
            return 1 + code_size;
        }

        let mut size = FAT_HEADER_SIZE + code_size;
        if !self.exception_blocks.is_empty() {
            size = size.next_multiple_of(4) + exception_sections_size(&self.exception_blocks);
        }
        size
    }

    /// Decode the body starting at the first byte of `data`. `data` may extend past the end
    /// of the body.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid header, opcode or exception clause,
    /// [`crate::Error::OutOfBounds`] if the body is truncated.
    pub fn decode(data: &[u8], user_strings: &UserStrings) -> Result<MethodBody> {
        let mut parser = Parser::new(data);
        let first = parser.read_le::<u8>()?;

        match MethodHeaderFlags::from_bits_retain(u16::from(first & 0x3)) {
            MethodHeaderFlags::TINY_FORMAT => {
                let code = parser.read_bytes(usize::from(first >> 2))?;
                Ok(MethodBody::new(decode_instructions(code, user_strings)?))
            }
            MethodHeaderFlags::FAT_FORMAT => {
                parser.seek(0)?;
                let header = parser.read_le::<u16>()?;
                let flags = MethodHeaderFlags::from_bits_retain(header & 0x0FFF);
                let header_size = usize::from(header >> 12) * 4;
                if header_size < FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Fat method header of {} bytes",
                        header_size
                    ));
                }

                let max_stack = parser.read_le::<u16>()?;
                let code_size = parser.read_le::<u32>()? as usize;
                let local_var_sig = TableIndex::from_token_of(
                    Token::new(parser.read_le::<u32>()?),
                    TableId::StandAloneSig,
                )?;

                parser.seek(header_size)?;
                let code = parser.read_bytes(code_size)?;
                let instructions = decode_instructions(code, user_strings)?;

                let exception_blocks = if flags.contains(MethodHeaderFlags::MORE_SECTS) {
                    read_exception_sections(&mut parser)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    max_stack,
                    init_locals: flags.contains(MethodHeaderFlags::INIT_LOCALS),
                    local_var_sig,
                    instructions,
                    exception_blocks,
                })
            }
            _ => Err(malformed_error!("Invalid method header 0x{:02X}", first)),
        }
    }

    /// Encode the body, registering `ldstr` literals in `user_strings`. Fat bodies must be
    /// placed on a 4-byte boundary.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for operands that do not match their opcode, a
    /// locals signature outside `StandAloneSig` or catch clauses that do not reference a type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, user_strings: &mut UserStringsBuilder) -> Result<Vec<u8>> {
        let code = encode_instructions(&self.instructions, user_strings)?;

        if self.fits_tiny_header(code.len()) {
            let mut out = Vec::with_capacity(1 + code.len());
            out.push(MethodHeaderFlags::TINY_FORMAT.bits() as u8 | (code.len() as u8) << 2);
            out.extend_from_slice(&code);
            return Ok(out);
        }

        let code_size = u32::try_from(code.len()).map_err(|_| {
            crate::Error::InvalidArgument(format!("method body of {} bytes", code.len()))
        })?;
        let local_var_sig = match &self.local_var_sig {
            Some(index) => {
                index.expect_table(TableId::StandAloneSig)?;
                index.token().value()
            }
            None => 0,
        };

        let mut flags = MethodHeaderFlags::FAT_FORMAT;
        if self.init_locals {
            flags |= MethodHeaderFlags::INIT_LOCALS;
        }
        if !self.exception_blocks.is_empty() {
            flags |= MethodHeaderFlags::MORE_SECTS;
        }

        let mut out = Vec::with_capacity(self.size());
        out.write_le(flags.bits() | ((FAT_HEADER_SIZE / 4) as u16) << 12);
        out.write_le(self.max_stack);
        out.write_le(code_size);
        out.write_le(local_var_sig);
        out.extend_from_slice(&code);

        if !self.exception_blocks.is_empty() {
            out.pad_to(4);
            write_exception_sections(&self.exception_blocks, &mut out)?;
        }
        Ok(out)
    }
}
