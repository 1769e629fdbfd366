//! Exception handling sections of method bodies (ECMA-335 II.25.4.5, II.25.4.6).
//!
//! Sections follow the IL code on a 4-byte boundary. A small section stores up to 20
//! clauses of 12 bytes, a fat section up to 699 050 clauses of 24 bytes. Sections are
//! chained with [`SectionFlags::MORE_SECTS`].
//!
//! Writing keeps the small layout, chaining sections of 20 clauses, as long as every clause
//! fits its offsets in 16 bits and its lengths in 8 bits. Otherwise every clause is written
//! in fat sections.

use bitflags::bitflags;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::tables::{TableId, TableIndex},
    metadata::token::Token,
    Error, Result,
};

/// Clauses that fit one small section: `(255 - 4) / 12`.
pub const MAX_SMALL_CLAUSES_PER_SECTION: usize = 20;

/// Clauses that fit one fat section: `(0xFF_FFFF - 4) / 24`.
pub const MAX_FAT_CLAUSES_PER_SECTION: usize = 699_050;

const SMALL_CLAUSE_SIZE: usize = 12;
const FAT_CLAUSE_SIZE: usize = 24;
const SECTION_HEADER_SIZE: usize = 4;

bitflags! {
    /// Flags of a method data section header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Exception handling data
        const EHTABLE = 0x01;
        /// Reserved, must be clear
        const OPT_ILTABLE = 0x02;
        /// Fat layout with a 24-bit size
        const FAT_FORMAT = 0x40;
        /// Another section follows
        const MORE_SECTS = 0x80;
    }
}

bitflags! {
    /// Kind of an exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionClauseFlags: u32 {
        /// Typed catch clause
        const EXCEPTION = 0x0000;
        /// Filter followed by a handler
        const FILTER = 0x0001;
        /// `finally` clause
        const FINALLY = 0x0002;
        /// `fault` clause
        const FAULT = 0x0004;
    }
}

/// What a protected region is handled by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionBlockKind {
    /// Catch of a `TypeDef`, `TypeRef` or `TypeSpec`
    Catch(TableIndex),
    /// Filter block starting at `filter_offset`
    Filter {
        /// IL offset of the filter code
        filter_offset: u32,
    },
    /// `finally`
    Finally,
    /// `fault`
    Fault,
}

impl ExceptionBlockKind {
    /// The clause flags of this kind.
    #[must_use]
    pub fn flags(&self) -> ExceptionClauseFlags {
        match self {
            ExceptionBlockKind::Catch(_) => ExceptionClauseFlags::EXCEPTION,
            ExceptionBlockKind::Filter { .. } => ExceptionClauseFlags::FILTER,
            ExceptionBlockKind::Finally => ExceptionClauseFlags::FINALLY,
            ExceptionBlockKind::Fault => ExceptionClauseFlags::FAULT,
        }
    }

    /// Value of the class token / filter offset field.
    fn extra(&self) -> u32 {
        match self {
            ExceptionBlockKind::Catch(class) => class.token().value(),
            ExceptionBlockKind::Filter { filter_offset } => *filter_offset,
            ExceptionBlockKind::Finally | ExceptionBlockKind::Fault => 0,
        }
    }

    fn decode(flags: u32, extra: u32) -> Result<Self> {
        match ExceptionClauseFlags::from_bits_retain(flags) {
            ExceptionClauseFlags::EXCEPTION => {
                let class = TableIndex::from_token(Token::new(extra))?;
                if !matches!(
                    class.table,
                    TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec
                ) {
                    return Err(malformed_error!(
                        "Catch clause references {:?} instead of a type",
                        class.table
                    ));
                }
                Ok(ExceptionBlockKind::Catch(class))
            }
            ExceptionClauseFlags::FILTER => Ok(ExceptionBlockKind::Filter {
                filter_offset: extra,
            }),
            ExceptionClauseFlags::FINALLY => Ok(ExceptionBlockKind::Finally),
            ExceptionClauseFlags::FAULT => Ok(ExceptionBlockKind::Fault),
            _ => Err(malformed_error!("Invalid exception clause flags 0x{:X}", flags)),
        }
    }
}

/// A protected region and its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionBlock {
    /// Handler kind
    pub kind: ExceptionBlockKind,
    /// IL offset of the protected region
    pub try_offset: u32,
    /// Length of the protected region
    pub try_length: u32,
    /// IL offset of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
}

impl ExceptionBlock {
    /// Whether the clause fits the small layout.
    #[must_use]
    pub fn is_small_eligible(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_small(&self, out: &mut Vec<u8>) {
        out.write_le(self.kind.flags().bits() as u16);
        out.write_le(self.try_offset as u16);
        out.push(self.try_length as u8);
        out.write_le(self.handler_offset as u16);
        out.push(self.handler_length as u8);
        out.write_le(self.kind.extra());
    }

    fn write_fat(&self, out: &mut Vec<u8>) {
        out.write_le(self.kind.flags().bits());
        out.write_le(self.try_offset);
        out.write_le(self.try_length);
        out.write_le(self.handler_offset);
        out.write_le(self.handler_length);
        out.write_le(self.kind.extra());
    }

    fn read_small(parser: &mut Parser) -> Result<Self> {
        let flags = u32::from(parser.read_le::<u16>()?);
        let try_offset = u32::from(parser.read_le::<u16>()?);
        let try_length = u32::from(parser.read_le::<u8>()?);
        let handler_offset = u32::from(parser.read_le::<u16>()?);
        let handler_length = u32::from(parser.read_le::<u8>()?);
        let extra = parser.read_le::<u32>()?;
        Ok(ExceptionBlock {
            kind: ExceptionBlockKind::decode(flags, extra)?,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
        })
    }

    fn read_fat(parser: &mut Parser) -> Result<Self> {
        let flags = parser.read_le::<u32>()?;
        let try_offset = parser.read_le::<u32>()?;
        let try_length = parser.read_le::<u32>()?;
        let handler_offset = parser.read_le::<u32>()?;
        let handler_length = parser.read_le::<u32>()?;
        let extra = parser.read_le::<u32>()?;
        Ok(ExceptionBlock {
            kind: ExceptionBlockKind::decode(flags, extra)?,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
        })
    }
}

/// Size of the sections [`write_exception_sections`] produces for `blocks`.
#[must_use]
pub fn exception_sections_size(blocks: &[ExceptionBlock]) -> usize {
    if blocks.is_empty() {
        return 0;
    }

    let (per_section, clause_size) = if blocks.iter().all(ExceptionBlock::is_small_eligible) {
        (MAX_SMALL_CLAUSES_PER_SECTION, SMALL_CLAUSE_SIZE)
    } else {
        (MAX_FAT_CLAUSES_PER_SECTION, FAT_CLAUSE_SIZE)
    };
    // both clause sizes keep every section a multiple of 4 bytes
    blocks.len().div_ceil(per_section) * SECTION_HEADER_SIZE + blocks.len() * clause_size
}

/// Append the exception sections for `blocks`; `out` must be 4-byte aligned.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] for catch clauses that do not reference a type.
#[allow(clippy::cast_possible_truncation)]
pub fn write_exception_sections(blocks: &[ExceptionBlock], out: &mut Vec<u8>) -> Result<()> {
    for block in blocks {
        if let ExceptionBlockKind::Catch(class) = &block.kind {
            if !matches!(
                class.table,
                TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec
            ) {
                return Err(Error::InvalidArgument(format!(
                    "catch clause references {:?} instead of a type",
                    class.table
                )));
            }
        }
    }

    let small = blocks.iter().all(ExceptionBlock::is_small_eligible);
    let per_section = if small {
        MAX_SMALL_CLAUSES_PER_SECTION
    } else {
        MAX_FAT_CLAUSES_PER_SECTION
    };

    let chunks: Vec<&[ExceptionBlock]> = blocks.chunks(per_section).collect();
    for (position, chunk) in chunks.iter().enumerate() {
        let mut flags = SectionFlags::EHTABLE;
        if position + 1 < chunks.len() {
            flags |= SectionFlags::MORE_SECTS;
        }

        if small {
            let size = SECTION_HEADER_SIZE + chunk.len() * SMALL_CLAUSE_SIZE;
            out.push(flags.bits());
            out.push(size as u8);
            out.write_le(0_u16);
            for block in *chunk {
                block.write_small(out);
            }
        } else {
            flags |= SectionFlags::FAT_FORMAT;
            let size = SECTION_HEADER_SIZE + chunk.len() * FAT_CLAUSE_SIZE;
            let header = u32::from(flags.bits()) | ((size as u32) << 8);
            out.write_le(header);
            for block in *chunk {
                block.write_fat(out);
            }
        }
        out.pad_to(4);
    }
    Ok(())
}

/// Read the exception sections starting at the parser position, which must be the 4-byte
/// aligned end of the IL code. Sections other than exception tables are skipped.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] on damaged sections.
pub fn read_exception_sections(parser: &mut Parser) -> Result<Vec<ExceptionBlock>> {
    let mut blocks = Vec::new();
    loop {
        parser.align(4)?;
        let flags = SectionFlags::from_bits_retain(parser.read_le::<u8>()?);
        let (size, clause_size) = if flags.contains(SectionFlags::FAT_FORMAT) {
            let low = u32::from(parser.read_le::<u16>()?);
            let high = u32::from(parser.read_le::<u8>()?);
            ((low | high << 16) as usize, FAT_CLAUSE_SIZE)
        } else {
            let size = parser.read_le::<u8>()? as usize;
            parser.advance_by(2)?;
            (size, SMALL_CLAUSE_SIZE)
        };
        if size < SECTION_HEADER_SIZE {
            return Err(malformed_error!("Method data section of {} bytes", size));
        }

        let body = size - SECTION_HEADER_SIZE;
        if flags.contains(SectionFlags::EHTABLE) {
            for _ in 0..body / clause_size {
                if clause_size == FAT_CLAUSE_SIZE {
                    blocks.push(ExceptionBlock::read_fat(parser)?);
                } else {
                    blocks.push(ExceptionBlock::read_small(parser)?);
                }
            }
            parser.advance_by(body % clause_size)?;
        } else {
            parser.advance_by(body)?;
        }

        if !flags.contains(SectionFlags::MORE_SECTS) {
            return Ok(blocks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finally(index: u32) -> ExceptionBlock {
        ExceptionBlock {
            kind: ExceptionBlockKind::Finally,
            try_offset: index * 4,
            try_length: 2,
            handler_offset: index * 4 + 2,
            handler_length: 2,
        }
    }

    #[test]
    fn small_section() {
        let blocks = [ExceptionBlock {
            kind: ExceptionBlockKind::Catch(TableIndex::new(TableId::TypeRef, 4)),
            try_offset: 0x01,
            try_length: 0x0F,
            handler_offset: 0x10,
            handler_length: 0x0D,
        }];

        let mut out = Vec::new();
        write_exception_sections(&blocks, &mut out).unwrap();

        #[rustfmt::skip]
        let expected = [
            0x01, 0x10, 0x00, 0x00,
            0x00, 0x00, 0x01, 0x00, 0x0F, 0x10, 0x00, 0x0D, 0x05, 0x00, 0x00, 0x01,
        ];
        assert_eq!(out, expected);
        assert_eq!(exception_sections_size(&blocks), out.len());

        let mut parser = Parser::new(&out);
        assert_eq!(read_exception_sections(&mut parser).unwrap(), blocks);
    }

    #[test]
    fn fat_section() {
        let blocks = [ExceptionBlock {
            kind: ExceptionBlockKind::Filter { filter_offset: 0x20 },
            try_offset: 0,
            try_length: 0x100,
            handler_offset: 0x120,
            handler_length: 4,
        }];

        let mut out = Vec::new();
        write_exception_sections(&blocks, &mut out).unwrap();
        assert_eq!(&out[..4], &[0x41, 0x1C, 0x00, 0x00]);
        assert_eq!(out.len(), 28);
        assert_eq!(exception_sections_size(&blocks), 28);

        let mut parser = Parser::new(&out);
        assert_eq!(read_exception_sections(&mut parser).unwrap(), blocks);
    }

    #[test]
    fn twenty_clauses_fit_one_small_section() {
        let blocks: Vec<_> = (0..20).map(finally).collect();
        let mut out = Vec::new();
        write_exception_sections(&blocks, &mut out).unwrap();
        assert_eq!(out[0], SectionFlags::EHTABLE.bits());
        assert_eq!(out[1], 4 + 20 * 12);
        assert_eq!(out.len(), 244);
    }

    #[test]
    fn twenty_one_clauses_chain_small_sections() {
        let blocks: Vec<_> = (0..21).map(finally).collect();
        let mut out = Vec::new();
        write_exception_sections(&blocks, &mut out).unwrap();

        assert_eq!(out[0], (SectionFlags::EHTABLE | SectionFlags::MORE_SECTS).bits());
        assert_eq!(out[1], 244);
        assert_eq!(out[244], SectionFlags::EHTABLE.bits());
        assert_eq!(out[245], 16);
        assert_eq!(out.len(), 260);
        assert_eq!(exception_sections_size(&blocks), 260);

        let mut parser = Parser::new(&out);
        assert_eq!(read_exception_sections(&mut parser).unwrap(), blocks);
    }

    #[test]
    fn one_large_clause_makes_all_fat() {
        let mut blocks: Vec<_> = (0..21).map(finally).collect();
        blocks[3].try_length = 0x1000;

        let mut out = Vec::new();
        write_exception_sections(&blocks, &mut out).unwrap();
        assert_eq!(out[0], (SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
        assert_eq!(out.len(), 4 + 21 * 24);
        assert_eq!(exception_sections_size(&blocks), out.len());

        let mut parser = Parser::new(&out);
        assert_eq!(read_exception_sections(&mut parser).unwrap(), blocks);
    }

    #[test]
    fn invalid_clauses() {
        let catch_field = [ExceptionBlock {
            kind: ExceptionBlockKind::Catch(TableIndex::new(TableId::Field, 0)),
            try_offset: 0,
            try_length: 1,
            handler_offset: 1,
            handler_length: 1,
        }];
        assert!(write_exception_sections(&catch_field, &mut Vec::new()).is_err());

        #[rustfmt::skip]
        let bad_flags = [
            0x01, 0x10, 0x00, 0x00,
            0x08, 0x00, 0x01, 0x00, 0x0F, 0x10, 0x00, 0x0D, 0x00, 0x00, 0x00, 0x00,
        ];
        assert!(read_exception_sections(&mut Parser::new(&bad_flags)).is_err());
        assert!(read_exception_sections(&mut Parser::new(&[0x01, 0x02, 0x00, 0x00])).is_err());
    }
}
