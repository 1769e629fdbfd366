//! Decoded CIL instructions.
//!
//! Operands keep their encoded meaning: branch targets are offsets relative to the end of
//! the instruction, tokens are [`TableIndex`] values, and `ldstr` operands are the string
//! itself, re-registered in `#US` when the body is written.

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::{
        method::{OpCode, OperandKind, TWO_BYTE_PREFIX},
        streams::{UserStrings, UserStringsBuilder},
        tables::TableIndex,
        token::{Token, USER_STRING_TABLE},
    },
    Error, Result,
};

/// Inline operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// `ShortInlineI`
    Int8(i8),
    /// `ShortInlineVar`
    Var8(u8),
    /// `InlineVar`
    Var16(u16),
    /// `InlineI`
    Int32(i32),
    /// `InlineI8`
    Int64(i64),
    /// `ShortInlineR`
    Float32(f32),
    /// `InlineR`
    Float64(f64),
    /// Branch offset relative to the next instruction, short or long form
    Branch(i32),
    /// `ldstr` literal
    String(String),
    /// Metadata token operand
    Token(TableIndex),
    /// `switch` offsets relative to the next instruction
    Switch(Vec<i32>),
}

/// One instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// Its operand, matching the opcode's operand kind
    pub operand: Operand,
}

impl Instruction {
    /// An instruction without operand.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// An instruction with an operand.
    #[must_use]
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        let operand = match (&self.opcode.operand, &self.operand) {
            (OperandKind::InlineSwitch, Operand::Switch(targets)) => 4 + 4 * targets.len(),
            (kind, _) => kind.size().unwrap_or(4),
        };
        self.opcode.size() + operand
    }

    /// Decode one instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for undefined opcodes and unresolvable tokens,
    /// [`crate::Error::OutOfBounds`] on truncated code.
    pub fn decode(parser: &mut Parser, user_strings: &UserStrings) -> Result<Instruction> {
        let first = parser.read_le::<u8>()?;
        let code = if first == TWO_BYTE_PREFIX {
            0xFE00 | u16::from(parser.read_le::<u8>()?)
        } else {
            u16::from(first)
        };
        let opcode = OpCode::from_code(code)
            .ok_or_else(|| malformed_error!("Invalid opcode 0x{:02X}", code))?;

        let operand = match opcode.operand {
            OperandKind::None => Operand::None,
            OperandKind::ShortInlineI => Operand::Int8(parser.read_le::<i8>()?),
            OperandKind::ShortInlineVar => Operand::Var8(parser.read_le::<u8>()?),
            OperandKind::ShortInlineBrTarget => {
                Operand::Branch(i32::from(parser.read_le::<i8>()?))
            }
            OperandKind::InlineVar => Operand::Var16(parser.read_le::<u16>()?),
            OperandKind::InlineI => Operand::Int32(parser.read_le::<i32>()?),
            OperandKind::InlineBrTarget => Operand::Branch(parser.read_le::<i32>()?),
            OperandKind::InlineI8 => Operand::Int64(parser.read_le::<i64>()?),
            OperandKind::ShortInlineR => Operand::Float32(parser.read_le::<f32>()?),
            OperandKind::InlineR => Operand::Float64(parser.read_le::<f64>()?),
            OperandKind::InlineString => {
                let token = Token::new(parser.read_le::<u32>()?);
                if !token.is_user_string() {
                    return Err(malformed_error!("ldstr operand {} is not a string token", token));
                }
                Operand::String(user_strings.get(token.row() as usize)?)
            }
            OperandKind::InlineField
            | OperandKind::InlineMethod
            | OperandKind::InlineType
            | OperandKind::InlineTok
            | OperandKind::InlineSig => {
                Operand::Token(TableIndex::from_token(Token::new(parser.read_le::<u32>()?))?)
            }
            OperandKind::InlineSwitch => {
                let count = parser.read_le::<u32>()? as usize;
                if count > parser.remaining() / 4 {
                    return Err(malformed_error!(
                        "switch with {} targets exceeds the method body",
                        count
                    ));
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(parser.read_le::<i32>()?);
                }
                Operand::Switch(targets)
            }
        };

        Ok(Instruction { opcode, operand })
    }

    /// Append the encoded instruction, registering `ldstr` literals in `user_strings`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the operand does not fit the opcode.
    pub fn encode(&self, user_strings: &mut UserStringsBuilder, out: &mut Vec<u8>) -> Result<()> {
        self.opcode.write(out);
        match (self.opcode.operand, &self.operand) {
            (OperandKind::None, Operand::None) => {}
            (OperandKind::ShortInlineI, Operand::Int8(value)) => out.write_le(*value),
            (OperandKind::ShortInlineVar, Operand::Var8(value)) => out.push(*value),
            (OperandKind::ShortInlineBrTarget, Operand::Branch(offset)) => {
                let offset = i8::try_from(*offset).map_err(|_| {
                    Error::InvalidArgument(format!(
                        "branch offset {} does not fit {}",
                        offset, self.opcode.name
                    ))
                })?;
                out.write_le(offset);
            }
            (OperandKind::InlineVar, Operand::Var16(value)) => out.write_le(*value),
            (OperandKind::InlineI, Operand::Int32(value))
            | (OperandKind::InlineBrTarget, Operand::Branch(value)) => out.write_le(*value),
            (OperandKind::InlineI8, Operand::Int64(value)) => out.write_le(*value),
            (OperandKind::ShortInlineR, Operand::Float32(value)) => out.write_le(*value),
            (OperandKind::InlineR, Operand::Float64(value)) => out.write_le(*value),
            (OperandKind::InlineString, Operand::String(value)) => {
                out.write_le(u32::from(USER_STRING_TABLE) << 24 | user_strings.add(value)?);
            }
            (kind, Operand::Token(index)) if kind.is_token() => {
                out.write_le(index.token().value());
            }
            (OperandKind::InlineSwitch, Operand::Switch(targets)) => {
                let count = u32::try_from(targets.len()).map_err(|_| {
                    Error::InvalidArgument("switch has too many targets".to_string())
                })?;
                out.write_le(count);
                for target in targets {
                    out.write_le(*target);
                }
            }
            (kind, operand) => {
                return Err(Error::InvalidArgument(format!(
                    "operand {:?} does not match {} ({:?})",
                    operand, self.opcode.name, kind
                )))
            }
        }
        Ok(())
    }
}

/// Decode a complete instruction stream.
///
/// # Errors
/// See [`Instruction::decode`].
pub fn decode_instructions(code: &[u8], user_strings: &UserStrings) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(Instruction::decode(&mut parser, user_strings)?);
    }
    Ok(instructions)
}

/// Encode an instruction stream.
///
/// # Errors
/// See [`Instruction::encode`].
pub fn encode_instructions(
    instructions: &[Instruction],
    user_strings: &mut UserStringsBuilder,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(instructions.iter().map(Instruction::size).sum());
    for instruction in instructions {
        instruction.encode(user_strings, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::TableId;

    #[test]
    fn encode_and_decode() {
        let instructions = vec![
            Instruction::with_operand(OpCode::LDSTR, Operand::String("Hi".to_string())),
            Instruction::with_operand(
                OpCode::CALL,
                Operand::Token(TableIndex::new(TableId::MemberRef, 0)),
            ),
            Instruction::with_operand(OpCode::BR_S, Operand::Branch(-2)),
            Instruction::with_operand(OpCode::LDLOC, Operand::Var16(300)),
            Instruction::new(OpCode::CEQ),
            Instruction::new(OpCode::RET),
        ];

        let mut user_strings = UserStringsBuilder::new();
        let code = encode_instructions(&instructions, &mut user_strings).unwrap();

        #[rustfmt::skip]
        let expected = [
            0x72, 0x01, 0x00, 0x00, 0x70,
            0x28, 0x01, 0x00, 0x00, 0x0A,
            0x2B, 0xFE,
            0xFE, 0x0C, 0x2C, 0x01,
            0xFE, 0x01,
            0x2A,
        ];
        assert_eq!(code, expected);
        assert_eq!(instructions.iter().map(Instruction::size).sum::<usize>(), code.len());

        let heap = user_strings.finish();
        let decoded = decode_instructions(&code, &UserStrings::from(&heap).unwrap()).unwrap();
        assert_eq!(decoded, instructions);
    }

    #[test]
    fn switch() {
        let switch = Instruction::with_operand(OpCode::SWITCH, Operand::Switch(vec![0, 5, -3]));
        let mut out = Vec::new();
        switch.encode(&mut UserStringsBuilder::new(), &mut out).unwrap();
        assert_eq!(out.len(), switch.size());
        assert_eq!(&out[..5], &[0x45, 0x03, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn rejects_mismatched_operands() {
        let mut out = Vec::new();
        let short = Instruction::with_operand(OpCode::BR_S, Operand::Branch(200));
        assert!(short.encode(&mut UserStringsBuilder::new(), &mut out).is_err());

        let wrong = Instruction::with_operand(OpCode::CALL, Operand::Int32(1));
        assert!(wrong.encode(&mut UserStringsBuilder::new(), &mut out).is_err());
    }

    #[test]
    fn invalid_opcodes() {
        let heap = [0u8];
        let user_strings = UserStrings::from(&heap).unwrap();
        assert!(decode_instructions(&[0x24], &user_strings).is_err());
        assert!(decode_instructions(&[0xFE, 0x08], &user_strings).is_err());
        assert!(decode_instructions(&[0x20, 0x01], &user_strings).is_err());
        assert!(decode_instructions(&[0x45, 0xFF, 0xFF, 0x00, 0x00], &user_strings).is_err());
    }
}
