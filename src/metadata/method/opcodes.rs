//! CIL opcodes (ECMA-335 Partition III).
//!
//! Single-byte opcodes are stored as their byte value, two-byte opcodes as `0xFE00 | second`.
//! Each opcode carries the kind of its inline operand.

/// Shape of the inline operand following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand
    None,
    /// 1-byte immediate (`ldc.i4.s`, `unaligned.`, `no.`)
    ShortInlineI,
    /// 1-byte argument or local index
    ShortInlineVar,
    /// 1-byte signed branch offset
    ShortInlineBrTarget,
    /// 2-byte argument or local index
    InlineVar,
    /// 4-byte immediate
    InlineI,
    /// 4-byte signed branch offset
    InlineBrTarget,
    /// 8-byte immediate
    InlineI8,
    /// 4-byte float
    ShortInlineR,
    /// 8-byte float
    InlineR,
    /// `#US` token
    InlineString,
    /// `Field` or `MemberRef` token
    InlineField,
    /// `MethodDef`, `MemberRef` or `MethodSpec` token
    InlineMethod,
    /// `TypeDef`, `TypeRef` or `TypeSpec` token
    InlineType,
    /// Any type, field or method token (`ldtoken`)
    InlineTok,
    /// `StandAloneSig` token (`calli`)
    InlineSig,
    /// Target count followed by 4-byte branch offsets
    InlineSwitch,
}

impl OperandKind {
    /// Encoded operand size, `None` for `switch`.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::ShortInlineI
            | OperandKind::ShortInlineVar
            | OperandKind::ShortInlineBrTarget => Some(1),
            OperandKind::InlineVar => Some(2),
            OperandKind::InlineI8 | OperandKind::InlineR => Some(8),
            OperandKind::InlineSwitch => None,
            _ => Some(4),
        }
    }

    /// Whether the operand is a metadata token.
    #[must_use]
    pub fn is_token(&self) -> bool {
        matches!(
            self,
            OperandKind::InlineField
                | OperandKind::InlineMethod
                | OperandKind::InlineType
                | OperandKind::InlineTok
                | OperandKind::InlineSig
        )
    }
}

/// A CIL opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode {
    /// Opcode value, `0xFExx` for two-byte opcodes
    pub code: u16,
    /// Mnemonic
    pub name: &'static str,
    /// Inline operand kind
    pub operand: OperandKind,
}

/// Lead byte of two-byte opcodes.
pub const TWO_BYTE_PREFIX: u8 = 0xFE;

impl OpCode {
    /// Encoded size of the opcode itself.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.code > 0xFF {
            2
        } else {
            1
        }
    }

    /// Append the opcode bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, out: &mut Vec<u8>) {
        if self.code > 0xFF {
            out.push(TWO_BYTE_PREFIX);
        }
        out.push(self.code as u8);
    }
}

macro_rules! opcodes {
    ($($name:ident = $code:literal, $mnemonic:literal, $operand:ident;)*) => {
        impl OpCode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                pub const $name: OpCode = OpCode {
                    code: $code,
                    name: $mnemonic,
                    operand: OperandKind::$operand,
                };
            )*

            /// Every defined opcode in code order.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name),*];

            /// Look up an opcode by value.
            #[must_use]
            pub fn from_code(code: u16) -> Option<OpCode> {
                match code {
                    $($code => Some(OpCode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    NOP = 0x00, "nop", None;
    BREAK = 0x01, "break", None;
    LDARG_0 = 0x02, "ldarg.0", None;
    LDARG_1 = 0x03, "ldarg.1", None;
    LDARG_2 = 0x04, "ldarg.2", None;
    LDARG_3 = 0x05, "ldarg.3", None;
    LDLOC_0 = 0x06, "ldloc.0", None;
    LDLOC_1 = 0x07, "ldloc.1", None;
    LDLOC_2 = 0x08, "ldloc.2", None;
    LDLOC_3 = 0x09, "ldloc.3", None;
    STLOC_0 = 0x0A, "stloc.0", None;
    STLOC_1 = 0x0B, "stloc.1", None;
    STLOC_2 = 0x0C, "stloc.2", None;
    STLOC_3 = 0x0D, "stloc.3", None;
    LDARG_S = 0x0E, "ldarg.s", ShortInlineVar;
    LDARGA_S = 0x0F, "ldarga.s", ShortInlineVar;
    STARG_S = 0x10, "starg.s", ShortInlineVar;
    LDLOC_S = 0x11, "ldloc.s", ShortInlineVar;
    LDLOCA_S = 0x12, "ldloca.s", ShortInlineVar;
    STLOC_S = 0x13, "stloc.s", ShortInlineVar;
    LDNULL = 0x14, "ldnull", None;
    LDC_I4_M1 = 0x15, "ldc.i4.m1", None;
    LDC_I4_0 = 0x16, "ldc.i4.0", None;
    LDC_I4_1 = 0x17, "ldc.i4.1", None;
    LDC_I4_2 = 0x18, "ldc.i4.2", None;
    LDC_I4_3 = 0x19, "ldc.i4.3", None;
    LDC_I4_4 = 0x1A, "ldc.i4.4", None;
    LDC_I4_5 = 0x1B, "ldc.i4.5", None;
    LDC_I4_6 = 0x1C, "ldc.i4.6", None;
    LDC_I4_7 = 0x1D, "ldc.i4.7", None;
    LDC_I4_8 = 0x1E, "ldc.i4.8", None;
    LDC_I4_S = 0x1F, "ldc.i4.s", ShortInlineI;
    LDC_I4 = 0x20, "ldc.i4", InlineI;
    LDC_I8 = 0x21, "ldc.i8", InlineI8;
    LDC_R4 = 0x22, "ldc.r4", ShortInlineR;
    LDC_R8 = 0x23, "ldc.r8", InlineR;
    DUP = 0x25, "dup", None;
    POP = 0x26, "pop", None;
    JMP = 0x27, "jmp", InlineMethod;
    CALL = 0x28, "call", InlineMethod;
    CALLI = 0x29, "calli", InlineSig;
    RET = 0x2A, "ret", None;
    BR_S = 0x2B, "br.s", ShortInlineBrTarget;
    BRFALSE_S = 0x2C, "brfalse.s", ShortInlineBrTarget;
    BRTRUE_S = 0x2D, "brtrue.s", ShortInlineBrTarget;
    BEQ_S = 0x2E, "beq.s", ShortInlineBrTarget;
    BGE_S = 0x2F, "bge.s", ShortInlineBrTarget;
    BGT_S = 0x30, "bgt.s", ShortInlineBrTarget;
    BLE_S = 0x31, "ble.s", ShortInlineBrTarget;
    BLT_S = 0x32, "blt.s", ShortInlineBrTarget;
    BNE_UN_S = 0x33, "bne.un.s", ShortInlineBrTarget;
    BGE_UN_S = 0x34, "bge.un.s", ShortInlineBrTarget;
    BGT_UN_S = 0x35, "bgt.un.s", ShortInlineBrTarget;
    BLE_UN_S = 0x36, "ble.un.s", ShortInlineBrTarget;
    BLT_UN_S = 0x37, "blt.un.s", ShortInlineBrTarget;
    BR = 0x38, "br", InlineBrTarget;
    BRFALSE = 0x39, "brfalse", InlineBrTarget;
    BRTRUE = 0x3A, "brtrue", InlineBrTarget;
    BEQ = 0x3B, "beq", InlineBrTarget;
    BGE = 0x3C, "bge", InlineBrTarget;
    BGT = 0x3D, "bgt", InlineBrTarget;
    BLE = 0x3E, "ble", InlineBrTarget;
    BLT = 0x3F, "blt", InlineBrTarget;
    BNE_UN = 0x40, "bne.un", InlineBrTarget;
    BGE_UN = 0x41, "bge.un", InlineBrTarget;
    BGT_UN = 0x42, "bgt.un", InlineBrTarget;
    BLE_UN = 0x43, "ble.un", InlineBrTarget;
    BLT_UN = 0x44, "blt.un", InlineBrTarget;
    SWITCH = 0x45, "switch", InlineSwitch;
    LDIND_I1 = 0x46, "ldind.i1", None;
    LDIND_U1 = 0x47, "ldind.u1", None;
    LDIND_I2 = 0x48, "ldind.i2", None;
    LDIND_U2 = 0x49, "ldind.u2", None;
    LDIND_I4 = 0x4A, "ldind.i4", None;
    LDIND_U4 = 0x4B, "ldind.u4", None;
    LDIND_I8 = 0x4C, "ldind.i8", None;
    LDIND_I = 0x4D, "ldind.i", None;
    LDIND_R4 = 0x4E, "ldind.r4", None;
    LDIND_R8 = 0x4F, "ldind.r8", None;
    LDIND_REF = 0x50, "ldind.ref", None;
    STIND_REF = 0x51, "stind.ref", None;
    STIND_I1 = 0x52, "stind.i1", None;
    STIND_I2 = 0x53, "stind.i2", None;
    STIND_I4 = 0x54, "stind.i4", None;
    STIND_I8 = 0x55, "stind.i8", None;
    STIND_R4 = 0x56, "stind.r4", None;
    STIND_R8 = 0x57, "stind.r8", None;
    ADD = 0x58, "add", None;
    SUB = 0x59, "sub", None;
    MUL = 0x5A, "mul", None;
    DIV = 0x5B, "div", None;
    DIV_UN = 0x5C, "div.un", None;
    REM = 0x5D, "rem", None;
    REM_UN = 0x5E, "rem.un", None;
    AND = 0x5F, "and", None;
    OR = 0x60, "or", None;
    XOR = 0x61, "xor", None;
    SHL = 0x62, "shl", None;
    SHR = 0x63, "shr", None;
    SHR_UN = 0x64, "shr.un", None;
    NEG = 0x65, "neg", None;
    NOT = 0x66, "not", None;
    CONV_I1 = 0x67, "conv.i1", None;
    CONV_I2 = 0x68, "conv.i2", None;
    CONV_I4 = 0x69, "conv.i4", None;
    CONV_I8 = 0x6A, "conv.i8", None;
    CONV_R4 = 0x6B, "conv.r4", None;
    CONV_R8 = 0x6C, "conv.r8", None;
    CONV_U4 = 0x6D, "conv.u4", None;
    CONV_U8 = 0x6E, "conv.u8", None;
    CALLVIRT = 0x6F, "callvirt", InlineMethod;
    CPOBJ = 0x70, "cpobj", InlineType;
    LDOBJ = 0x71, "ldobj", InlineType;
    LDSTR = 0x72, "ldstr", InlineString;
    NEWOBJ = 0x73, "newobj", InlineMethod;
    CASTCLASS = 0x74, "castclass", InlineType;
    ISINST = 0x75, "isinst", InlineType;
    CONV_R_UN = 0x76, "conv.r.un", None;
    UNBOX = 0x79, "unbox", InlineType;
    THROW = 0x7A, "throw", None;
    LDFLD = 0x7B, "ldfld", InlineField;
    LDFLDA = 0x7C, "ldflda", InlineField;
    STFLD = 0x7D, "stfld", InlineField;
    LDSFLD = 0x7E, "ldsfld", InlineField;
    LDSFLDA = 0x7F, "ldsflda", InlineField;
    STSFLD = 0x80, "stsfld", InlineField;
    STOBJ = 0x81, "stobj", InlineType;
    CONV_OVF_I1_UN = 0x82, "conv.ovf.i1.un", None;
    CONV_OVF_I2_UN = 0x83, "conv.ovf.i2.un", None;
    CONV_OVF_I4_UN = 0x84, "conv.ovf.i4.un", None;
    CONV_OVF_I8_UN = 0x85, "conv.ovf.i8.un", None;
    CONV_OVF_U1_UN = 0x86, "conv.ovf.u1.un", None;
    CONV_OVF_U2_UN = 0x87, "conv.ovf.u2.un", None;
    CONV_OVF_U4_UN = 0x88, "conv.ovf.u4.un", None;
    CONV_OVF_U8_UN = 0x89, "conv.ovf.u8.un", None;
    CONV_OVF_I_UN = 0x8A, "conv.ovf.i.un", None;
    CONV_OVF_U_UN = 0x8B, "conv.ovf.u.un", None;
    BOX = 0x8C, "box", InlineType;
    NEWARR = 0x8D, "newarr", InlineType;
    LDLEN = 0x8E, "ldlen", None;
    LDELEMA = 0x8F, "ldelema", InlineType;
    LDELEM_I1 = 0x90, "ldelem.i1", None;
    LDELEM_U1 = 0x91, "ldelem.u1", None;
    LDELEM_I2 = 0x92, "ldelem.i2", None;
    LDELEM_U2 = 0x93, "ldelem.u2", None;
    LDELEM_I4 = 0x94, "ldelem.i4", None;
    LDELEM_U4 = 0x95, "ldelem.u4", None;
    LDELEM_I8 = 0x96, "ldelem.i8", None;
    LDELEM_I = 0x97, "ldelem.i", None;
    LDELEM_R4 = 0x98, "ldelem.r4", None;
    LDELEM_R8 = 0x99, "ldelem.r8", None;
    LDELEM_REF = 0x9A, "ldelem.ref", None;
    STELEM_I = 0x9B, "stelem.i", None;
    STELEM_I1 = 0x9C, "stelem.i1", None;
    STELEM_I2 = 0x9D, "stelem.i2", None;
    STELEM_I4 = 0x9E, "stelem.i4", None;
    STELEM_I8 = 0x9F, "stelem.i8", None;
    STELEM_R4 = 0xA0, "stelem.r4", None;
    STELEM_R8 = 0xA1, "stelem.r8", None;
    STELEM_REF = 0xA2, "stelem.ref", None;
    LDELEM = 0xA3, "ldelem", InlineType;
    STELEM = 0xA4, "stelem", InlineType;
    UNBOX_ANY = 0xA5, "unbox.any", InlineType;
    CONV_OVF_I1 = 0xB3, "conv.ovf.i1", None;
    CONV_OVF_U1 = 0xB4, "conv.ovf.u1", None;
    CONV_OVF_I2 = 0xB5, "conv.ovf.i2", None;
    CONV_OVF_U2 = 0xB6, "conv.ovf.u2", None;
    CONV_OVF_I4 = 0xB7, "conv.ovf.i4", None;
    CONV_OVF_U4 = 0xB8, "conv.ovf.u4", None;
    CONV_OVF_I8 = 0xB9, "conv.ovf.i8", None;
    CONV_OVF_U8 = 0xBA, "conv.ovf.u8", None;
    REFANYVAL = 0xC2, "refanyval", InlineType;
    CKFINITE = 0xC3, "ckfinite", None;
    MKREFANY = 0xC6, "mkrefany", InlineType;
    LDTOKEN = 0xD0, "ldtoken", InlineTok;
    CONV_U2 = 0xD1, "conv.u2", None;
    CONV_U1 = 0xD2, "conv.u1", None;
    CONV_I = 0xD3, "conv.i", None;
    CONV_OVF_I = 0xD4, "conv.ovf.i", None;
    CONV_OVF_U = 0xD5, "conv.ovf.u", None;
    ADD_OVF = 0xD6, "add.ovf", None;
    ADD_OVF_UN = 0xD7, "add.ovf.un", None;
    MUL_OVF = 0xD8, "mul.ovf", None;
    MUL_OVF_UN = 0xD9, "mul.ovf.un", None;
    SUB_OVF = 0xDA, "sub.ovf", None;
    SUB_OVF_UN = 0xDB, "sub.ovf.un", None;
    ENDFINALLY = 0xDC, "endfinally", None;
    LEAVE = 0xDD, "leave", InlineBrTarget;
    LEAVE_S = 0xDE, "leave.s", ShortInlineBrTarget;
    STIND_I = 0xDF, "stind.i", None;
    CONV_U = 0xE0, "conv.u", None;
    ARGLIST = 0xFE00, "arglist", None;
    CEQ = 0xFE01, "ceq", None;
    CGT = 0xFE02, "cgt", None;
    CGT_UN = 0xFE03, "cgt.un", None;
    CLT = 0xFE04, "clt", None;
    CLT_UN = 0xFE05, "clt.un", None;
    LDFTN = 0xFE06, "ldftn", InlineMethod;
    LDVIRTFTN = 0xFE07, "ldvirtftn", InlineMethod;
    LDARG = 0xFE09, "ldarg", InlineVar;
    LDARGA = 0xFE0A, "ldarga", InlineVar;
    STARG = 0xFE0B, "starg", InlineVar;
    LDLOC = 0xFE0C, "ldloc", InlineVar;
    LDLOCA = 0xFE0D, "ldloca", InlineVar;
    STLOC = 0xFE0E, "stloc", InlineVar;
    LOCALLOC = 0xFE0F, "localloc", None;
    ENDFILTER = 0xFE11, "endfilter", None;
    UNALIGNED = 0xFE12, "unaligned.", ShortInlineI;
    VOLATILE = 0xFE13, "volatile.", None;
    TAIL = 0xFE14, "tail.", None;
    INITOBJ = 0xFE15, "initobj", InlineType;
    CONSTRAINED = 0xFE16, "constrained.", InlineType;
    CPBLK = 0xFE17, "cpblk", None;
    INITBLK = 0xFE18, "initblk", None;
    NO = 0xFE19, "no.", ShortInlineI;
    RETHROW = 0xFE1A, "rethrow", None;
    SIZEOF = 0xFE1C, "sizeof", InlineType;
    REFANYTYPE = 0xFE1D, "refanytype", None;
    READONLY = 0xFE1E, "readonly.", None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        assert_eq!(OpCode::from_code(0x72), Some(OpCode::LDSTR));
        assert_eq!(OpCode::from_code(0xFE01), Some(OpCode::CEQ));
        assert_eq!(OpCode::from_code(0x24), None);
        assert_eq!(OpCode::from_code(0xFE08), None);
        assert_eq!(OpCode::CEQ.size(), 2);
        assert_eq!(OpCode::RET.size(), 1);
    }

    #[test]
    fn table_is_consistent() {
        for (index, opcode) in OpCode::ALL.iter().enumerate() {
            assert_eq!(OpCode::from_code(opcode.code), Some(*opcode));
            if let Some(next) = OpCode::ALL.get(index + 1) {
                assert!(opcode.code < next.code, "{} out of order", opcode.name);
            }
        }
        assert_eq!(OpCode::ALL.len(), 219);
    }

    #[test]
    fn operand_sizes() {
        assert_eq!(OpCode::LDC_I8.operand.size(), Some(8));
        assert_eq!(OpCode::BR_S.operand.size(), Some(1));
        assert_eq!(OpCode::LDLOC.operand.size(), Some(2));
        assert_eq!(OpCode::SWITCH.operand.size(), None);
        assert!(OpCode::CALL.operand.is_token());
        assert!(!OpCode::LDSTR.operand.is_token());
    }
}
