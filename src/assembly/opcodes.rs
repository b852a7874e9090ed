//! The CIL opcode vocabulary understood by the patch engine.
//!
//! Only the subset of ECMA-335 opcodes that appears in the method bodies we rewrite (and
//! the code we inject into them) is modelled. Every [`OpCode`] knows its mnemonic, its
//! encoded bytes, the operand it expects, its control-flow behavior and, where it is
//! fixed, its stack effect.
//!
//! Two-byte opcodes use the `0xFE` prefix, see [`FE_PREFIX`].

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::assembly::instruction::{FlowType, StackBehavior};

/// First byte shared by all two-byte opcodes.
pub const FE_PREFIX: u8 = 0xFE;

/// Kind of operand an opcode expects, including its encoded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// Signed 8-bit immediate
    Int8,
    /// Signed 32-bit immediate
    Int32,
    /// 32-bit float immediate
    Float32,
    /// Local slot, 1 byte encoded
    ShortLocal,
    /// Local slot, 2 bytes encoded
    Local,
    /// Argument slot, 1 byte encoded
    ShortArgument,
    /// Method reference, encoded as a metadata token
    Method,
    /// Branch label, encoded as a 4-byte relative offset
    Target,
    /// Switch label table, encoded as count + 4-byte offsets
    Switch,
}

impl OperandKind {
    /// Encoded operand size in bytes, `None` for the variable-size switch table.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::Int8 | OperandKind::ShortLocal | OperandKind::ShortArgument => Some(1),
            OperandKind::Local => Some(2),
            OperandKind::Int32 | OperandKind::Float32 | OperandKind::Method | OperandKind::Target => {
                Some(4)
            }
            OperandKind::Switch => None,
        }
    }
}

/// A CIL opcode.
///
/// ```rust
/// use cilpatch::assembly::OpCode;
///
/// assert_eq!(OpCode::from_mnemonic("ldloca.s"), Some(OpCode::LdlocaS));
/// assert!(OpCode::LdlocaS.is_address_of_local());
/// assert!(OpCode::Callvirt.is_call());
/// ```
// Variants are named after their mnemonics, see `mnemonic()`
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum OpCode {
    Nop,
    Ldarg0,
    Ldarg1,
    Ldarg2,
    Ldarg3,
    LdargS,
    Ldloc0,
    Ldloc1,
    Ldloc2,
    Ldloc3,
    LdlocS,
    Ldloc,
    Stloc0,
    Stloc1,
    Stloc2,
    Stloc3,
    StlocS,
    Stloc,
    LdlocaS,
    Ldloca,
    Ldnull,
    LdcI4M1,
    LdcI40,
    LdcI41,
    LdcI4S,
    LdcI4,
    LdcR4,
    Dup,
    Pop,
    Call,
    Callvirt,
    Newobj,
    Ret,
    Br,
    Brfalse,
    Brtrue,
    Beq,
    BneUn,
    Bgt,
    Blt,
    Switch,
    Add,
    Sub,
    Mul,
    Div,
    Ceq,
    Cgt,
    Clt,
    Throw,
    Rethrow,
    Leave,
    Endfinally,
}

/// Static per-opcode data.
struct OpInfo {
    mnemonic: &'static str,
    prefix: u8,
    code: u8,
    operand: OperandKind,
    flow: FlowType,
    /// `None` for opcodes whose stack effect depends on the operand (calls)
    stack: Option<(u8, u8)>,
}

const fn op(
    mnemonic: &'static str,
    prefix: u8,
    code: u8,
    operand: OperandKind,
    flow: FlowType,
    stack: Option<(u8, u8)>,
) -> OpInfo {
    OpInfo {
        mnemonic,
        prefix,
        code,
        operand,
        flow,
        stack,
    }
}

impl OpCode {
    fn info(self) -> OpInfo {
        use FlowType::{
            Call, ConditionalBranch, EndFinally, Leave, Return, Sequential, Throw,
            UnconditionalBranch,
        };
        use OperandKind as K;

        match self {
            OpCode::Nop => op("nop", 0, 0x00, K::None, Sequential, Some((0, 0))),
            OpCode::Ldarg0 => op("ldarg.0", 0, 0x02, K::None, Sequential, Some((0, 1))),
            OpCode::Ldarg1 => op("ldarg.1", 0, 0x03, K::None, Sequential, Some((0, 1))),
            OpCode::Ldarg2 => op("ldarg.2", 0, 0x04, K::None, Sequential, Some((0, 1))),
            OpCode::Ldarg3 => op("ldarg.3", 0, 0x05, K::None, Sequential, Some((0, 1))),
            OpCode::LdargS => op("ldarg.s", 0, 0x0E, K::ShortArgument, Sequential, Some((0, 1))),
            OpCode::Ldloc0 => op("ldloc.0", 0, 0x06, K::None, Sequential, Some((0, 1))),
            OpCode::Ldloc1 => op("ldloc.1", 0, 0x07, K::None, Sequential, Some((0, 1))),
            OpCode::Ldloc2 => op("ldloc.2", 0, 0x08, K::None, Sequential, Some((0, 1))),
            OpCode::Ldloc3 => op("ldloc.3", 0, 0x09, K::None, Sequential, Some((0, 1))),
            OpCode::LdlocS => op("ldloc.s", 0, 0x11, K::ShortLocal, Sequential, Some((0, 1))),
            OpCode::Ldloc => op("ldloc", FE_PREFIX, 0x0C, K::Local, Sequential, Some((0, 1))),
            OpCode::Stloc0 => op("stloc.0", 0, 0x0A, K::None, Sequential, Some((1, 0))),
            OpCode::Stloc1 => op("stloc.1", 0, 0x0B, K::None, Sequential, Some((1, 0))),
            OpCode::Stloc2 => op("stloc.2", 0, 0x0C, K::None, Sequential, Some((1, 0))),
            OpCode::Stloc3 => op("stloc.3", 0, 0x0D, K::None, Sequential, Some((1, 0))),
            OpCode::StlocS => op("stloc.s", 0, 0x13, K::ShortLocal, Sequential, Some((1, 0))),
            OpCode::Stloc => op("stloc", FE_PREFIX, 0x0E, K::Local, Sequential, Some((1, 0))),
            OpCode::LdlocaS => op("ldloca.s", 0, 0x12, K::ShortLocal, Sequential, Some((0, 1))),
            OpCode::Ldloca => op("ldloca", FE_PREFIX, 0x0D, K::Local, Sequential, Some((0, 1))),
            OpCode::Ldnull => op("ldnull", 0, 0x14, K::None, Sequential, Some((0, 1))),
            OpCode::LdcI4M1 => op("ldc.i4.m1", 0, 0x15, K::None, Sequential, Some((0, 1))),
            OpCode::LdcI40 => op("ldc.i4.0", 0, 0x16, K::None, Sequential, Some((0, 1))),
            OpCode::LdcI41 => op("ldc.i4.1", 0, 0x17, K::None, Sequential, Some((0, 1))),
            OpCode::LdcI4S => op("ldc.i4.s", 0, 0x1F, K::Int8, Sequential, Some((0, 1))),
            OpCode::LdcI4 => op("ldc.i4", 0, 0x20, K::Int32, Sequential, Some((0, 1))),
            OpCode::LdcR4 => op("ldc.r4", 0, 0x22, K::Float32, Sequential, Some((0, 1))),
            OpCode::Dup => op("dup", 0, 0x25, K::None, Sequential, Some((1, 2))),
            OpCode::Pop => op("pop", 0, 0x26, K::None, Sequential, Some((1, 0))),
            OpCode::Call => op("call", 0, 0x28, K::Method, Call, None),
            OpCode::Callvirt => op("callvirt", 0, 0x6F, K::Method, Call, None),
            OpCode::Newobj => op("newobj", 0, 0x73, K::Method, Call, None),
            // ret's pop count depends on the enclosing signature; treated as neutral
            OpCode::Ret => op("ret", 0, 0x2A, K::None, Return, Some((0, 0))),
            OpCode::Br => op("br", 0, 0x38, K::Target, UnconditionalBranch, Some((0, 0))),
            OpCode::Brfalse => op("brfalse", 0, 0x39, K::Target, ConditionalBranch, Some((1, 0))),
            OpCode::Brtrue => op("brtrue", 0, 0x3A, K::Target, ConditionalBranch, Some((1, 0))),
            OpCode::Beq => op("beq", 0, 0x3B, K::Target, ConditionalBranch, Some((2, 0))),
            OpCode::BneUn => op("bne.un", 0, 0x40, K::Target, ConditionalBranch, Some((2, 0))),
            OpCode::Bgt => op("bgt", 0, 0x3D, K::Target, ConditionalBranch, Some((2, 0))),
            OpCode::Blt => op("blt", 0, 0x3F, K::Target, ConditionalBranch, Some((2, 0))),
            OpCode::Switch => op("switch", 0, 0x45, K::Switch, FlowType::Switch, Some((1, 0))),
            OpCode::Add => op("add", 0, 0x58, K::None, Sequential, Some((2, 1))),
            OpCode::Sub => op("sub", 0, 0x59, K::None, Sequential, Some((2, 1))),
            OpCode::Mul => op("mul", 0, 0x5A, K::None, Sequential, Some((2, 1))),
            OpCode::Div => op("div", 0, 0x5B, K::None, Sequential, Some((2, 1))),
            OpCode::Ceq => op("ceq", FE_PREFIX, 0x01, K::None, Sequential, Some((2, 1))),
            OpCode::Cgt => op("cgt", FE_PREFIX, 0x02, K::None, Sequential, Some((2, 1))),
            OpCode::Clt => op("clt", FE_PREFIX, 0x04, K::None, Sequential, Some((2, 1))),
            OpCode::Throw => op("throw", 0, 0x7A, K::None, Throw, Some((1, 0))),
            OpCode::Rethrow => op("rethrow", FE_PREFIX, 0x1A, K::None, Throw, Some((0, 0))),
            OpCode::Leave => op("leave", 0, 0xDD, K::Target, Leave, Some((0, 0))),
            OpCode::Endfinally => op("endfinally", 0, 0xDC, K::None, EndFinally, Some((0, 0))),
        }
    }

    /// Human-readable mnemonic, e.g. `"ldloca.s"`.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Looks an opcode up by its mnemonic.
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<OpCode> {
        OpCode::iter().find(|opcode| opcode.mnemonic() == mnemonic)
    }

    /// Encoded opcode bytes (one or two).
    #[must_use]
    pub fn bytes(self) -> Vec<u8> {
        let info = self.info();
        if info.prefix == 0 {
            vec![info.code]
        } else {
            vec![info.prefix, info.code]
        }
    }

    /// The operand this opcode expects.
    #[must_use]
    pub fn operand_kind(self) -> OperandKind {
        self.info().operand
    }

    /// How this opcode affects control flow.
    #[must_use]
    pub fn flow_type(self) -> FlowType {
        self.info().flow
    }

    /// Fixed stack effect, `None` for call-family opcodes whose effect depends on the
    /// referenced method.
    #[must_use]
    pub fn fixed_stack_behavior(self) -> Option<StackBehavior> {
        self.info()
            .stack
            .map(|(pops, pushes)| StackBehavior::new(pops, pushes))
    }

    /// `call` and `callvirt`. `newobj` allocates and is not part of the call family
    /// the matcher looks at.
    #[must_use]
    pub fn is_call(self) -> bool {
        matches!(self, OpCode::Call | OpCode::Callvirt)
    }

    /// `ldloca` and `ldloca.s`, the output-address instructions a value-type
    /// constructor writes through.
    #[must_use]
    pub fn is_address_of_local(self) -> bool {
        matches!(self, OpCode::Ldloca | OpCode::LdlocaS)
    }

    /// Any form of `stloc`.
    #[must_use]
    pub fn is_store_local(self) -> bool {
        matches!(
            self,
            OpCode::Stloc0
                | OpCode::Stloc1
                | OpCode::Stloc2
                | OpCode::Stloc3
                | OpCode::StlocS
                | OpCode::Stloc
        )
    }

    /// Opcodes that carry one or more branch labels.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// Opcodes after which execution does not fall through to the next instruction.
    #[must_use]
    pub fn ends_flow(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::Leave
                | FlowType::EndFinally
        )
    }

    /// Slot implied by the short `ldloc.N`/`stloc.N` encodings.
    #[must_use]
    pub fn implicit_local(self) -> Option<u16> {
        match self {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
