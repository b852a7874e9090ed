//! Symbolic instruction representation used by the patch engine.
//!
//! Unlike a decoded instruction, which refers to branch targets by byte offset, the
//! instructions in this module are symbolic: branch operands are [`Label`]s, method
//! operands are [`MethodRef`]s and every instruction carries the control-flow metadata
//! attached to it. This is what lets a rule insert or remove instructions without
//! recomputing offsets; offsets only materialize when the stream is lowered by
//! [`crate::assembly::StreamEncoder`].
//!
//! # Key Components
//!
//! - [`Instruction`] - One opcode, its operand, attached labels and exception blocks
//! - [`Operand`] - Typed operand representation
//! - [`Immediate`] - Constant operands
//! - [`Label`] - Opaque branch target identity
//! - [`ExceptionBlock`] - Exception-region boundary marker
//! - [`FlowType`] / [`StackBehavior`] - Control flow and stack effect metadata

use std::fmt::{self, UpperHex};

use crate::assembly::{method::MethodRef, opcodes::OpCode};

/// Opaque identity of a branch target.
///
/// Labels are allocated by [`crate::assembly::InstructionStream::define_label`] and are
/// only meaningful within the stream that allocated them. A label is attached to at most
/// one instruction; branches refer to it through [`Operand::Target`] or [`Operand::Switch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Returns the numeric identity of this label.
    #[must_use]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L_{:04}", self.0)
    }
}

/// Exception-region boundary attached to the instruction it precedes.
///
/// A marker on instruction `i` means "the region boundary lies immediately before `i`".
/// A protected region therefore looks like `BeginTry` on its first instruction, one
/// handler marker on the first instruction of each handler, and `End` on the first
/// instruction after the last handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionBlock {
    /// Start of a protected region
    BeginTry,
    /// Start of a typed catch handler, or of the handler body following a filter
    BeginCatch(Option<String>),
    /// Start of a filter expression
    BeginFilter,
    /// Start of a finally handler
    BeginFinally,
    /// Start of a fault handler
    BeginFault,
    /// End of the last handler of the innermost open region
    End,
}

/// Constant operand embedded in an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// 32-bit floating point immediate value
    Float32(f32),
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:02X}"),
            Immediate::Int32(value) => write!(f, "{value:08X}"),
            Immediate::Float32(value) => write!(f, "{:08X}", value.to_bits()),
        }
    }
}

impl From<Immediate> for u64 {
    fn from(val: Immediate) -> Self {
        match val {
            // For signed integers, we preserve the bit pattern
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int8(value) => value as u64,
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int32(value) => value as u64,
            Immediate::Float32(value) => u64::from(value.to_bits()),
        }
    }
}

/// Typed operand of an [`Instruction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Branch target
    Target(Label),
    /// Referenced method (calls and `newobj`)
    Method(MethodRef),
    /// Local variable slot
    Local(u16),
    /// Method argument slot
    Argument(u16),
    /// Switch table
    Switch(Vec<Label>),
}

impl Operand {
    /// Returns a formatted string representation of the operand.
    ///
    /// # Returns
    ///
    /// - `None` for [`Operand::None`]
    /// - A formatted string for all other operand types
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Operand::None => None,
            Operand::Immediate(imm) => Some(format!("{imm:?}")),
            Operand::Target(label) => Some(label.to_string()),
            Operand::Method(method) => Some(method.to_string()),
            Operand::Local(l) => Some(format!("V_{l}")),
            Operand::Argument(a) => Some(format!("A_{a}")),
            Operand::Switch(targets) => Some(format!(
                "({})",
                targets
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

impl StackBehavior {
    /// Creates a behavior and derives its net effect.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn new(pops: u8, pushes: u8) -> Self {
        StackBehavior {
            pops,
            pushes,
            net_effect: pushes as i8 - pops as i8,
        }
    }
}

/// A single symbolic CIL instruction.
///
/// Labels and exception blocks travel with the instruction they are attached to. The
/// stream operations that insert, remove or replace instructions keep that attachment
/// intact, see [`crate::assembly::InstructionStream`].
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::{Instruction, MethodRef, OpCode};
///
/// let ctor = MethodRef::constructor("Verse.IntVec3", &["int32", "int32", "int32"]);
/// let call = Instruction::call(ctor);
/// assert!(call.opcode.is_call());
/// assert_eq!(call.stack_behavior().pops, 4);
///
/// let store = Instruction::store_local(7);
/// assert_eq!(store.local_slot(), Some(7));
/// ```
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, which must fit [`OpCode::operand_kind`]
    pub operand: Operand,
    /// Branch-target labels attached to this instruction
    pub labels: Vec<Label>,
    /// Exception-region boundaries that lie immediately before this instruction
    pub blocks: Vec<ExceptionBlock>,
}

impl Instruction {
    /// Creates an operand-less instruction.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Self::with_operand(opcode, Operand::None)
    }

    /// Creates an instruction with the given operand and no attached metadata.
    #[must_use]
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            labels: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// `call method`
    #[must_use]
    pub fn call(method: MethodRef) -> Self {
        Self::with_operand(OpCode::Call, Operand::Method(method))
    }

    /// `callvirt method`
    #[must_use]
    pub fn callvirt(method: MethodRef) -> Self {
        Self::with_operand(OpCode::Callvirt, Operand::Method(method))
    }

    /// Address of a local, using the short form where the slot fits.
    #[must_use]
    pub fn load_local_address(slot: u16) -> Self {
        if slot <= u16::from(u8::MAX) {
            Self::with_operand(OpCode::LdlocaS, Operand::Local(slot))
        } else {
            Self::with_operand(OpCode::Ldloca, Operand::Local(slot))
        }
    }

    /// Store into a local, using the short form where the slot fits.
    #[must_use]
    pub fn store_local(slot: u16) -> Self {
        if slot <= u16::from(u8::MAX) {
            Self::with_operand(OpCode::StlocS, Operand::Local(slot))
        } else {
            Self::with_operand(OpCode::Stloc, Operand::Local(slot))
        }
    }

    /// `ldc.i4` family, picking the most compact encoding.
    #[must_use]
    pub fn load_int(value: i32) -> Self {
        match value {
            -1 => Self::new(OpCode::LdcI4M1),
            0 => Self::new(OpCode::LdcI40),
            1 => Self::new(OpCode::LdcI41),
            v => match i8::try_from(v) {
                Ok(small) => {
                    Self::with_operand(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(small)))
                }
                Err(_) => Self::with_operand(OpCode::LdcI4, Operand::Immediate(Immediate::Int32(v))),
            },
        }
    }

    /// Unconditional or conditional branch to `target`.
    #[must_use]
    pub fn branch(opcode: OpCode, target: Label) -> Self {
        Self::with_operand(opcode, Operand::Target(target))
    }

    /// Attaches a label to this instruction, builder style.
    #[must_use]
    pub fn labeled(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Attaches an exception-region marker to this instruction, builder style.
    #[must_use]
    pub fn with_block(mut self, block: ExceptionBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Whether any label or exception block is attached.
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        !self.labels.is_empty() || !self.blocks.is_empty()
    }

    /// Number of attached labels plus exception blocks.
    #[must_use]
    pub fn metadata_len(&self) -> usize {
        self.labels.len() + self.blocks.len()
    }

    /// The referenced method for call-family instructions.
    #[must_use]
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Whether this is a `call`/`callvirt` whose operand equals `target`.
    #[must_use]
    pub fn calls(&self, target: &MethodRef) -> bool {
        self.opcode.is_call() && self.method() == Some(target)
    }

    /// Local slot accessed by this instruction, explicit or implied by the opcode.
    #[must_use]
    pub fn local_slot(&self) -> Option<u16> {
        match self.operand {
            Operand::Local(slot) => Some(slot),
            _ => self.opcode.implicit_local(),
        }
    }

    /// Labels this instruction may transfer control to.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Target(label) => vec![*label],
            Operand::Switch(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }

    /// How this instruction affects control flow.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Stack effect of this instruction.
    ///
    /// For call-family opcodes the effect is derived from the referenced signature; a
    /// call-family instruction without a method operand is treated as neutral.
    #[must_use]
    pub fn stack_behavior(&self) -> StackBehavior {
        if let Some(fixed) = self.opcode.fixed_stack_behavior() {
            return fixed;
        }
        match self.method() {
            Some(method) => method.stack_behavior(self.opcode),
            None => StackBehavior::new(0, 0),
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }
        for block in &self.blocks {
            write!(f, "[{block:?}] ")?;
        }
        write!(f, "{}", self.opcode.mnemonic())?;
        if let Some(operand) = self.operand.as_string() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
