//! Lowering of symbolic instruction streams to CIL method-body bytes.
//!
//! [`StreamEncoder`] turns an [`InstructionStream`] into the pieces a method body is
//! made of: the code bytes, the maximum evaluation-stack depth and the exception-handler
//! clauses derived from the attached [`ExceptionBlock`] markers.
//!
//! Labels become relative branch offsets here and nowhere else. Every branch is emitted
//! in its long (4-byte offset) form, so instruction sizes never depend on offsets and a
//! single layout pass is enough.
//!
//! Method references are turned into metadata tokens through a [`TokenResolver`]
//! supplied by the host. [`TokenTable`] is a simple in-memory resolver.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{Instruction, InstructionStream, OpCode, StreamEncoder, TokenTable};
//!
//! let mut stream = InstructionStream::new("Demo::Run");
//! let end = stream.define_label();
//! stream.push(Instruction::load_int(1));
//! stream.push(Instruction::branch(OpCode::Brtrue, end));
//! stream.push(Instruction::new(OpCode::Nop));
//! stream.push(Instruction::new(OpCode::Ret).labeled(end));
//!
//! let body = StreamEncoder::new().encode(&stream, &TokenTable::new())?;
//! assert_eq!(body.code, vec![0x17, 0x3A, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2A]);
//! assert_eq!(body.max_stack, 1);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::collections::HashMap;

use bitflags::bitflags;

use crate::{
    assembly::{
        instruction::{ExceptionBlock, Immediate, Instruction, Label, Operand},
        method::MethodRef,
        opcodes::OperandKind,
        stream::InstructionStream,
    },
    Error, Result,
};

/// Table id of `TypeRef` tokens.
const TYPE_REF_TABLE: u32 = 0x01;
/// Table id of `MemberRef` tokens.
const MEMBER_REF_TABLE: u32 = 0x0A;

/// A metadata token: table id in the high byte, 1-based row in the low 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Token(pub u32);

impl Token {
    /// Builds a token from its table id and row.
    #[must_use]
    pub fn from_parts(table: u32, row: u32) -> Self {
        Token((table << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The metadata table id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The 1-based row within the table.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Resolves symbolic references to metadata tokens of the module being rewritten.
pub trait TokenResolver {
    /// Token for a referenced method.
    fn method_token(&self, method: &MethodRef) -> Option<Token>;

    /// Token for a catch-clause type.
    fn type_token(&self, type_name: &str) -> Option<Token> {
        let _ = type_name;
        None
    }
}

/// In-memory resolver assigning `MemberRef` and `TypeRef` tokens in registration order.
#[derive(Debug, Default, Clone)]
pub struct TokenTable {
    methods: HashMap<MethodRef, Token>,
    types: HashMap<String, Token>,
}

impl TokenTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method, returning its token. Registering twice returns the same token.
    #[allow(clippy::cast_possible_truncation)]
    pub fn register_method(&mut self, method: &MethodRef) -> Token {
        let next_row = self.methods.len() as u32 + 1;
        *self
            .methods
            .entry(method.clone())
            .or_insert_with(|| Token::from_parts(MEMBER_REF_TABLE, next_row))
    }

    /// Registers a type, returning its token.
    #[allow(clippy::cast_possible_truncation)]
    pub fn register_type(&mut self, type_name: &str) -> Token {
        let next_row = self.types.len() as u32 + 1;
        *self
            .types
            .entry(type_name.to_string())
            .or_insert_with(|| Token::from_parts(TYPE_REF_TABLE, next_row))
    }
}

impl TokenResolver for TokenTable {
    fn method_token(&self, method: &MethodRef) -> Option<Token> {
        self.methods.get(method).copied()
    }

    fn type_token(&self, type_name: &str) -> Option<Token> {
        self.types.get(type_name).copied()
    }
}

bitflags! {
    /// Exception clause kinds, as encoded in a method body's extra data section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One exception-handling clause with resolved byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// Offset of the first protected instruction
    pub try_offset: u32,
    /// Length of the protected region in bytes
    pub try_length: u32,
    /// Offset of the first handler instruction
    pub handler_offset: u32,
    /// Length of the handler in bytes
    pub handler_length: u32,
    /// Caught type for typed clauses
    pub class_token: Option<Token>,
    /// Offset of the filter expression, 0 unless `flags` is `FILTER`
    pub filter_offset: u32,
}

/// Output of [`StreamEncoder::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    /// CIL code bytes
    pub code: Vec<u8>,
    /// Maximum evaluation-stack depth
    pub max_stack: u16,
    /// Exception clauses, inner regions before outer ones
    pub exception_handlers: Vec<ExceptionHandler>,
}

/// Branch offset to patch once label offsets are known.
#[derive(Debug, Clone, Copy)]
struct LabelFixup {
    label: Label,
    /// Where the 4-byte offset is written
    fixup_position: usize,
    /// Offset the branch is relative to
    base: u32,
}

#[derive(Debug)]
struct OpenHandler {
    flags: ExceptionHandlerFlags,
    start: u32,
    class_token: Option<Token>,
    filter_offset: u32,
}

#[derive(Debug)]
struct OpenRegion {
    try_start: u32,
    try_end: Option<u32>,
    filter_start: Option<u32>,
    handler: Option<OpenHandler>,
    clauses: usize,
}

/// Encodes instruction streams into method-body parts.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamEncoder;

impl StreamEncoder {
    /// Creates an encoder.
    #[must_use]
    pub fn new() -> Self {
        StreamEncoder
    }

    /// Encodes `stream`, resolving method and type references with `resolver`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperand`] if an operand does not fit its opcode
    /// - [`Error::DuplicateLabel`] / [`Error::UndefinedLabel`] for broken label wiring
    /// - [`Error::UnresolvedMember`] if the resolver does not know a referenced member
    /// - [`Error::Malformed`] for unbalanced exception-region markers
    pub fn encode(
        &self,
        stream: &InstructionStream,
        resolver: &dyn TokenResolver,
    ) -> Result<EncodedBody> {
        let (offsets, label_offsets) = Self::layout(stream)?;

        let mut code = Vec::new();
        let mut fixups = Vec::new();
        for (instruction, offset) in stream.iter().zip(&offsets) {
            Self::emit(instruction, *offset, resolver, &mut code, &mut fixups)?;
        }

        for fixup in &fixups {
            let target = label_offsets
                .get(&fixup.label)
                .ok_or(Error::UndefinedLabel(fixup.label))?;
            let target_i64 = i64::from(*target);
            let base_i64 = i64::from(fixup.base);
            let offset = i32::try_from(target_i64 - base_i64)
                .map_err(|_| malformed_error!("Branch offset exceeds i32 range"))?;
            code[fixup.fixup_position..fixup.fixup_position + 4]
                .copy_from_slice(&offset.to_le_bytes());
        }

        let code_len = u32::try_from(code.len())
            .map_err(|_| malformed_error!("Method body exceeds u32 range"))?;
        let exception_handlers = Self::exception_clauses(stream, &offsets, code_len, resolver)?;
        let max_stack = Self::max_stack(stream)?;

        Ok(EncodedBody {
            code,
            max_stack,
            exception_handlers,
        })
    }

    /// Computes the byte offset of every instruction and attached label.
    fn layout(stream: &InstructionStream) -> Result<(Vec<u32>, HashMap<Label, u32>)> {
        let mut offsets = Vec::with_capacity(stream.len());
        let mut labels = HashMap::new();
        let mut position = 0usize;

        for instruction in stream {
            let offset = u32::try_from(position)
                .map_err(|_| malformed_error!("Method body exceeds u32 range"))?;
            offsets.push(offset);
            for label in &instruction.labels {
                if labels.insert(*label, offset).is_some() {
                    return Err(Error::DuplicateLabel(*label));
                }
            }
            position += Self::encoded_size(instruction)?;
        }

        Ok((offsets, labels))
    }

    fn encoded_size(instruction: &Instruction) -> Result<usize> {
        let opcode_len = instruction.opcode.bytes().len();
        match instruction.opcode.operand_kind().size() {
            Some(size) => Ok(opcode_len + size),
            None => match &instruction.operand {
                Operand::Switch(targets) => Ok(opcode_len + 4 + 4 * targets.len()),
                _ => Err(Self::invalid(instruction, "switch table")),
            },
        }
    }

    fn invalid(instruction: &Instruction, expected: &'static str) -> Error {
        Error::InvalidOperand {
            mnemonic: instruction.opcode.mnemonic(),
            expected,
        }
    }

    fn emit(
        instruction: &Instruction,
        offset: u32,
        resolver: &dyn TokenResolver,
        code: &mut Vec<u8>,
        fixups: &mut Vec<LabelFixup>,
    ) -> Result<()> {
        code.extend_from_slice(&instruction.opcode.bytes());

        let size = u32::try_from(Self::encoded_size(instruction)?)
            .map_err(|_| malformed_error!("Instruction size exceeds u32 range"))?;
        let next = offset + size;

        match (instruction.opcode.operand_kind(), &instruction.operand) {
            (OperandKind::None, Operand::None) => {}
            (OperandKind::Int8, Operand::Immediate(Immediate::Int8(value))) => {
                code.extend_from_slice(&value.to_le_bytes());
            }
            (OperandKind::Int32, Operand::Immediate(Immediate::Int32(value))) => {
                code.extend_from_slice(&value.to_le_bytes());
            }
            (OperandKind::Float32, Operand::Immediate(Immediate::Float32(value))) => {
                code.extend_from_slice(&value.to_le_bytes());
            }
            (OperandKind::ShortLocal, Operand::Local(slot)) => {
                let slot = u8::try_from(*slot)
                    .map_err(|_| Self::invalid(instruction, "local slot below 256"))?;
                code.push(slot);
            }
            (OperandKind::Local, Operand::Local(slot)) => {
                code.extend_from_slice(&slot.to_le_bytes());
            }
            (OperandKind::ShortArgument, Operand::Argument(index)) => {
                let index = u8::try_from(*index)
                    .map_err(|_| Self::invalid(instruction, "argument index below 256"))?;
                code.push(index);
            }
            (OperandKind::Method, Operand::Method(method)) => {
                let token = resolver
                    .method_token(method)
                    .ok_or_else(|| Error::UnresolvedMember(method.to_string()))?;
                code.extend_from_slice(&token.value().to_le_bytes());
            }
            (OperandKind::Target, Operand::Target(label)) => {
                fixups.push(LabelFixup {
                    label: *label,
                    fixup_position: code.len(),
                    base: next,
                });
                code.extend_from_slice(&[0; 4]);
            }
            (OperandKind::Switch, Operand::Switch(targets)) => {
                let count = u32::try_from(targets.len())
                    .map_err(|_| malformed_error!("Switch table exceeds u32 range"))?;
                code.extend_from_slice(&count.to_le_bytes());
                // Switch offsets are relative to the end of the whole instruction
                for label in targets {
                    fixups.push(LabelFixup {
                        label: *label,
                        fixup_position: code.len(),
                        base: next,
                    });
                    code.extend_from_slice(&[0; 4]);
                }
            }
            (kind, _) => {
                return Err(Self::invalid(instruction, Self::describe(kind)));
            }
        }
        Ok(())
    }

    fn describe(kind: OperandKind) -> &'static str {
        match kind {
            OperandKind::None => "no operand",
            OperandKind::Int8 => "8-bit immediate",
            OperandKind::Int32 => "32-bit immediate",
            OperandKind::Float32 => "32-bit float immediate",
            OperandKind::ShortLocal | OperandKind::Local => "local slot",
            OperandKind::ShortArgument => "argument index",
            OperandKind::Method => "method reference",
            OperandKind::Target => "branch label",
            OperandKind::Switch => "switch table",
        }
    }

    fn exception_clauses(
        stream: &InstructionStream,
        offsets: &[u32],
        code_len: u32,
        resolver: &dyn TokenResolver,
    ) -> Result<Vec<ExceptionHandler>> {
        let mut regions: Vec<OpenRegion> = Vec::new();
        let mut clauses = Vec::new();

        for (instruction, &offset) in stream.iter().zip(offsets) {
            for block in &instruction.blocks {
                match block {
                    ExceptionBlock::BeginTry => regions.push(OpenRegion {
                        try_start: offset,
                        try_end: None,
                        filter_start: None,
                        handler: None,
                        clauses: 0,
                    }),
                    ExceptionBlock::BeginFilter => {
                        let region = Self::innermost(&mut regions)?;
                        Self::close_handler(region, offset, &mut clauses);
                        region.filter_start = Some(offset);
                    }
                    ExceptionBlock::BeginCatch(class) => {
                        let region = Self::innermost(&mut regions)?;
                        let (flags, filter_offset, class_token) = match region.filter_start.take() {
                            Some(filter) => (ExceptionHandlerFlags::FILTER, filter, None),
                            None => {
                                Self::close_handler(region, offset, &mut clauses);
                                let token = match class {
                                    Some(name) => Some(resolver.type_token(name).ok_or_else(
                                        || Error::UnresolvedMember(name.clone()),
                                    )?),
                                    None => None,
                                };
                                (ExceptionHandlerFlags::EXCEPTION, 0, token)
                            }
                        };
                        region.handler = Some(OpenHandler {
                            flags,
                            start: offset,
                            class_token,
                            filter_offset,
                        });
                    }
                    ExceptionBlock::BeginFinally | ExceptionBlock::BeginFault => {
                        let region = Self::innermost(&mut regions)?;
                        Self::close_handler(region, offset, &mut clauses);
                        let flags = if *block == ExceptionBlock::BeginFinally {
                            ExceptionHandlerFlags::FINALLY
                        } else {
                            ExceptionHandlerFlags::FAULT
                        };
                        region.handler = Some(OpenHandler {
                            flags,
                            start: offset,
                            class_token: None,
                            filter_offset: 0,
                        });
                    }
                    ExceptionBlock::End => {
                        let mut region = regions.pop().ok_or_else(|| {
                            malformed_error!(
                                "End of region at offset {} without a matching try",
                                offset
                            )
                        })?;
                        Self::close_handler(&mut region, offset, &mut clauses);
                        if region.clauses == 0 {
                            return Err(malformed_error!(
                                "Protected region at offset {} has no handler",
                                region.try_start
                            ));
                        }
                    }
                }
            }
        }

        if let Some(region) = regions.last() {
            return Err(malformed_error!(
                "Protected region at offset {} is never closed (body is {} bytes)",
                region.try_start,
                code_len
            ));
        }
        Ok(clauses)
    }

    fn innermost(regions: &mut [OpenRegion]) -> Result<&mut OpenRegion> {
        regions
            .last_mut()
            .ok_or_else(|| malformed_error!("Handler marker outside of a protected region"))
    }

    fn close_handler(region: &mut OpenRegion, offset: u32, clauses: &mut Vec<ExceptionHandler>) {
        if region.try_end.is_none() {
            region.try_end = Some(offset);
        }
        if let Some(handler) = region.handler.take() {
            let try_end = region.try_end.unwrap_or(offset);
            clauses.push(ExceptionHandler {
                flags: handler.flags,
                try_offset: region.try_start,
                try_length: try_end - region.try_start,
                handler_offset: handler.start,
                handler_length: offset - handler.start,
                class_token: handler.class_token,
                filter_offset: handler.filter_offset,
            });
            region.clauses += 1;
        }
    }

    /// Linear stack-depth walk. Branch targets inherit the depth recorded at the first
    /// branch reaching them when they are entered after a flow-ending instruction.
    fn max_stack(stream: &InstructionStream) -> Result<u16> {
        let mut label_depth: HashMap<Label, i32> = HashMap::new();
        let mut depth = 0i32;
        let mut max_depth = 0i32;
        let mut reachable = true;

        for instruction in stream {
            if !reachable {
                depth = instruction
                    .labels
                    .iter()
                    .find_map(|label| label_depth.get(label).copied())
                    .unwrap_or(0);
            }
            for block in &instruction.blocks {
                match block {
                    ExceptionBlock::BeginCatch(_) | ExceptionBlock::BeginFilter => depth = 1,
                    ExceptionBlock::BeginFinally | ExceptionBlock::BeginFault => depth = 0,
                    ExceptionBlock::BeginTry | ExceptionBlock::End => {}
                }
            }
            max_depth = max_depth.max(depth);

            let behavior = instruction.stack_behavior();
            depth = (depth - i32::from(behavior.pops)).max(0) + i32::from(behavior.pushes);
            max_depth = max_depth.max(depth);

            for label in instruction.branch_targets() {
                label_depth.entry(label).or_insert(depth);
            }
            reachable = !instruction.opcode.ends_flow();
            if !reachable {
                depth = 0;
            }
        }

        u16::try_from(max_depth).map_err(|_| malformed_error!("Stack depth exceeds u16 range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OpCode;

    #[test]
    fn test_simple_instruction_encoding() -> Result<()> {
        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::new(OpCode::Nop));
        stream.push(Instruction::new(OpCode::Ret));

        let body = StreamEncoder::new().encode(&stream, &TokenTable::new())?;
        assert_eq!(body.code, vec![0x00, 0x2A]);
        assert_eq!(body.max_stack, 0);
        assert!(body.exception_handlers.is_empty());
        Ok(())
    }

    #[test]
    fn test_operands() -> Result<()> {
        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::with_operand(OpCode::LdargS, Operand::Argument(1)));
        stream.push(Instruction::load_int(42));
        stream.push(Instruction::store_local(300));
        stream.push(Instruction::new(OpCode::Ret));

        let body = StreamEncoder::new().encode(&stream, &TokenTable::new())?;
        assert_eq!(
            body.code,
            vec![0x0E, 0x01, 0x1F, 42, 0xFE, 0x0E, 0x2C, 0x01, 0x2A]
        );
        assert_eq!(body.max_stack, 2);
        Ok(())
    }

    #[test]
    fn test_backward_branch() -> Result<()> {
        let mut stream = InstructionStream::new("T::M");
        let top = stream.define_label();
        stream.push(Instruction::new(OpCode::Nop).labeled(top));
        stream.push(Instruction::branch(OpCode::Br, top));

        let body = StreamEncoder::new().encode(&stream, &TokenTable::new())?;
        // br ends at 6, target is 0
        assert_eq!(body.code, vec![0x00, 0x38, 0xFA, 0xFF, 0xFF, 0xFF]);
        Ok(())
    }

    #[test]
    fn test_switch_offsets() -> Result<()> {
        let mut stream = InstructionStream::new("T::M");
        let a = stream.define_label();
        let b = stream.define_label();
        stream.push(Instruction::load_int(0));
        stream.push(Instruction::with_operand(OpCode::Switch, Operand::Switch(vec![a, b])));
        stream.push(Instruction::new(OpCode::Nop).labeled(a));
        stream.push(Instruction::new(OpCode::Ret).labeled(b));

        let body = StreamEncoder::new().encode(&stream, &TokenTable::new())?;
        // switch at 1, 1 + 4 + 8 bytes, ends at 14
        assert_eq!(
            body.code,
            vec![0x16, 0x45, 2, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0x00, 0x2A]
        );
        Ok(())
    }

    #[test]
    fn test_method_tokens() -> Result<()> {
        let hook = MethodRef::static_method("Mod.Hooks", "Run", &[], None);
        let mut tokens = TokenTable::new();
        let token = tokens.register_method(&hook);
        assert_eq!(token, Token(0x0A00_0001));
        assert_eq!(tokens.register_method(&hook), token);
        assert_eq!(token.table(), 0x0A);
        assert_eq!(token.row(), 1);

        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::call(hook));
        stream.push(Instruction::new(OpCode::Ret));

        let body = StreamEncoder::new().encode(&stream, &tokens)?;
        assert_eq!(body.code, vec![0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A]);

        let unresolved = StreamEncoder::new().encode(&stream, &TokenTable::new());
        assert!(matches!(unresolved, Err(Error::UnresolvedMember(_))));
        Ok(())
    }

    #[test]
    fn test_wrong_operand_type() {
        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::with_operand(
            OpCode::LdcI4S,
            Operand::Immediate(Immediate::Int32(1)),
        ));
        let result = StreamEncoder::new().encode(&stream, &TokenTable::new());
        assert!(matches!(
            result,
            Err(Error::InvalidOperand {
                mnemonic: "ldc.i4.s",
                ..
            })
        ));

        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::with_operand(OpCode::StlocS, Operand::Local(256)));
        assert!(StreamEncoder::new()
            .encode(&stream, &TokenTable::new())
            .is_err());
    }

    #[test]
    fn test_label_errors() {
        let mut stream = InstructionStream::new("T::M");
        let missing = stream.define_label();
        stream.push(Instruction::branch(OpCode::Br, missing));
        assert!(matches!(
            StreamEncoder::new().encode(&stream, &TokenTable::new()),
            Err(Error::UndefinedLabel(label)) if label == missing
        ));

        let mut stream = InstructionStream::new("T::M");
        let twice = stream.define_label();
        stream.push(Instruction::new(OpCode::Nop).labeled(twice));
        stream.push(Instruction::new(OpCode::Ret).labeled(twice));
        assert!(matches!(
            StreamEncoder::new().encode(&stream, &TokenTable::new()),
            Err(Error::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_try_finally_clause() -> Result<()> {
        let mut stream = InstructionStream::new("T::M");
        let after = stream.define_label();
        stream.push(Instruction::new(OpCode::Nop).with_block(ExceptionBlock::BeginTry));
        stream.push(Instruction::branch(OpCode::Leave, after));
        stream.push(Instruction::new(OpCode::Endfinally).with_block(ExceptionBlock::BeginFinally));
        stream.push(
            Instruction::new(OpCode::Ret)
                .labeled(after)
                .with_block(ExceptionBlock::End),
        );

        let body = StreamEncoder::new().encode(&stream, &TokenTable::new())?;
        assert_eq!(body.code, vec![0x00, 0xDD, 0x01, 0x00, 0x00, 0x00, 0xDC, 0x2A]);
        assert_eq!(
            body.exception_handlers,
            vec![ExceptionHandler {
                flags: ExceptionHandlerFlags::FINALLY,
                try_offset: 0,
                try_length: 6,
                handler_offset: 6,
                handler_length: 1,
                class_token: None,
                filter_offset: 0,
            }]
        );
        Ok(())
    }

    #[test]
    fn test_try_catch_and_filter_clauses() -> Result<()> {
        let mut tokens = TokenTable::new();
        let io = tokens.register_type("System.IO.IOException");

        let mut stream = InstructionStream::new("T::M");
        let after = stream.define_label();
        stream.push(Instruction::new(OpCode::Nop).with_block(ExceptionBlock::BeginTry)); // 0
        stream.push(Instruction::branch(OpCode::Leave, after)); // 1..6
        stream.push(
            Instruction::new(OpCode::Pop)
                .with_block(ExceptionBlock::BeginCatch(Some("System.IO.IOException".into()))),
        ); // 6
        stream.push(Instruction::branch(OpCode::Leave, after)); // 7..12
        stream.push(Instruction::new(OpCode::Pop).with_block(ExceptionBlock::BeginFilter)); // 12
        stream.push(Instruction::load_int(1)); // 13
        stream.push(Instruction::new(OpCode::Pop).with_block(ExceptionBlock::BeginCatch(None))); // 14
        stream.push(Instruction::branch(OpCode::Leave, after)); // 15..20
        stream.push(
            Instruction::new(OpCode::Ret)
                .labeled(after)
                .with_block(ExceptionBlock::End),
        ); // 20

        let body = StreamEncoder::new().encode(&stream, &tokens)?;
        assert_eq!(body.exception_handlers.len(), 2);

        let typed = &body.exception_handlers[0];
        assert_eq!(typed.flags, ExceptionHandlerFlags::EXCEPTION);
        assert_eq!((typed.try_offset, typed.try_length), (0, 6));
        assert_eq!((typed.handler_offset, typed.handler_length), (6, 6));
        assert_eq!(typed.class_token, Some(io));

        let filtered = &body.exception_handlers[1];
        assert_eq!(filtered.flags, ExceptionHandlerFlags::FILTER);
        assert_eq!((filtered.try_offset, filtered.try_length), (0, 6));
        assert_eq!(filtered.filter_offset, 12);
        assert_eq!((filtered.handler_offset, filtered.handler_length), (14, 6));
        assert_eq!(body.max_stack, 1);
        Ok(())
    }

    #[test]
    fn test_unbalanced_regions() {
        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::new(OpCode::Nop).with_block(ExceptionBlock::BeginTry));
        stream.push(Instruction::new(OpCode::Ret));
        assert!(matches!(
            StreamEncoder::new().encode(&stream, &TokenTable::new()),
            Err(Error::Malformed { .. })
        ));

        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::new(OpCode::Nop));
        stream.push(Instruction::new(OpCode::Ret).with_block(ExceptionBlock::End));
        match StreamEncoder::new().encode(&stream, &TokenTable::new()) {
            Err(Error::Malformed { message, .. }) => {
                assert_eq!(message, "End of region at offset 1 without a matching try");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
