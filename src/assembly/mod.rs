//! Symbolic CIL instruction streams.
//!
//! This module holds the instruction model every patch rule operates on:
//!
//! - [`OpCode`] - The supported opcode vocabulary with encodings and stack effects
//! - [`Instruction`] / [`Operand`] - One symbolic instruction with attached metadata
//! - [`MethodRef`] - Method identity used for call matching
//! - [`InstructionStream`] - The editable body of one method
//! - [`StreamEncoder`] - Lowering of a stream back to code bytes and exception clauses
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{Instruction, InstructionStream, MethodRef, OpCode};
//!
//! let ctor = MethodRef::constructor("Verse.IntVec3", &["int32", "int32", "int32"]);
//!
//! let mut stream = InstructionStream::new("Verse.Game::InitNewGame");
//! stream.push(Instruction::load_local_address(4));
//! stream.push(Instruction::load_int(-1));
//! stream.push(Instruction::load_int(0));
//! stream.push(Instruction::load_int(-1));
//! stream.push(Instruction::call(ctor.clone()));
//! stream.push(Instruction::new(OpCode::Ret));
//!
//! assert!(stream.get(4).is_some_and(|instr| instr.calls(&ctor)));
//! assert_eq!(stream.stack_delta(0..5)?, 0);
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod encoder;
mod instruction;
mod method;
mod opcodes;
mod stream;

pub use encoder::{
    EncodedBody, ExceptionHandler, ExceptionHandlerFlags, StreamEncoder, Token, TokenResolver,
    TokenTable,
};
pub use instruction::{
    ExceptionBlock, FlowType, Immediate, Instruction, Label, Operand, StackBehavior,
};
pub use method::{MethodRef, CONSTRUCTOR_NAME};
pub use opcodes::{OpCode, OperandKind, FE_PREFIX};
pub use stream::InstructionStream;
