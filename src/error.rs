use thiserror::Error;

use crate::assembly::Label;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Note that "the pattern was not found" is never an error in this crate. Rules report
/// missing matches through [`crate::patch::EventLog`] diagnostics and leave the stream
/// untouched. The variants below cover misuse of the stream API, invalid rule definitions
/// and failures while lowering a stream to bytes.
///
/// # Error Categories
///
/// ## Stream Errors
/// - [`Error::OutOfBounds`] - Position outside of the instruction stream
/// - [`Error::MetadataWouldBeDropped`] - A removal would orphan labels or exception blocks
/// - [`Error::Malformed`] - Structurally invalid stream contents
///
/// ## Rule Errors
/// - [`Error::InvalidRule`] - A rule was built with incompatible method references
///
/// ## Encoding Errors
/// - [`Error::UndefinedLabel`] - A branch targets a label that is attached nowhere
/// - [`Error::DuplicateLabel`] - A label is attached to more than one instruction
/// - [`Error::InvalidOperand`] - Operand kind does not fit the opcode
/// - [`Error::UnresolvedMember`] - The token resolver does not know a referenced method
///
/// # Examples
///
/// ```rust
/// use cilpatch::{Error, assembly::{InstructionStream, Instruction, OpCode}};
///
/// let mut stream = InstructionStream::new("Demo::Run");
/// stream.push(Instruction::new(OpCode::Ret));
///
/// match stream.remove(5) {
///     Err(Error::OutOfBounds) => {}
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The stream or operand is structurally invalid.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An access outside of the instruction stream was attempted.
    #[error("Out of Bound access would have occurred!")]
    OutOfBounds,

    /// Removing the instruction at the given position would drop attached labels or
    /// exception blocks.
    ///
    /// Use [`crate::assembly::InstructionStream::remove_relocating`] to move the metadata
    /// onto the successor first.
    #[error("Removing instruction {0} would drop attached control-flow metadata")]
    MetadataWouldBeDropped(usize),

    /// A patch rule was constructed with method references that cannot work together,
    /// e.g. a factory whose arity differs from the constructor it replaces.
    #[error("Invalid patch rule - {0}")]
    InvalidRule(String),

    /// A branch references a label that is not attached to any instruction.
    #[error("Undefined label - {0}")]
    UndefinedLabel(Label),

    /// The same label is attached to more than one instruction.
    #[error("Duplicate label - {0}")]
    DuplicateLabel(Label),

    /// The operand does not match what the opcode expects.
    #[error("Invalid operand for '{mnemonic}' - expected {expected}")]
    InvalidOperand {
        /// The mnemonic of the offending instruction
        mnemonic: &'static str,
        /// Description of the operand kind the opcode requires
        expected: &'static str,
    },

    /// A method reference could not be resolved to a metadata token.
    #[error("Unresolved member - {0}")]
    UnresolvedMember(String),
}
