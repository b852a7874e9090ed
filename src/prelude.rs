//! # cilpatch Prelude
//!
//! The types needed to build streams, register rules and read patch reports.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilpatch operations
pub use crate::Error;

/// The result type used throughout cilpatch
pub use crate::Result;

// ================================================================================================
// Instruction Streams
// ================================================================================================

/// Symbolic instructions and their containers
pub use crate::assembly::{
    ExceptionBlock, Instruction, InstructionStream, Label, MethodRef, OpCode, Operand,
};

/// Encoding of patched streams
pub use crate::assembly::{EncodedBody, StreamEncoder, TokenResolver, TokenTable};

// ================================================================================================
// Patching
// ================================================================================================

/// Engine, rules and reports
pub use crate::patch::{
    EngineConfig, EventKind, EventLog, InsertAfterCallRule, PatchEngine, PatchReport, PatchRule,
    RedirectConstructorRule, RuleContext, RuleOutcome,
};

// ================================================================================================
// Sizing
// ================================================================================================

/// Sentinel substitution
pub use crate::sizing::{
    create_custom_vector, decide, IntVec3, MapSizeSettings, SettingsProvider, SharedSettings,
    SizingMode, SizingSnapshot,
};
