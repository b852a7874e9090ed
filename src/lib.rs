// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilpatch
//!
//! Load-time rewriting of CIL method bodies, without losing a single label or
//! exception-region boundary on the way.
//!
//! `cilpatch` works on symbolic instruction streams: branch targets are labels attached to
//! instructions, method operands are signatures, and exception regions are markers on the
//! instructions they start or end at. Patch rules insert, replace and remove instructions
//! in that representation; [`assembly::StreamEncoder`] lowers the result back to code
//! bytes, a max-stack value and exception clauses.
//!
//! ## Features
//!
//! - **Metadata-safe editing** - removing an instruction moves its labels and blocks to
//!   the successor, replacing one carries them over
//! - **Declarative rules** - [`patch::InsertAfterCallRule`] and
//!   [`patch::RedirectConstructorRule`], registered per target method
//! - **Never fatal** - a rule that cannot find its site leaves the method untouched and
//!   records a diagnostic; a rule that fails or breaks integrity is rolled back
//! - **Size substitution** - [`sizing::create_custom_vector`], the factory redirected
//!   constructor calls end up in
//!
//! ## Quick Start
//!
//! ```rust
//! use cilpatch::prelude::*;
//!
//! let engine = cilpatch::host::default_engine(EngineConfig::default())?;
//!
//! let ctor = cilpatch::host::intvec3_constructor();
//! let mut body = InstructionStream::new(cilpatch::host::INIT_NEW_GAME);
//! body.push(Instruction::load_local_address(3));
//! body.push(Instruction::load_int(-1));
//! body.push(Instruction::load_int(0));
//! body.push(Instruction::load_int(-1));
//! body.push(Instruction::call(ctor));
//! body.push(Instruction::new(OpCode::Ret));
//!
//! let report = engine.patch_method(body);
//! assert_eq!(report.total_replacements(), 1);
//! assert!(report.stream.get(4).is_some_and(|i| i.local_slot() == Some(3)));
//! # Ok::<(), cilpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Opcodes, symbolic instructions, streams and the encoder
//! - [`patch`] - Matching, rules, the engine and its event log
//! - [`sizing`] - Sentinel substitution and its configuration
//! - [`host`] - The concrete patch set and its method references
//! - [`Error`] and [`Result`] - Error handling

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// Symbolic CIL instruction streams and their encoding.
pub mod assembly;

/// Load-time rewriting of method bodies.
pub mod patch;

/// Size substitution performed by redirected construction sites.
pub mod sizing;

/// The patch set installed at load time.
pub mod host;

/// `cilpatch` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilpatch` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;
