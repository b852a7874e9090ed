//! Locating patch sites in an instruction stream.
//!
//! Matching never fails: a search either yields [`MatchResult::Found`] or
//! [`MatchResult::NotFound`]. The decision of what a missing match means is left to the
//! rule that asked.

use crate::assembly::{InstructionStream, MethodRef};

/// Outcome of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// A matching instruction exists at `position`.
    Found {
        /// Position of the matching instruction
        position: usize,
    },
    /// No instruction matched.
    NotFound,
}

impl MatchResult {
    /// The matched position, if any.
    #[must_use]
    pub fn position(self) -> Option<usize> {
        match self {
            MatchResult::Found { position } => Some(position),
            MatchResult::NotFound => None,
        }
    }

    /// Whether a match was found.
    #[must_use]
    pub fn is_found(self) -> bool {
        matches!(self, MatchResult::Found { .. })
    }
}

impl From<Option<usize>> for MatchResult {
    fn from(position: Option<usize>) -> Self {
        match position {
            Some(position) => MatchResult::Found { position },
            None => MatchResult::NotFound,
        }
    }
}

/// Finds the first `call`/`callvirt` of `target` at or after `from`.
///
/// Operands are compared by method signature, so a call to an overload of `target` does
/// not match.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::{Instruction, InstructionStream, MethodRef, OpCode};
/// use cilpatch::patch::{find_call, MatchResult};
///
/// let target = MethodRef::instance("Verse.Listing", "NewColumn", &[], None);
/// let mut stream = InstructionStream::new("T::M");
/// stream.push(Instruction::new(OpCode::Ldarg1));
/// stream.push(Instruction::callvirt(target.clone()));
/// stream.push(Instruction::new(OpCode::Ret));
///
/// assert_eq!(find_call(&stream, &target, 0), MatchResult::Found { position: 1 });
/// assert_eq!(find_call(&stream, &target, 2), MatchResult::NotFound);
/// ```
#[must_use]
pub fn find_call(stream: &InstructionStream, target: &MethodRef, from: usize) -> MatchResult {
    stream
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, instruction)| instruction.calls(target))
        .map(|(position, _)| position)
        .into()
}

/// Searches backward from just before `before` for an address-of-local instruction
/// (`ldloca`, `ldloca.s`).
///
/// At most `window` instructions are inspected (positions `before - 1` down to
/// `before - window`), and the search never goes below `floor`. The nearest match wins.
#[must_use]
pub fn find_address_of_local_backward(
    stream: &InstructionStream,
    before: usize,
    window: usize,
    floor: usize,
) -> MatchResult {
    let end = before.min(stream.len());
    let start = end.saturating_sub(window).max(floor);
    if start >= end {
        return MatchResult::NotFound;
    }

    (start..end)
        .rev()
        .find(|&position| {
            stream
                .get(position)
                .is_some_and(|instruction| instruction.opcode.is_address_of_local())
        })
        .into()
}

/// Whether an anchor `distance` instructions before its call lies within `margin` of the
/// far edge of a `window`-sized search.
#[must_use]
pub fn near_window_boundary(distance: usize, window: usize, margin: usize) -> bool {
    distance > window.saturating_sub(margin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Instruction, OpCode};

    fn stream_with_anchor_at(anchor: usize, len: usize) -> InstructionStream {
        let mut stream = InstructionStream::new("T::M");
        for position in 0..len {
            if position == anchor {
                stream.push(Instruction::load_local_address(5));
            } else {
                stream.push(Instruction::new(OpCode::Nop));
            }
        }
        stream
    }

    #[test]
    fn test_find_call_requires_equal_signature() {
        let target = MethodRef::constructor("Verse.IntVec3", &["int32", "int32", "int32"]);
        let overload = MethodRef::constructor("Verse.IntVec3", &["int32", "int32"]);

        let mut stream = InstructionStream::new("T::M");
        stream.push(Instruction::call(overload));
        stream.push(Instruction::with_operand(
            OpCode::Newobj,
            crate::assembly::Operand::Method(target.clone()),
        ));
        stream.push(Instruction::call(target.clone()));
        stream.push(Instruction::call(target.clone()));

        assert_eq!(find_call(&stream, &target, 0).position(), Some(2));
        assert_eq!(find_call(&stream, &target, 3).position(), Some(3));
        assert!(!find_call(&stream, &target, 4).is_found());
        assert!(!find_call(&stream, &target, 100).is_found());
    }

    #[test]
    fn test_window_edges() {
        // Anchor exactly 12 back from the call at 12
        let stream = stream_with_anchor_at(0, 13);
        assert_eq!(
            find_address_of_local_backward(&stream, 12, 12, 0),
            MatchResult::Found { position: 0 }
        );

        // 13 back is out of reach
        let stream = stream_with_anchor_at(0, 14);
        assert_eq!(
            find_address_of_local_backward(&stream, 13, 12, 0),
            MatchResult::NotFound
        );
    }

    #[test]
    fn test_floor_and_nearest() {
        let mut stream = stream_with_anchor_at(2, 10);
        stream.replace(6, Instruction::load_local_address(7)).unwrap();

        assert_eq!(
            find_address_of_local_backward(&stream, 9, 12, 0).position(),
            Some(6)
        );
        assert_eq!(
            find_address_of_local_backward(&stream, 6, 12, 0).position(),
            Some(2)
        );
        assert!(!find_address_of_local_backward(&stream, 6, 12, 3).is_found());
        assert!(!find_address_of_local_backward(&stream, 0, 12, 0).is_found());
    }

    #[test]
    fn test_near_window_boundary() {
        assert!(!near_window_boundary(10, 12, 2));
        assert!(near_window_boundary(11, 12, 2));
        assert!(near_window_boundary(12, 12, 2));
        assert!(!near_window_boundary(12, 12, 0));
        assert!(near_window_boundary(1, 1, 5));
    }
}
