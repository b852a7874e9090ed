//! Mutable, ordered instruction sequence of one method body.
//!
//! [`InstructionStream`] is the unit every patch rule works on. Its editing operations
//! are written so that control-flow metadata (labels and exception-region markers) is
//! never silently lost:
//!
//! - [`InstructionStream::remove`] refuses to drop an instruction that carries metadata
//! - [`InstructionStream::remove_relocating`] moves the metadata onto the successor first
//! - [`InstructionStream::replace`] carries the metadata over to the replacement
//!
//! The invariant "every label referenced by a branch is attached to exactly one
//! instruction" can be checked with [`InstructionStream::dangling_labels`], and
//! [`InstructionStream::metadata_count`] gives a cheap conservation check across edits.

use std::{collections::HashSet, fmt, ops::Range};

use crate::{
    assembly::instruction::{ExceptionBlock, Instruction, Label},
    Error, Result,
};

/// Ordered instructions of one method body, plus the method's identity.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::{Instruction, InstructionStream, OpCode};
///
/// let mut stream = InstructionStream::new("Demo::Run");
/// let end = stream.define_label();
/// stream.push(Instruction::load_int(1));
/// stream.push(Instruction::branch(OpCode::Brtrue, end));
/// stream.push(Instruction::new(OpCode::Nop));
/// stream.push(Instruction::new(OpCode::Ret).labeled(end));
///
/// assert_eq!(stream.len(), 4);
/// assert!(stream.dangling_labels().is_empty());
/// assert_eq!(stream.position_of_label(end), Some(3));
/// ```
#[derive(Clone, PartialEq)]
pub struct InstructionStream {
    method: String,
    instructions: Vec<Instruction>,
    next_label: u32,
}

impl InstructionStream {
    /// Creates an empty stream for the given method.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        InstructionStream {
            method: method.into(),
            instructions: Vec::new(),
            next_label: 0,
        }
    }

    /// Creates a stream from existing instructions.
    ///
    /// Labels allocated afterwards never collide with labels already attached to or
    /// referenced by `instructions`.
    #[must_use]
    pub fn from_instructions(method: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        let next_label = instructions
            .iter()
            .flat_map(|instr| instr.labels.iter().copied().chain(instr.branch_targets()))
            .map(|label| label.0.saturating_add(1))
            .max()
            .unwrap_or(0);

        InstructionStream {
            method: method.into(),
            instructions,
            next_label,
        }
    }

    /// The method this stream belongs to.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the stream has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Instruction> {
        self.instructions.get(position)
    }

    /// Mutable instruction at `position`.
    pub fn get_mut(&mut self, position: usize) -> Option<&mut Instruction> {
        self.instructions.get_mut(position)
    }

    /// All instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Iterates the instructions in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Consumes the stream, returning its instructions.
    #[must_use]
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Allocates a fresh label, unique within this stream.
    pub fn define_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Attaches a freshly allocated label to the instruction at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if `position` is past the end.
    pub fn mark_label(&mut self, position: usize) -> Result<Label> {
        if position >= self.instructions.len() {
            return Err(Error::OutOfBounds);
        }
        let label = self.define_label();
        self.instructions[position].labels.push(label);
        Ok(label)
    }

    /// Appends an instruction, returning its position.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Inserts an instruction so that it ends up at `position`.
    ///
    /// Instructions previously at `position` and after shift back by one. Metadata stays
    /// with the instructions it was attached to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if `position > len()`.
    pub fn insert(&mut self, position: usize, instruction: Instruction) -> Result<()> {
        if position > self.instructions.len() {
            return Err(Error::OutOfBounds);
        }
        self.instructions.insert(position, instruction);
        Ok(())
    }

    /// Removes an instruction that carries no metadata.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfBounds`] if `position` is past the end
    /// - [`Error::MetadataWouldBeDropped`] if labels or exception blocks are attached
    pub fn remove(&mut self, position: usize) -> Result<Instruction> {
        let instruction = self.instructions.get(position).ok_or(Error::OutOfBounds)?;
        if instruction.has_metadata() {
            return Err(Error::MetadataWouldBeDropped(position));
        }
        Ok(self.instructions.remove(position))
    }

    /// Removes an instruction after moving its labels and exception blocks onto the
    /// instruction that follows it.
    ///
    /// Relocated metadata is placed ahead of the successor's own metadata, preserving the
    /// order in which region boundaries are crossed. The returned instruction carries no
    /// metadata.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfBounds`] if `position` is past the end
    /// - [`Error::MetadataWouldBeDropped`] if metadata is attached and there is no
    ///   successor to receive it; the stream is left untouched
    pub fn remove_relocating(&mut self, position: usize) -> Result<Instruction> {
        let instruction = self.instructions.get(position).ok_or(Error::OutOfBounds)?;
        if instruction.has_metadata() {
            if position + 1 >= self.instructions.len() {
                return Err(Error::MetadataWouldBeDropped(position));
            }
            self.transfer_metadata(position, position + 1)?;
        }
        Ok(self.instructions.remove(position))
    }

    /// Replaces the instruction at `position`, keeping its labels and exception blocks on
    /// the replacement.
    ///
    /// Returns the previous instruction with its metadata stripped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if `position` is past the end.
    pub fn replace(&mut self, position: usize, mut instruction: Instruction) -> Result<Instruction> {
        let slot = self
            .instructions
            .get_mut(position)
            .ok_or(Error::OutOfBounds)?;

        let mut labels = std::mem::take(&mut slot.labels);
        let mut blocks = std::mem::take(&mut slot.blocks);
        labels.append(&mut instruction.labels);
        blocks.append(&mut instruction.blocks);
        instruction.labels = labels;
        instruction.blocks = blocks;

        Ok(std::mem::replace(slot, instruction))
    }

    /// Moves all labels and exception blocks from `from` to `to`.
    ///
    /// The moved metadata is placed ahead of whatever `to` already carries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if either position is past the end.
    pub fn transfer_metadata(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.instructions.len() || to >= self.instructions.len() {
            return Err(Error::OutOfBounds);
        }
        if from == to {
            return Ok(());
        }

        let mut labels = std::mem::take(&mut self.instructions[from].labels);
        let mut blocks: Vec<ExceptionBlock> = std::mem::take(&mut self.instructions[from].blocks);

        let target = &mut self.instructions[to];
        labels.append(&mut target.labels);
        blocks.append(&mut target.blocks);
        target.labels = labels;
        target.blocks = blocks;
        Ok(())
    }

    /// Total number of labels and exception blocks attached across the stream.
    #[must_use]
    pub fn metadata_count(&self) -> usize {
        self.instructions.iter().map(Instruction::metadata_len).sum()
    }

    /// Position of the instruction a label is attached to.
    #[must_use]
    pub fn position_of_label(&self, label: Label) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instr| instr.labels.contains(&label))
    }

    /// Labels referenced by branches but attached to no instruction, in first-reference
    /// order.
    #[must_use]
    pub fn dangling_labels(&self) -> Vec<Label> {
        let attached: HashSet<Label> = self
            .instructions
            .iter()
            .flat_map(|instr| instr.labels.iter().copied())
            .collect();

        let mut seen = HashSet::new();
        self.instructions
            .iter()
            .flat_map(Instruction::branch_targets)
            .filter(|label| !attached.contains(label) && seen.insert(*label))
            .collect()
    }

    /// Net evaluation-stack effect of the instructions in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the range exceeds the stream.
    pub fn stack_delta(&self, range: Range<usize>) -> Result<i32> {
        let slice = self.instructions.get(range).ok_or(Error::OutOfBounds)?;
        Ok(slice
            .iter()
            .map(|instr| i32::from(instr.stack_behavior().net_effect))
            .sum())
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl fmt::Debug for InstructionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} instructions)", self.method, self.instructions.len())?;
        for (position, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "  {position:4}: {instruction:?}")?;
        }
        Ok(())
    }
}
