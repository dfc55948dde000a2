//! Symbolic labels and the per-routine label generator

use super::instruction::Instruction;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic jump target, unique within the routine that generated it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub u32);

impl Label {
    /// Creates a label with the given ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Issues fresh labels for one routine in creation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelGenerator {
    // Wider than `Label` so `L{u32::MAX}` can be issued and exhaustion detected
    next: u64,
}

impl LabelGenerator {
    /// Create a generator whose first label is `L0`
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Create a generator that never collides with labels already used in `instrs`
    pub fn resume_after(instrs: &[Instruction]) -> Self {
        Self {
            next: first_unused(instrs),
        }
    }

    /// Move past every label used in `instrs`; never moves backwards
    pub fn skip_past(&mut self, instrs: &[Instruction]) {
        self.next = self.next.max(first_unused(instrs));
    }

    /// Issue the next label
    pub fn new_label(&mut self) -> Result<Label> {
        let label = u32::try_from(self.next)
            .map(Label)
            .map_err(|_| Error::LabelSpaceExhausted)?;
        self.next += 1;
        Ok(label)
    }

    /// Number of labels issued (or skipped over) so far
    pub fn issued(&self) -> u64 {
        self.next
    }
}

fn first_unused(instrs: &[Instruction]) -> u64 {
    instrs
        .iter()
        .flat_map(|instr| instr.labels())
        .map(|label| u64::from(label.0) + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::Operand;

    #[test]
    fn test_labels_are_sequential() {
        let mut gen = LabelGenerator::new();
        let a = gen.new_label().unwrap();
        let b = gen.new_label().unwrap();
        assert_eq!(a, Label(0));
        assert_eq!(b, Label(1));
        assert!(a < b);
        assert_eq!(gen.issued(), 2);
    }

    #[test]
    fn test_resume_after_skips_used_labels() {
        let instrs = vec![
            Instruction::label(Label(4)),
            Instruction::branch(Operand::var("x"), Operand::fixnum(0), Label(9)),
            Instruction::jump(Label(2)),
        ];
        let mut gen = LabelGenerator::resume_after(&instrs);
        assert_eq!(gen.new_label().unwrap(), Label(10));
    }

    #[test]
    fn test_skip_past_only_moves_forward() {
        let mut gen = LabelGenerator::new();
        gen.skip_past(&[Instruction::label(Label(5))]);
        assert_eq!(gen.new_label().unwrap(), Label(6));

        gen.skip_past(&[Instruction::label(Label(2))]);
        assert_eq!(gen.new_label().unwrap(), Label(7));
    }

    #[test]
    fn test_highest_label_exhausts_generator() {
        let mut gen = LabelGenerator::resume_after(&[Instruction::jump(Label(u32::MAX - 1))]);
        assert_eq!(gen.new_label().unwrap(), Label(u32::MAX));
        assert_eq!(gen.new_label(), Err(Error::LabelSpaceExhausted));

        let mut gen = LabelGenerator::resume_after(&[Instruction::label(Label(u32::MAX))]);
        assert_eq!(gen.issued(), 1 << 32);
        assert_eq!(gen.new_label(), Err(Error::LabelSpaceExhausted));
    }

    #[test]
    fn test_display() {
        assert_eq!(Label(12).to_string(), "L12");
    }
}
