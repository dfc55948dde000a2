//! Basic blocks and the block-id generator

use crate::compiler::ir::{Instruction, Label};
use std::fmt;

/// Block identity, unique across every CFG built with one [`BlockIdGenerator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic block-id counter shared by all builds in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIdGenerator {
    next: u32,
}

impl BlockIdGenerator {
    /// Create a generator whose first id is 1
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Issue the next block id
    pub fn next_id(&mut self) -> BlockId {
        let id = BlockId(self.next);
        self.next += 1;
        id
    }

    /// Id the next block will get
    pub fn peek(&self) -> BlockId {
        BlockId(self.next)
    }
}

impl Default for BlockIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Straight-line run of non-label instructions with a single entry label
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Unique block ID
    pub id: BlockId,
    /// Entry label (source label or one generated for an implicit boundary)
    pub label: Label,
    /// Instructions in this block, never including label markers
    pub instrs: Vec<Instruction>,
    /// Cleared by later passes that prove the block unreachable
    pub live: bool,
}

impl BasicBlock {
    /// Create an empty, live block
    pub fn new(id: BlockId, label: Label) -> Self {
        Self {
            id,
            label,
            instrs: Vec::new(),
            live: true,
        }
    }

    /// Append an instruction
    pub fn add_instr(&mut self, instr: Instruction) {
        debug_assert!(!instr.starts_basic_block(), "label inside block {}", self);
        self.instrs.push(instr);
    }

    /// Prepend an instruction
    pub fn insert_instr(&mut self, instr: Instruction) {
        debug_assert!(!instr.starts_basic_block(), "label inside block {}", self);
        self.instrs.insert(0, instr);
    }

    /// Last instruction, if any
    pub fn last_instr(&self) -> Option<&Instruction> {
        self.instrs.last()
    }

    /// True when the block holds no instructions
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BB<{},{}>", self.id, self.label)
    }
}
