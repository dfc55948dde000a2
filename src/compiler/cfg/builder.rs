//! # Single-pass CFG construction
//!
//! Partitions a routine's linear instruction stream into basic blocks and
//! wires edges in one walk. Jumps to labels not seen yet are queued as
//! forward references and resolved when the label's block is created.
//!
//! Edge rules:
//! - a label always starts a block; it gets a fallthrough edge from the
//!   previous block unless that block ended with an unconditional jump
//! - a branch keeps its fallthrough edge in addition to the branch edge
//! - the instruction after any block-ending instruction opens an implicit
//!   block under a freshly generated label, with a fallthrough edge unless
//!   the ended block closed with an unconditional jump
//! - the last block falls into the exit sentinel unless it ended with a jump
//!
//! Each label names exactly one block. Generated labels are drawn past every
//! label the stream uses, and a label placed twice is an error.

use super::block::{BasicBlock, BlockIdGenerator};
use super::graph::{BlockIndex, ControlFlowGraph};
use crate::compiler::ir::{Instruction, Label, LabelGenerator, Method};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Builds control flow graphs, drawing block ids from a shared generator
pub struct CfgBuilder<'a> {
    block_ids: &'a mut BlockIdGenerator,
}

impl<'a> CfgBuilder<'a> {
    /// Create a builder that numbers blocks from `block_ids`
    pub fn new(block_ids: &'a mut BlockIdGenerator) -> Self {
        Self { block_ids }
    }

    /// Build the CFG of a method using the method's own label generator
    pub fn build_method(&mut self, routine: &str, method: &Method) -> Result<ControlFlowGraph> {
        let mut labels = method.label_generator();
        self.build(routine, &method.instrs, &mut labels)
    }

    /// Build the CFG for `instrs`; `labels` supplies labels for the sentinels
    /// and for implicit block boundaries, and is first moved past every label
    /// `instrs` uses
    pub fn build(
        &mut self,
        routine: &str,
        instrs: &[Instruction],
        labels: &mut LabelGenerator,
    ) -> Result<ControlFlowGraph> {
        labels.skip_past(instrs);
        let entry = self.new_block(labels.new_label()?);
        let exit = self.new_block(labels.new_label()?);
        let mut cfg = ControlFlowGraph::with_sentinels(routine, entry, exit);

        // Blocks waiting for an edge to the block of a label not seen yet
        let mut forward_refs: BTreeMap<Label, Vec<BlockIndex>> = BTreeMap::new();

        let mut current = cfg.entry();
        // The entry sentinel holds no instructions, so treat it as already ended
        let mut bb_ended = true;
        let mut bb_ended_with_jump = false;

        for instr in instrs {
            if let Instruction::Label { label } = instr {
                if cfg.block_for_label(*label).is_some() {
                    return Err(Error::DuplicateLabel {
                        routine: routine.to_string(),
                        label: label.to_string(),
                    });
                }
                let next = cfg.add_block(self.new_block(*label));
                // Jump-ended blocks don't fall into the next block
                if !bb_ended_with_jump {
                    cfg.add_edge(current, next);
                }
                current = next;

                if let Some(readers) = forward_refs.remove(label) {
                    for reader in readers {
                        cfg.add_edge(reader, next);
                    }
                }

                tracing::trace!(routine, block = next, %label, "labeled block");
                bb_ended = false;
                bb_ended_with_jump = false;
                continue;
            }

            if bb_ended {
                let next = cfg.add_block(self.new_block(labels.new_label()?));
                if !bb_ended_with_jump {
                    cfg.add_edge(current, next);
                }
                current = next;

                tracing::trace!(routine, block = next, "implicit block");
                bb_ended = false;
                bb_ended_with_jump = false;
            }

            if let Some(block) = cfg.block_mut(current) {
                block.add_instr(instr.clone());
            }

            if instr.ends_basic_block() {
                if let Some(target) = instr.jump_target() {
                    match cfg.block_for_label(target) {
                        Some(target_block) => {
                            cfg.add_edge(current, target_block);
                        }
                        None => forward_refs.entry(target).or_default().push(current),
                    }
                }
                bb_ended = true;
                if instr.is_unconditional_jump() {
                    bb_ended_with_jump = true;
                }
            }
        }

        if !bb_ended_with_jump {
            let exit = cfg.exit();
            cfg.add_edge(current, exit);
        }

        if !forward_refs.is_empty() {
            return Err(Error::UnresolvedLabels {
                routine: routine.to_string(),
                labels: forward_refs.keys().map(|l| l.to_string()).collect(),
            });
        }

        tracing::debug!(
            routine,
            blocks = cfg.block_count(),
            edges = cfg.edge_count(),
            "built CFG"
        );
        Ok(cfg)
    }

    fn new_block(&mut self, label: Label) -> BasicBlock {
        BasicBlock::new(self.block_ids.next_id(), label)
    }
}
