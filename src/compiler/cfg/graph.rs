//! # Control Flow Graph storage
//!
//! Blocks live in an arena indexed by position; edges are adjacency lists
//! of arena indices. Index 0 is the entry sentinel and index 1 the exit
//! sentinel; real blocks follow in program order.

use super::block::BasicBlock;
use crate::compiler::ir::Label;
use std::collections::{HashMap, HashSet};

/// Position of a block in its graph's arena
pub type BlockIndex = usize;

/// Control Flow Graph of one routine
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    /// Routine this graph was built for
    routine: String,
    /// Blocks indexed by arena position
    blocks: Vec<BasicBlock>,
    /// Outgoing edges per block, in insertion order
    successors: Vec<Vec<BlockIndex>>,
    /// Incoming edges per block, in insertion order
    predecessors: Vec<Vec<BlockIndex>>,
    /// Map from entry label to block
    label_to_block: HashMap<Label, BlockIndex>,
    entry: BlockIndex,
    exit: BlockIndex,
}

impl ControlFlowGraph {
    /// Create a graph holding only the entry and exit sentinels
    pub(crate) fn with_sentinels(
        routine: impl Into<String>,
        entry: BasicBlock,
        exit: BasicBlock,
    ) -> Self {
        let mut cfg = ControlFlowGraph {
            routine: routine.into(),
            blocks: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            label_to_block: HashMap::new(),
            entry: 0,
            exit: 1,
        };
        cfg.entry = cfg.add_block(entry);
        cfg.exit = cfg.add_block(exit);
        cfg
    }

    /// Add a block node and register its label, which must not already name a block
    pub(crate) fn add_block(&mut self, block: BasicBlock) -> BlockIndex {
        let idx = self.blocks.len();
        self.label_to_block.insert(block.label, idx);
        self.blocks.push(block);
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        idx
    }

    /// Add an edge between blocks; returns false if it already existed
    pub(crate) fn add_edge(&mut self, from: BlockIndex, to: BlockIndex) -> bool {
        if from >= self.blocks.len() || to >= self.blocks.len() {
            debug_assert!(false, "edge {} -> {} with missing endpoint", from, to);
            return false;
        }
        if self.successors[from].contains(&to) {
            return false;
        }
        self.successors[from].push(to);
        self.predecessors[to].push(from);
        true
    }

    pub(crate) fn block_mut(&mut self, idx: BlockIndex) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(idx)
    }

    /// Routine this graph belongs to
    pub fn routine(&self) -> &str {
        &self.routine
    }

    /// Entry sentinel index
    pub fn entry(&self) -> BlockIndex {
        self.entry
    }

    /// Exit sentinel index
    pub fn exit(&self) -> BlockIndex {
        self.exit
    }

    /// Get block by arena index
    pub fn block(&self, idx: BlockIndex) -> Option<&BasicBlock> {
        self.blocks.get(idx)
    }

    /// All blocks, sentinels first, then program order
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Number of blocks including the two sentinels
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block whose entry label is `label`
    pub fn block_for_label(&self, label: Label) -> Option<BlockIndex> {
        self.label_to_block.get(&label).copied()
    }

    /// Successor indices of a block
    pub fn successors(&self, idx: BlockIndex) -> &[BlockIndex] {
        self.successors.get(idx).map_or(&[], |s| s.as_slice())
    }

    /// Predecessor indices of a block
    pub fn predecessors(&self, idx: BlockIndex) -> &[BlockIndex] {
        self.predecessors.get(idx).map_or(&[], |p| p.as_slice())
    }

    /// Iterate all edges as `(from, to)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (BlockIndex, BlockIndex)> + '_ {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(from, succs)| succs.iter().map(move |&to| (from, to)))
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    /// True if `from -> to` is an edge
    pub fn has_edge(&self, from: BlockIndex, to: BlockIndex) -> bool {
        self.successors(from).contains(&to)
    }

    /// Blocks reachable from the entry sentinel
    pub fn reachable_from_entry(&self) -> HashSet<BlockIndex> {
        let mut visited: HashSet<BlockIndex> = HashSet::new();
        let mut stack = vec![self.entry];

        while let Some(idx) = stack.pop() {
            if !visited.insert(idx) {
                continue;
            }
            stack.extend(self.successors(idx).iter().copied());
        }

        visited
    }

    /// Reachable blocks in reverse postorder from the entry
    pub fn reverse_postorder(&self) -> Vec<BlockIndex> {
        let mut visited: HashSet<BlockIndex> = HashSet::new();
        let mut order: Vec<BlockIndex> = Vec::new();

        // Explicit stack of (block, next successor to visit)
        let mut stack: Vec<(BlockIndex, usize)> = vec![(self.entry, 0)];
        visited.insert(self.entry);

        while let Some(top) = stack.last_mut() {
            let (idx, next) = *top;
            match self.successors(idx).get(next) {
                Some(&succ) => {
                    top.1 += 1;
                    if visited.insert(succ) {
                        stack.push((succ, 0));
                    }
                }
                None => {
                    stack.pop();
                    order.push(idx);
                }
            }
        }

        order.reverse();
        order
    }

    /// Check if this is a loop header
    pub fn is_loop_header(&self, idx: BlockIndex) -> bool {
        // Arena order is program order, so an edge from a later block is a back edge
        self.predecessors(idx)
            .iter()
            .any(|&pred| pred >= idx && pred != self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::cfg::block::{BlockId, BasicBlock};

    fn graph_with(n: usize) -> ControlFlowGraph {
        let mut cfg = ControlFlowGraph::with_sentinels(
            "t",
            BasicBlock::new(BlockId(1), Label(100)),
            BasicBlock::new(BlockId(2), Label(101)),
        );
        for i in 0..n {
            cfg.add_block(BasicBlock::new(BlockId(3 + i as u32), Label(i as u32)));
        }
        cfg
    }

    #[test]
    fn test_sentinels() {
        let cfg = graph_with(0);
        assert_eq!(cfg.entry(), 0);
        assert_eq!(cfg.exit(), 1);
        assert_eq!(cfg.block_count(), 2);
        assert_eq!(cfg.block_for_label(Label(101)), Some(1));
        assert_eq!(cfg.edge_count(), 0);
    }

    #[test]
    fn test_edges_deduplicated() {
        let mut cfg = graph_with(1);
        assert!(cfg.add_edge(0, 2));
        assert!(!cfg.add_edge(0, 2));
        assert_eq!(cfg.edge_count(), 1);
        assert_eq!(cfg.predecessors(2), &[0]);
        assert_eq!(cfg.edges().collect::<Vec<_>>(), vec![(0, 2)]);
    }

    #[test]
    fn test_reverse_postorder_and_loops() {
        let mut cfg = graph_with(2);
        cfg.add_edge(0, 2);
        cfg.add_edge(2, 3);
        cfg.add_edge(3, 2);
        cfg.add_edge(3, 1);

        assert_eq!(cfg.reverse_postorder(), vec![0, 2, 3, 1]);
        assert!(cfg.is_loop_header(2));
        assert!(!cfg.is_loop_header(3));
        assert_eq!(cfg.reachable_from_entry().len(), 4);
    }

    #[test]
    fn test_reverse_postorder_long_chain() {
        let n = 100_000;
        let mut cfg = graph_with(n);
        cfg.add_edge(0, 2);
        for idx in 2..n + 1 {
            cfg.add_edge(idx, idx + 1);
        }
        cfg.add_edge(n + 1, 1);

        let order = cfg.reverse_postorder();
        assert_eq!(order.len(), n + 2);
        assert_eq!(order[0], 0);
        assert_eq!(order[1], 2);
        assert_eq!(order[n], n + 1);
        assert_eq!(order[n + 1], 1);
    }
}
