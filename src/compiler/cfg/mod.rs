//! # Control Flow Graph
//!
//! Basic-block partitioning and edge construction over a routine's IR.
//! The graph is an analysis artifact for later passes; lowering walks the
//! instruction stream directly and does not depend on it.
//!
//! ## Usage
//!
//! ```
//! use irflow::compiler::cfg::{BlockIdGenerator, CfgBuilder};
//! use irflow::compiler::ir::{Instruction, Label, Method, Operand};
//!
//! # fn main() -> irflow::Result<()> {
//! let method = Method::new(
//!     "loop",
//!     vec![
//!         Instruction::label(Label(0)),
//!         Instruction::copy("i", Operand::fixnum(1)),
//!         Instruction::jump(Label(0)),
//!     ],
//! );
//!
//! let mut block_ids = BlockIdGenerator::new();
//! let cfg = CfgBuilder::new(&mut block_ids).build_method("loop", &method)?;
//! let head = cfg.block_for_label(Label(0)).unwrap();
//! assert!(cfg.is_loop_header(head));
//! # Ok(())
//! # }
//! ```

mod block;
mod builder;
mod graph;

pub use block::{BasicBlock, BlockId, BlockIdGenerator};
pub use builder::CfgBuilder;
pub use graph::{BlockIndex, ControlFlowGraph};
