//! # Intermediate Representation (IR) consumed by the backend
//!
//! The front-end hands the backend a linear instruction stream per routine,
//! nested inside class definitions. Both the CFG builder and the lowering
//! dispatcher read this model; neither mutates it.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── label.rs        # Label, LabelGenerator
//! ├── instruction.rs  # Instruction, InstrKind, Operand, Constant, Variable, FieldRef
//! └── program.rs      # Method, Class, Script
//! ```
//!
//! ## Key Types
//!
//! - [`Instruction`] - Closed set of instruction kinds (labels, jumps, branches, calls, ...)
//! - [`Operand`] - Constant, variable, field or label reference
//! - [`LabelGenerator`] - Per-routine source of fresh labels
//! - [`Script`] - Compilation unit; decodes from JSON via serde

mod instruction;
mod label;
mod program;

pub use instruction::{Constant, FieldRef, InstrKind, Instruction, Operand, Variable};
pub use label::{Label, LabelGenerator};
pub use program::{Class, Method, Script, CLASS_BODY_ROUTINE};
