//! # irflow - Control Flow and Lowering for Routine-Structured IR
//!
//! [![Crates.io](https://img.shields.io/crates/v/irflow.svg)](https://crates.io/crates/irflow)
//! [![Documentation](https://docs.rs/irflow/badge.svg)](https://docs.rs/irflow)
//! [![License: MIT](https://img.shields.io/badge/License-MIT-yellow.svg)](https://opensource.org/licenses/MIT)
//!
//! A compiler backend core for a dynamic, class-based language. It consumes a
//! linear IR of labelled instructions grouped into methods and classes, and
//! produces:
//!
//! - a **control flow graph** per routine (basic blocks, fallthrough and
//!   jump/branch edges, entry and exit sentinels), and
//! - a stream of **stack-machine operations** for the whole script, with
//!   local slots and target labels allocated per method.
//!
//! ## Quick Start
//!
//! ```rust
//! use irflow::compiler::{Backend, BackendOptions, TargetOp};
//! use irflow::compiler::ir::Script;
//!
//! # fn main() -> irflow::Result<()> {
//! let json = r#"{
//!   "file_name": "hello.rb",
//!   "root": {
//!     "name": "Main",
//!     "instrs": [
//!       { "op": "copy", "result": "x", "source": { "kind": "constant", "value": { "type": "fixnum", "value": 1 } } },
//!       { "op": "call", "result": null, "method": "puts", "args": [ { "kind": "variable", "value": "x" } ] }
//!     ]
//!   }
//! }"#;
//!
//! let script = Script::from_json(json)?;
//! let result = Backend::new(BackendOptions::default()).compile(&script)?;
//!
//! assert!(result.code.contains(&TargetOp::Pop));
//! assert_eq!(result.cfgs[0].path, "Main#__class__");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │  IR (JSON)   │ ──> │ CFG Builder  │ ──> │ ControlFlowGraph │
//! └──────────────┘     └──────────────┘     └──────────────────┘
//!        │
//!        │             ┌──────────────┐     ┌──────────────────┐
//!        └───────────> │   Lowerer    │ ──> │  TargetOp stream │ ──> Verifier
//!                      │ + ScopeStack │     └──────────────────┘
//!                      └──────────────┘
//! ```
//!
//! ### Main Components
//!
//! - **IR model** ([`compiler::ir`]) - instructions, operands, labels, classes
//! - **CFG** ([`compiler::cfg`]) - basic blocks and single-pass partitioning
//! - **Scopes** ([`compiler::scope`]) - class/method scopes with slot and label maps
//! - **Lowering** ([`compiler::lowering`]) - per-instruction emission with diagnostics
//! - **Verifier** ([`compiler::verifier`]) - structural checks on emitted code
//!
//! ## Error Handling
//!
//! Malformed control flow and scope misuse are [`Error`]s. Instruction kinds
//! without a lowering rule are not: they become
//! [`Diagnostic`](compiler::Diagnostic)s, are logged through `tracing`, and
//! lowering continues. A routine whose CFG cannot be built is listed in
//! `CompileResult::cfg_errors` without stopping the other routines.
//!
//! ```rust
//! use irflow::{Error, ErrorSeverity};
//!
//! let err = Error::NoActiveContainer;
//! assert_eq!(err.classify(), ErrorSeverity::Fatal);
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber. Enable
//! `debug` for per-routine summaries and `trace` for per-block detail.

#![warn(missing_docs)]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;

// Re-export main types
pub use compiler::{Backend, BackendOptions, CompileResult, VerificationMode};
pub use error::{Error, ErrorSeverity, Result};
