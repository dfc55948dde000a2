//! # IR Backend - Control flow analysis and stack-code lowering
//!
//! This module takes a routine-structured IR script and produces two things:
//! a control flow graph per routine (an analysis artifact) and a stream of
//! stack-machine operations for the whole script.
//!
//! ## Architecture
//!
//! ```text
//! Script (JSON/IR) ──┬─→ CFG Builder ──→ ControlFlowGraph per routine
//!                    └─→ Lowerer + ScopeStack ──→ TargetOp stream ──→ Verifier
//! ```
//!
//! The two branches share the IR model and nothing else.
//!
//! ## Usage
//!
//! ```
//! use irflow::compiler::{Backend, BackendOptions};
//! use irflow::compiler::ir::{Class, Instruction, Operand, Script};
//!
//! # fn main() -> irflow::Result<()> {
//! let root = Class::new("Main").with_body(vec![
//!     Instruction::copy("x", Operand::fixnum(42)),
//!     Instruction::ret(Operand::var("x")),
//! ]);
//! let script = Script::new("main.rb", root);
//!
//! let result = Backend::new(BackendOptions::default()).compile(&script)?;
//! assert_eq!(result.cfgs.len(), 1);
//! assert!(result.diagnostics.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod cfg;
pub mod ir;
pub mod lowering;
pub mod scope;
pub mod target;
pub mod verifier;

pub use cfg::{BasicBlock, BlockId, BlockIdGenerator, CfgBuilder, ControlFlowGraph};
pub use lowering::{Diagnostic, DiagnosticKind, Lowerer};
pub use scope::{ContainerScope, RoutineScope, ScopeStack};
pub use target::{MethodKind, Slot, TargetLabel, TargetOp, TargetSink};
pub use verifier::{ProgramStats, Verifier, VerifyError, VerifyResult};

use crate::{Error, Result};
use ir::Script;

/// Target code verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// Skip verification entirely
    Skip,
    /// Log verification failures but keep the output
    Warn,
    /// Fail compilation on any verification error
    #[default]
    Require,
}

/// Backend options
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Build a control flow graph for every routine
    pub build_cfg: bool,
    /// How to treat verification failures
    pub verification_mode: VerificationMode,
    /// First local slot handed out in every routine
    pub first_local_slot: u16,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            build_cfg: true,
            verification_mode: VerificationMode::Require,
            first_local_slot: 0,
        }
    }
}

/// Control flow graph of one routine, keyed by its qualified path
#[derive(Debug, Clone)]
pub struct RoutineCfg {
    /// `Class#method` style path
    pub path: String,
    /// The routine's graph
    pub cfg: ControlFlowGraph,
}

/// Compilation result with metadata
#[derive(Debug)]
pub struct CompileResult {
    /// Emitted target code for the whole script
    pub code: Vec<TargetOp>,
    /// One graph per routine, in lowering order (empty if disabled)
    pub cfgs: Vec<RoutineCfg>,
    /// Routines whose graph could not be built; they are still lowered
    pub cfg_errors: Vec<Error>,
    /// Non-fatal lowering problems
    pub diagnostics: Vec<Diagnostic>,
    /// Verification result (None when skipped)
    pub verification: Option<VerifyResult>,
}

impl CompileResult {
    /// Graph for a routine path, if one was built
    pub fn cfg_for(&self, path: &str) -> Option<&ControlFlowGraph> {
        self.cfgs.iter().find(|r| r.path == path).map(|r| &r.cfg)
    }
}

/// IR to stack-code backend
pub struct Backend {
    options: BackendOptions,
}

impl Backend {
    /// Create a new backend with options
    pub fn new(options: BackendOptions) -> Self {
        Self { options }
    }

    /// Options this backend was created with
    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    /// Compile a script
    pub fn compile(&self, script: &Script) -> Result<CompileResult> {
        // Phase 1: control flow graphs
        let (cfgs, cfg_errors) = if self.options.build_cfg {
            self.build_cfgs(script)
        } else {
            (Vec::new(), Vec::new())
        };

        // Phase 2: lowering
        let mut scopes = ScopeStack::with_first_slot(self.options.first_local_slot);
        let mut lowerer = Lowerer::new(Vec::new());
        lowerer.lower_script(&mut scopes, script)?;
        let (code, diagnostics) = lowerer.finish();

        tracing::debug!(
            file = %script.file_name,
            ops = code.len(),
            diagnostics = diagnostics.len(),
            "lowered script"
        );

        // Phase 3: verify
        let verification = self.verify(&code)?;

        Ok(CompileResult {
            code,
            cfgs,
            cfg_errors,
            diagnostics,
            verification,
        })
    }

    /// Build a graph for every routine in the script with one shared id counter
    ///
    /// A routine that fails does not stop the others; its error is returned
    /// alongside the graphs that were built.
    pub fn build_cfgs(&self, script: &Script) -> (Vec<RoutineCfg>, Vec<Error>) {
        let mut block_ids = BlockIdGenerator::new();
        let mut builder = CfgBuilder::new(&mut block_ids);
        let mut cfgs = Vec::new();
        let mut errors = Vec::new();

        for (path, method) in script.root.routines() {
            match builder.build_method(&path, &method) {
                Ok(cfg) => cfgs.push(RoutineCfg { path, cfg }),
                Err(err) => {
                    tracing::warn!(routine = %path, "CFG not built: {}", err);
                    errors.push(err);
                }
            }
        }

        (cfgs, errors)
    }

    fn verify(&self, code: &[TargetOp]) -> Result<Option<VerifyResult>> {
        if self.options.verification_mode == VerificationMode::Skip {
            return Ok(None);
        }

        let verification = Verifier::new().verify(code);
        for warning in &verification.warnings {
            tracing::warn!("{}", warning);
        }

        if !verification.valid {
            let error_msgs: Vec<String> =
                verification.errors.iter().map(|e| e.to_string()).collect();
            match self.options.verification_mode {
                VerificationMode::Require => {
                    return Err(Error::VerificationFailed(error_msgs.join("; ")));
                }
                _ => {
                    for msg in &error_msgs {
                        tracing::warn!("verification: {}", msg);
                    }
                }
            }
        }

        Ok(Some(verification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ir::{Class, Instruction, Label, Method, Operand};

    fn looping_script() -> Script {
        let body = vec![
            Instruction::copy("i", Operand::fixnum(0)),
            Instruction::label(Label(0)),
            Instruction::branch(Operand::var("i"), Operand::fixnum(10), Label(1)),
            Instruction::call(Some("i"), "succ", vec![Operand::var("i")]),
            Instruction::jump(Label(0)),
            Instruction::label(Label(1)),
            Instruction::ret(Operand::var("i")),
        ];
        Script::new("loop.rb", Class::new("Main").with_method(Method::new("count", body)))
    }

    #[test]
    fn test_compile_builds_cfg_per_routine() {
        let result = Backend::new(BackendOptions::default())
            .compile(&looping_script())
            .unwrap();

        assert_eq!(result.cfgs.len(), 2);
        assert!(result.cfg_for("Main#__class__").is_some());
        let cfg = result.cfg_for("Main#count").unwrap();
        let head = cfg.block_for_label(Label(0)).unwrap();
        assert!(cfg.is_loop_header(head));

        let verification = result.verification.unwrap();
        assert!(verification.valid, "Errors: {:?}", verification.errors);
        assert_eq!(verification.stats.method_count, 2);
    }

    #[test]
    fn test_options_disable_cfg_and_verification() {
        let options = BackendOptions {
            build_cfg: false,
            verification_mode: VerificationMode::Skip,
            ..BackendOptions::default()
        };
        let result = Backend::new(options).compile(&looping_script()).unwrap();
        assert!(result.cfgs.is_empty());
        assert!(result.verification.is_none());
        assert!(!result.code.is_empty());
    }

    #[test]
    fn test_unresolved_label_is_reported_per_routine() {
        let script = Script::new(
            "bad.rb",
            Class::new("Main")
                .with_body(vec![Instruction::jump(Label(7))])
                .with_method(Method::new("ok", vec![Instruction::ret(Operand::fixnum(1))])),
        );
        let options = BackendOptions {
            verification_mode: VerificationMode::Skip,
            ..BackendOptions::default()
        };
        let result = Backend::new(options).compile(&script).unwrap();

        assert_eq!(
            result.cfg_errors,
            vec![Error::UnresolvedLabels {
                routine: "Main#__class__".into(),
                labels: vec!["L7".into()],
            }]
        );
        assert!(result.cfg_for("Main#__class__").is_none());
        assert!(result.cfg_for("Main#ok").is_some());
        assert!(!result.code.is_empty());
    }
}
