//! # Target Code Verifier
//!
//! Validates lowered stack-machine code before it is handed to an encoder.
//! Checks class/method bracketing, branch targets and operand-stack
//! discipline. Lowered IR statements are stack-neutral, so a linear walk
//! per method is enough to track stack depth.

use super::target::{TargetLabel, TargetOp};
use std::collections::HashSet;

/// Verification result with warnings
#[derive(Debug)]
pub struct VerifyResult {
    /// Code is structurally valid
    pub valid: bool,
    /// Errors that make the code unusable
    pub errors: Vec<VerifyError>,
    /// Warnings (non-fatal)
    pub warnings: Vec<String>,
    /// Statistics
    pub stats: ProgramStats,
}

/// Program statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProgramStats {
    /// Total operation count
    pub op_count: usize,
    /// Classes opened
    pub class_count: usize,
    /// Methods opened
    pub method_count: usize,
    /// Fields declared
    pub field_count: usize,
    /// Deepest operand stack seen in any method
    pub max_stack_depth: usize,
    /// One past the highest local slot touched in any method
    pub max_locals: usize,
}

/// Verification error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Program exceeds the operation limit.
    TooManyOps {
        /// Actual operation count
        count: usize,
        /// Maximum allowed operations
        limit: usize,
    },

    /// `EndClass` or `EndMethod` with nothing matching open.
    UnmatchedEnd {
        /// Index of the offending op
        offset: usize,
        /// "class" or "method"
        what: &'static str,
    },

    /// Scopes still open when the code ends.
    UnclosedScopes {
        /// Open classes
        classes: usize,
        /// Open methods
        methods: usize,
    },

    /// Method or field declared with no class open.
    OutsideClass {
        /// Index of the offending op
        offset: usize,
    },

    /// Code op with no method open in the innermost class.
    OutsideMethod {
        /// Index of the offending op
        offset: usize,
    },

    /// Branch to a label never placed in the same method.
    UndefinedLabel {
        /// Method containing the branch
        method: String,
        /// Missing label
        label: TargetLabel,
    },

    /// Label placed twice in one method.
    DuplicateLabel {
        /// Index of the second placement
        offset: usize,
        /// Label placed twice
        label: TargetLabel,
    },

    /// Operation pops more values than the stack holds.
    StackUnderflow {
        /// Index of the offending op
        offset: usize,
        /// Method containing it
        method: String,
    },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::TooManyOps { count, limit } => {
                write!(f, "Too many operations: {} (limit: {})", count, limit)
            }
            VerifyError::UnmatchedEnd { offset, what } => {
                write!(f, "Unmatched end of {} at op {}", what, offset)
            }
            VerifyError::UnclosedScopes { classes, methods } => {
                write!(
                    f,
                    "Code ends with {} class(es) and {} method(s) still open",
                    classes, methods
                )
            }
            VerifyError::OutsideClass { offset } => {
                write!(f, "Declaration outside of any class at op {}", offset)
            }
            VerifyError::OutsideMethod { offset } => {
                write!(f, "Code outside of any method at op {}", offset)
            }
            VerifyError::UndefinedLabel { method, label } => {
                write!(f, "Branch to undefined label {} in method {}", label, method)
            }
            VerifyError::DuplicateLabel { offset, label } => {
                write!(f, "Label {} placed twice (op {})", label, offset)
            }
            VerifyError::StackUnderflow { offset, method } => {
                write!(f, "Operand stack underflow at op {} in method {}", offset, method)
            }
        }
    }
}

struct MethodFrame {
    name: String,
    depth: usize,
    marked: HashSet<TargetLabel>,
    referenced: Vec<TargetLabel>,
}

struct ClassFrame {
    fields: HashSet<String>,
    methods: Vec<MethodFrame>,
}

/// Target code verifier
pub struct Verifier {
    /// Maximum allowed operations
    max_ops: usize,
    /// Strict mode (treat warnings as errors)
    strict: bool,
}

impl Verifier {
    /// Creates a new verifier.
    ///
    /// Defaults:
    /// - `max_ops`: `usize::MAX` (no limit)
    /// - `strict`: `false` (warnings don't fail verification)
    pub fn new() -> Self {
        Self {
            max_ops: usize::MAX,
            strict: false,
        }
    }

    /// Enable strict mode
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Set custom operation limit
    pub fn max_ops(mut self, limit: usize) -> Self {
        self.max_ops = limit;
        self
    }

    /// Verify emitted code
    pub fn verify(&self, code: &[TargetOp]) -> VerifyResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut stats = ProgramStats {
            op_count: code.len(),
            ..ProgramStats::default()
        };

        if stats.op_count > self.max_ops {
            errors.push(VerifyError::TooManyOps {
                count: stats.op_count,
                limit: self.max_ops,
            });
        }

        let mut classes: Vec<ClassFrame> = Vec::new();

        for (offset, op) in code.iter().enumerate() {
            match op {
                TargetOp::BeginClass { .. } => {
                    stats.class_count += 1;
                    classes.push(ClassFrame {
                        fields: HashSet::new(),
                        methods: Vec::new(),
                    });
                }

                TargetOp::EndClass => match classes.last() {
                    Some(class) if class.methods.is_empty() => {
                        classes.pop();
                    }
                    _ => errors.push(VerifyError::UnmatchedEnd {
                        offset,
                        what: "class",
                    }),
                },

                TargetOp::DeclareField { name } => match classes.last_mut() {
                    Some(class) => {
                        if class.fields.insert(name.clone()) {
                            stats.field_count += 1;
                        } else {
                            warnings.push(format!("Field {} declared more than once", name));
                        }
                    }
                    None => errors.push(VerifyError::OutsideClass { offset }),
                },

                TargetOp::BeginMethod { name, .. } => match classes.last_mut() {
                    Some(class) => {
                        stats.method_count += 1;
                        class.methods.push(MethodFrame {
                            name: name.clone(),
                            depth: 0,
                            marked: HashSet::new(),
                            referenced: Vec::new(),
                        });
                    }
                    None => errors.push(VerifyError::OutsideClass { offset }),
                },

                TargetOp::EndMethod => {
                    match classes.last_mut().and_then(|class| class.methods.pop()) {
                        Some(frame) => Self::close_method(frame, &mut errors, &mut warnings),
                        None => errors.push(VerifyError::UnmatchedEnd {
                            offset,
                            what: "method",
                        }),
                    }
                }

                _ => {
                    let Some(frame) = classes.last_mut().and_then(|class| class.methods.last_mut())
                    else {
                        errors.push(VerifyError::OutsideMethod { offset });
                        continue;
                    };

                    match op {
                        TargetOp::Mark(label) => {
                            if !frame.marked.insert(*label) {
                                errors.push(VerifyError::DuplicateLabel {
                                    offset,
                                    label: *label,
                                });
                            }
                        }
                        TargetOp::Load(slot) | TargetOp::Store(slot) => {
                            stats.max_locals = stats.max_locals.max(slot.0 as usize + 1);
                        }
                        _ => {}
                    }
                    if let Some(target) = op.branch_target() {
                        frame.referenced.push(target);
                    }

                    let (pops, pushes) = op.stack_effect();
                    if frame.depth < pops {
                        errors.push(VerifyError::StackUnderflow {
                            offset,
                            method: frame.name.clone(),
                        });
                        frame.depth = 0;
                    } else {
                        frame.depth -= pops;
                    }
                    frame.depth += pushes;
                    stats.max_stack_depth = stats.max_stack_depth.max(frame.depth);
                }
            }
        }

        let open_methods: usize = classes.iter().map(|class| class.methods.len()).sum();
        if !classes.is_empty() {
            errors.push(VerifyError::UnclosedScopes {
                classes: classes.len(),
                methods: open_methods,
            });
        }

        let valid = errors.is_empty() && (!self.strict || warnings.is_empty());

        VerifyResult {
            valid,
            errors,
            warnings,
            stats,
        }
    }

    fn close_method(frame: MethodFrame, errors: &mut Vec<VerifyError>, warnings: &mut Vec<String>) {
        let mut missing: Vec<TargetLabel> = frame
            .referenced
            .iter()
            .filter(|label| !frame.marked.contains(label))
            .copied()
            .collect();
        missing.sort();
        missing.dedup();
        for label in missing {
            errors.push(VerifyError::UndefinedLabel {
                method: frame.name.clone(),
                label,
            });
        }

        if frame.depth != 0 {
            warnings.push(format!(
                "Method {} leaves {} value(s) on the operand stack",
                frame.name, frame.depth
            ));
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::Constant;
    use crate::compiler::target::{MethodKind, Slot};

    fn method(body: Vec<TargetOp>) -> Vec<TargetOp> {
        let mut code = vec![
            TargetOp::BeginClass {
                name: "C".into(),
                source: "t.rb".into(),
            },
            TargetOp::BeginMethod {
                name: "m".into(),
                kind: MethodKind::Static,
            },
        ];
        code.extend(body);
        code.push(TargetOp::EndMethod);
        code.push(TargetOp::EndClass);
        code
    }

    #[test]
    fn test_empty_program() {
        let result = Verifier::new().verify(&[]);
        assert!(result.valid);
        assert_eq!(result.stats.op_count, 0);
    }

    #[test]
    fn test_simple_valid_program() {
        let code = method(vec![
            TargetOp::Push(Constant::Fixnum(42)),
            TargetOp::Store(Slot(3)),
            TargetOp::Load(Slot(3)),
            TargetOp::ReturnValue,
        ]);
        let result = Verifier::new().verify(&code);
        assert!(result.valid, "Errors: {:?}", result.errors);
        assert_eq!(result.stats.max_stack_depth, 1);
        assert_eq!(result.stats.max_locals, 4);
        assert_eq!(result.stats.method_count, 1);
    }

    #[test]
    fn test_undefined_label() {
        let code = method(vec![TargetOp::Goto(TargetLabel(2))]);
        let result = Verifier::new().verify(&code);
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![VerifyError::UndefinedLabel {
                method: "m".into(),
                label: TargetLabel(2)
            }]
        );
    }

    #[test]
    fn test_stack_underflow() {
        let code = method(vec![TargetOp::Store(Slot(0))]);
        let result = Verifier::new().verify(&code);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, VerifyError::StackUnderflow { offset: 2, .. })));
    }

    #[test]
    fn test_code_outside_method_and_unclosed() {
        let code = vec![
            TargetOp::Pop,
            TargetOp::BeginClass {
                name: "C".into(),
                source: String::new(),
            },
        ];
        let result = Verifier::new().verify(&code);
        assert_eq!(
            result.errors,
            vec![
                VerifyError::OutsideMethod { offset: 0 },
                VerifyError::UnclosedScopes {
                    classes: 1,
                    methods: 0
                },
            ]
        );
    }

    #[test]
    fn test_leftover_stack_is_warning() {
        let code = method(vec![TargetOp::Push(Constant::Nil)]);
        let result = Verifier::new().verify(&code);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(!Verifier::new().strict().verify(&code).valid);
    }
}
