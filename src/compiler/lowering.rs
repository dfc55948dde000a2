//! # Instruction lowering
//!
//! Walks each routine's instruction stream in program order and emits
//! stack-machine operations, resolving variables to slots and IR labels to
//! target labels through the [`ScopeStack`]. Class and method definitions
//! lower their bodies recursively inside fresh scopes.
//!
//! Instruction kinds without a lowering rule are skipped and reported as a
//! [`Diagnostic`]; lowering carries on with the next instruction.

use super::ir::{Class, InstrKind, Instruction, Operand, Script, CLASS_BODY_ROUTINE};
use super::scope::ScopeStack;
use super::target::{MethodKind, TargetOp, TargetSink};
use crate::{Error, Result};
use std::fmt;

/// What a diagnostic is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// No lowering rule exists for this instruction kind
    UnsupportedInstruction(InstrKind),
    /// Operand kind cannot be evaluated as a value
    UnsupportedOperand(&'static str),
}

/// Non-fatal problem found while lowering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What went wrong
    pub kind: DiagnosticKind,
    /// Qualified path of the routine being lowered, as in the CFG paths:
    /// `Outer::Inner#method`, or `Owner.method` for class methods
    pub routine: String,
    /// Index of the offending instruction in its routine
    pub index: usize,
    /// The offending instruction, rendered
    pub instr: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnsupportedInstruction(kind) => write!(
                f,
                "{}[{}]: unsupported instruction {} ({})",
                self.routine, self.index, kind, self.instr
            ),
            DiagnosticKind::UnsupportedOperand(kind) => write!(
                f,
                "{}[{}]: cannot evaluate {} operand in {}",
                self.routine, self.index, kind, self.instr
            ),
        }
    }
}

/// Lowers IR into a [`TargetSink`]
pub struct Lowerer<S: TargetSink> {
    sink: S,
    source: String,
    diagnostics: Vec<Diagnostic>,
    // Qualified paths of the routines being lowered, innermost last
    routine_paths: Vec<String>,
}

impl<S: TargetSink> Lowerer<S> {
    /// Create a lowerer emitting into `sink`
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            source: String::new(),
            diagnostics: Vec::new(),
            routine_paths: Vec::new(),
        }
    }

    /// Diagnostics reported so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consume the lowerer, returning the sink and its diagnostics
    pub fn finish(self) -> (S, Vec<Diagnostic>) {
        (self.sink, self.diagnostics)
    }

    /// Lower a whole script, starting from its root class
    pub fn lower_script(&mut self, scopes: &mut ScopeStack, script: &Script) -> Result<()> {
        self.source = script.file_name.clone();
        self.lower_class(scopes, &script.root)
    }

    /// Lower a class: root-level logic, then methods, then nested classes
    pub fn lower_class(&mut self, scopes: &mut ScopeStack, class: &Class) -> Result<()> {
        let mut scopes = scopes.container_scope(class.name.as_str());
        self.sink.emit(TargetOp::BeginClass {
            name: class.name.clone(),
            source: self.source.clone(),
        });

        self.lower_routine(&mut scopes, CLASS_BODY_ROUTINE, MethodKind::Static, &class.instrs)?;
        for method in &class.methods {
            self.lower_routine(&mut scopes, &method.name, MethodKind::Instance, &method.instrs)?;
        }
        for nested in &class.classes {
            self.lower_class(&mut scopes, nested)?;
        }

        self.sink.emit(TargetOp::EndClass);
        Ok(())
    }

    /// Lower one routine inside a fresh routine scope of the innermost class
    pub fn lower_routine(
        &mut self,
        scopes: &mut ScopeStack,
        name: &str,
        kind: MethodKind,
        instrs: &[Instruction],
    ) -> Result<()> {
        let path = format!("{}#{}", scopes.container_path(), name);
        self.routine_paths.push(path);
        let result = self.lower_routine_body(scopes, name, kind, instrs);
        self.routine_paths.pop();
        result
    }

    fn lower_class_method(
        &mut self,
        scopes: &mut ScopeStack,
        name: &str,
        instrs: &[Instruction],
    ) -> Result<()> {
        let path = format!("{}.{}", scopes.container_path(), name);
        self.routine_paths.push(path);
        let result = self.lower_routine_body(scopes, name, MethodKind::Static, instrs);
        self.routine_paths.pop();
        result
    }

    fn lower_routine_body(
        &mut self,
        scopes: &mut ScopeStack,
        name: &str,
        kind: MethodKind,
        instrs: &[Instruction],
    ) -> Result<()> {
        let mut scopes = scopes.routine_scope(name)?;
        self.sink.emit(TargetOp::BeginMethod {
            name: name.to_string(),
            kind,
        });

        self.lower_instrs(&mut scopes, instrs)?;

        if let Some(routine) = scopes.current_routine() {
            tracing::debug!(
                routine = name,
                instructions = instrs.len(),
                locals = routine.max_locals(),
                "lowered routine"
            );
        }
        self.sink.emit(TargetOp::EndMethod);
        Ok(())
    }

    /// Lower `instrs` into the routine the scope stack is positioned at
    pub fn lower_instrs(&mut self, scopes: &mut ScopeStack, instrs: &[Instruction]) -> Result<()> {
        if scopes.current_routine().is_none() {
            return Err(Error::no_routine("lower_instrs"));
        }
        for (index, instr) in instrs.iter().enumerate() {
            self.lower_instr(scopes, index, instr)?;
        }
        Ok(())
    }

    fn lower_instr(&mut self, scopes: &mut ScopeStack, index: usize, instr: &Instruction) -> Result<()> {
        match instr {
            Instruction::Label { label } => {
                let target = scopes.target_label_for(*label)?;
                self.sink.emit(TargetOp::Mark(target));
            }

            Instruction::Jump { target } => {
                let target = scopes.target_label_for(*target)?;
                self.sink.emit(TargetOp::Goto(target));
            }

            Instruction::Branch { lhs, rhs, target } => {
                self.lower_operand(scopes, index, instr, lhs)?;
                self.lower_operand(scopes, index, instr, rhs)?;
                let target = scopes.target_label_for(*target)?;
                self.sink.emit(TargetOp::IfCmpEq(target));
            }

            Instruction::Copy { result, source } => {
                let slot = scopes.slot_for(result)?;
                self.lower_operand(scopes, index, instr, source)?;
                self.sink.emit(TargetOp::Store(slot));
            }

            Instruction::Call {
                result,
                method,
                args,
            } => {
                for arg in args {
                    self.lower_operand(scopes, index, instr, arg)?;
                }
                self.sink.emit(TargetOp::Invoke {
                    method: method.clone(),
                    argc: args.len(),
                });
                match result {
                    Some(var) => {
                        let slot = scopes.slot_for(var)?;
                        self.sink.emit(TargetOp::Store(slot));
                    }
                    None => self.sink.emit(TargetOp::Pop),
                }
            }

            Instruction::PutField {
                receiver,
                field,
                value,
            } => {
                self.declare_field(scopes, field.name())?;
                self.lower_operand(scopes, index, instr, receiver)?;
                self.lower_operand(scopes, index, instr, value)?;
                self.sink.emit(TargetOp::PutField {
                    field: field.name().to_string(),
                });
            }

            Instruction::GetField {
                result,
                receiver,
                field,
            } => {
                self.declare_field(scopes, field.name())?;
                self.lower_operand(scopes, index, instr, receiver)?;
                self.sink.emit(TargetOp::GetField {
                    field: field.name().to_string(),
                });
                let slot = scopes.slot_for(result)?;
                self.sink.emit(TargetOp::Store(slot));
            }

            Instruction::Return { value } => {
                self.lower_operand(scopes, index, instr, value)?;
                self.sink.emit(TargetOp::ReturnValue);
            }

            Instruction::ReceiveArg {
                result,
                index: position,
            } => {
                // Parameter binding happens once the routine signature is known
                let slot = scopes.slot_for(result)?;
                tracing::trace!(%result, %slot, position, "argument slot reserved");
            }

            Instruction::DefineInstanceMethod { method } => {
                self.lower_routine(scopes, &method.name, MethodKind::Instance, &method.instrs)?;
            }

            Instruction::DefineClassMethod { method } => {
                self.lower_class_method(scopes, &method.name, &method.instrs)?;
            }

            Instruction::DefineClass { class } => {
                self.lower_class(scopes, class)?;
            }

            Instruction::Case { .. } | Instruction::Break { .. } => {
                self.report(
                    scopes,
                    index,
                    instr,
                    DiagnosticKind::UnsupportedInstruction(instr.kind()),
                );
            }
        }

        Ok(())
    }

    fn lower_operand(
        &mut self,
        scopes: &mut ScopeStack,
        index: usize,
        instr: &Instruction,
        operand: &Operand,
    ) -> Result<()> {
        match operand {
            Operand::Constant(value) => self.sink.emit(TargetOp::Push(value.clone())),
            Operand::Variable(var) => {
                let slot = scopes.slot_for(var)?;
                self.sink.emit(TargetOp::Load(slot));
            }
            Operand::Field(_) | Operand::Label(_) => {
                self.report(
                    scopes,
                    index,
                    instr,
                    DiagnosticKind::UnsupportedOperand(operand.kind_name()),
                );
            }
        }
        Ok(())
    }

    fn declare_field(&mut self, scopes: &mut ScopeStack, field: &str) -> Result<()> {
        if scopes.declare_field_once(field)? {
            self.sink.emit(TargetOp::DeclareField {
                name: field.to_string(),
            });
        }
        Ok(())
    }

    fn report(&mut self, scopes: &ScopeStack, index: usize, instr: &Instruction, kind: DiagnosticKind) {
        let routine = match (self.routine_paths.last(), scopes.current_routine()) {
            (Some(path), _) => path.clone(),
            (None, Some(routine)) => format!("{}#{}", scopes.container_path(), routine.name()),
            (None, None) => String::from("<none>"),
        };
        let diagnostic = Diagnostic {
            kind,
            routine,
            index,
            instr: instr.to_string(),
        };
        tracing::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{Constant, Label, Method};
    use crate::compiler::target::{Slot, TargetLabel};

    fn lower(instrs: &[Instruction]) -> (Vec<TargetOp>, Vec<Diagnostic>) {
        let mut scopes = ScopeStack::new();
        scopes.enter_container("C");
        scopes.enter_routine("m").unwrap();
        let mut lowerer = Lowerer::new(Vec::new());
        lowerer.lower_instrs(&mut scopes, instrs).unwrap();
        lowerer.finish()
    }

    #[test]
    fn test_copy_and_return() {
        let (code, diags) = lower(&[
            Instruction::copy("v", Operand::fixnum(5)),
            Instruction::ret(Operand::var("v")),
        ]);
        assert!(diags.is_empty());
        assert_eq!(
            code,
            vec![
                TargetOp::Push(Constant::Fixnum(5)),
                TargetOp::Store(Slot(0)),
                TargetOp::Load(Slot(0)),
                TargetOp::ReturnValue,
            ]
        );
    }

    #[test]
    fn test_forward_jump_shares_label_with_marker() {
        let (code, _) = lower(&[
            Instruction::jump(Label(4)),
            Instruction::label(Label(4)),
        ]);
        assert_eq!(
            code,
            vec![TargetOp::Goto(TargetLabel(0)), TargetOp::Mark(TargetLabel(0))]
        );
    }

    #[test]
    fn test_call_result_handling() {
        let (code, _) = lower(&[
            Instruction::call(Some("r"), "add", vec![Operand::var("a"), Operand::fixnum(1)]),
            Instruction::call(None, "flush", vec![]),
        ]);
        assert_eq!(
            code,
            vec![
                TargetOp::Load(Slot(0)),
                TargetOp::Push(Constant::Fixnum(1)),
                TargetOp::Invoke {
                    method: "add".into(),
                    argc: 2
                },
                TargetOp::Store(Slot(1)),
                TargetOp::Invoke {
                    method: "flush".into(),
                    argc: 0
                },
                TargetOp::Pop,
            ]
        );
    }

    #[test]
    fn test_receive_arg_emits_nothing() {
        let (code, diags) = lower(&[
            Instruction::receive_arg("a", 0),
            Instruction::ret(Operand::var("a")),
        ]);
        assert!(diags.is_empty());
        assert_eq!(code, vec![TargetOp::Load(Slot(0)), TargetOp::ReturnValue]);
    }

    #[test]
    fn test_field_operand_is_reported() {
        let (code, diags) = lower(&[Instruction::ret(Operand::field("x"))]);
        assert_eq!(code, vec![TargetOp::ReturnValue]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnsupportedOperand("field"));
        assert_eq!(diags[0].routine, "C#m");
    }

    #[test]
    fn test_diagnostic_path_covers_every_container() {
        let mut scopes = ScopeStack::new();
        scopes.enter_container("Main");
        scopes.enter_container("Inner");
        scopes.enter_routine("m").unwrap();
        let mut lowerer = Lowerer::new(Vec::new());
        lowerer
            .lower_instrs(&mut scopes, &[Instruction::Break { value: None }])
            .unwrap();
        assert_eq!(lowerer.diagnostics()[0].routine, "Main::Inner#m");
    }

    #[test]
    fn test_nested_definitions_report_qualified_paths() {
        let class = Class::new("Main").with_method(Method::new(
            "outer",
            vec![
                Instruction::DefineClassMethod {
                    method: Method::new("build", vec![Instruction::Break { value: None }]),
                },
                Instruction::DefineClass {
                    class: Class::new("Inner").with_body(vec![Instruction::Break { value: None }]),
                },
                Instruction::Break { value: None },
            ],
        ));
        let mut scopes = ScopeStack::new();
        let mut lowerer = Lowerer::new(Vec::new());
        lowerer.lower_class(&mut scopes, &class).unwrap();

        let routines: Vec<&str> = lowerer.diagnostics().iter().map(|d| d.routine.as_str()).collect();
        assert_eq!(
            routines,
            vec!["Main.build", "Main::Inner#__class__", "Main#outer"]
        );
    }

    #[test]
    fn test_lower_without_routine_fails() {
        let mut scopes = ScopeStack::new();
        let mut lowerer = Lowerer::new(Vec::new());
        let err = lowerer
            .lower_instrs(&mut scopes, &[Instruction::jump(Label(0))])
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveRoutine { .. }));
    }
}
