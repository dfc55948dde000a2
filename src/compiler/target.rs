//! # Stack-machine target operations
//!
//! The abstract instruction set lowering emits into. The target is a managed
//! stack runtime with per-method local slots, object fields and structured
//! class/method definitions; binary encoding is left to the sink.

use super::ir::Constant;
use std::fmt;

/// Local variable slot within one method activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub u16);

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Target-code label, local to the method that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetLabel(pub u32);

impl fmt::Display for TargetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// How a method is bound on its class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Receives an instance
    Instance,
    /// Bound on the class itself
    Static,
}

/// One emitted target operation
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOp {
    // Structure
    /// Open a class definition
    BeginClass {
        /// Class name
        name: String,
        /// Source file the class came from
        source: String,
    },
    /// Close the innermost class
    EndClass,
    /// Declare a field on the innermost class
    DeclareField {
        /// Field name
        name: String,
    },
    /// Open a method on the innermost class
    BeginMethod {
        /// Method name
        name: String,
        /// Binding kind
        kind: MethodKind,
    },
    /// Close the innermost method
    EndMethod,

    // Stack and locals
    /// Push a literal
    Push(Constant),
    /// Push the value of a local slot
    Load(Slot),
    /// Pop into a local slot
    Store(Slot),
    /// Discard the top of stack
    Pop,

    // Control
    /// Place a label at the current position
    Mark(TargetLabel),
    /// Unconditional transfer
    Goto(TargetLabel),
    /// Pop two values, transfer if they are equal
    IfCmpEq(TargetLabel),
    /// Pop `argc` arguments, invoke, push the result
    Invoke {
        /// Resolved method reference
        method: String,
        /// Number of arguments consumed
        argc: usize,
    },
    /// Pop a value and return it
    ReturnValue,

    // Fields
    /// Pop receiver, push its field
    GetField {
        /// Field name
        field: String,
    },
    /// Pop receiver and value, store the field
    PutField {
        /// Field name
        field: String,
    },
}

impl TargetOp {
    /// Net operand-stack effect as `(pops, pushes)`
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            TargetOp::Push(_) | TargetOp::Load(_) => (0, 1),
            TargetOp::Store(_) | TargetOp::Pop | TargetOp::ReturnValue => (1, 0),
            TargetOp::IfCmpEq(_) => (2, 0),
            TargetOp::Invoke { argc, .. } => (*argc, 1),
            TargetOp::GetField { .. } => (1, 1),
            TargetOp::PutField { .. } => (2, 0),
            TargetOp::BeginClass { .. }
            | TargetOp::EndClass
            | TargetOp::DeclareField { .. }
            | TargetOp::BeginMethod { .. }
            | TargetOp::EndMethod
            | TargetOp::Mark(_)
            | TargetOp::Goto(_) => (0, 0),
        }
    }

    /// Label this op transfers control to, if any
    pub fn branch_target(&self) -> Option<TargetLabel> {
        match self {
            TargetOp::Goto(l) | TargetOp::IfCmpEq(l) => Some(*l),
            _ => None,
        }
    }
}

impl fmt::Display for TargetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOp::BeginClass { name, source } => write!(f, "class {} ({})", name, source),
            TargetOp::EndClass => write!(f, "end class"),
            TargetOp::DeclareField { name } => write!(f, "field {}", name),
            TargetOp::BeginMethod { name, kind } => match kind {
                MethodKind::Instance => write!(f, "method {}", name),
                MethodKind::Static => write!(f, "static method {}", name),
            },
            TargetOp::EndMethod => write!(f, "end method"),
            TargetOp::Push(c) => write!(f, "push {}", c),
            TargetOp::Load(s) => write!(f, "load {}", s),
            TargetOp::Store(s) => write!(f, "store {}", s),
            TargetOp::Pop => write!(f, "pop"),
            TargetOp::Mark(l) => write!(f, "{}:", l),
            TargetOp::Goto(l) => write!(f, "goto {}", l),
            TargetOp::IfCmpEq(l) => write!(f, "if_cmpeq {}", l),
            TargetOp::Invoke { method, argc } => write!(f, "invoke {}/{}", method, argc),
            TargetOp::ReturnValue => write!(f, "return"),
            TargetOp::GetField { field } => write!(f, "getfield {}", field),
            TargetOp::PutField { field } => write!(f, "putfield {}", field),
        }
    }
}

/// Receives emitted target operations in order
pub trait TargetSink {
    /// Accept the next operation
    fn emit(&mut self, op: TargetOp);
}

impl TargetSink for Vec<TargetOp> {
    fn emit(&mut self, op: TargetOp) {
        self.push(op);
    }
}

impl<S: TargetSink + ?Sized> TargetSink for &mut S {
    fn emit(&mut self, op: TargetOp) {
        (**self).emit(op);
    }
}
