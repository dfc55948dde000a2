//! IR instruction and operand definitions

use super::label::Label;
use super::program::{Class, Method};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named local variable, resolved to a storage slot during lowering
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(pub String);

impl Variable {
    /// Creates a variable reference with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Named object field, declared on the enclosing container on first use
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldRef(pub String);

impl FieldRef {
    /// Creates a field reference with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Self-contained literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Constant {
    /// Immediate integer
    Fixnum(i64),
    /// Immediate float
    Float(f64),
    /// String literal
    Str(String),
    /// Boolean literal
    Bool(bool),
    /// The nil value
    Nil,
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Fixnum(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{:?}", v),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Nil => write!(f, "nil"),
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Operand {
    /// Literal value
    Constant(Constant),
    /// Local variable reference
    Variable(Variable),
    /// Object field reference
    Field(FieldRef),
    /// Label reference
    Label(Label),
}

impl Operand {
    /// Integer constant operand
    pub fn fixnum(value: i64) -> Self {
        Operand::Constant(Constant::Fixnum(value))
    }

    /// Variable operand
    pub fn var(name: impl Into<String>) -> Self {
        Operand::Variable(Variable::new(name))
    }

    /// Field operand
    pub fn field(name: impl Into<String>) -> Self {
        Operand::Field(FieldRef::new(name))
    }

    /// Short operand kind name, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operand::Constant(_) => "constant",
            Operand::Variable(_) => "variable",
            Operand::Field(_) => "field",
            Operand::Label(_) => "label",
        }
    }

    /// True for constants (self-contained, no resolution needed)
    pub fn is_constant(&self) -> bool {
        matches!(self, Operand::Constant(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(c) => write!(f, "{}", c),
            Operand::Variable(v) => write!(f, "{}", v),
            Operand::Field(r) => write!(f, "{}", r),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}

/// Instruction kind tag, one per [`Instruction`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrKind {
    /// Label marker
    Label,
    /// Unconditional jump
    Jump,
    /// Branch if equal
    Beq,
    /// Method call
    Call,
    /// Copy / assignment
    Copy,
    /// Field load
    GetField,
    /// Field store
    PutField,
    /// Incoming argument receive
    RecvArg,
    /// Return a value
    Return,
    /// Instance method definition
    DefInstMeth,
    /// Class method definition
    DefClsMeth,
    /// Class definition
    DefClass,
    /// Multi-way case (placeholder)
    Case,
    /// Loop break (placeholder)
    Break,
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrKind::Label => "LABEL",
            InstrKind::Jump => "JUMP",
            InstrKind::Beq => "BEQ",
            InstrKind::Call => "CALL",
            InstrKind::Copy => "COPY",
            InstrKind::GetField => "GET_FIELD",
            InstrKind::PutField => "PUT_FIELD",
            InstrKind::RecvArg => "RECV_ARG",
            InstrKind::Return => "RETURN",
            InstrKind::DefInstMeth => "DEF_INST_METH",
            InstrKind::DefClsMeth => "DEF_CLS_METH",
            InstrKind::DefClass => "DEF_CLASS",
            InstrKind::Case => "CASE",
            InstrKind::Break => "BREAK",
        };
        f.write_str(name)
    }
}

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    // Control flow
    /// Define a jump target; always starts a basic block
    Label {
        /// Label being placed
        label: Label,
    },
    /// Unconditional jump to `target`
    Jump {
        /// Jump target
        target: Label,
    },
    /// Jump to `target` if `lhs == rhs`
    Branch {
        /// Left comparison operand
        lhs: Operand,
        /// Right comparison operand
        rhs: Operand,
        /// Branch target
        target: Label,
    },
    /// Multi-way dispatch; arms were already lowered to branches, so no target
    Case {
        /// Value being dispatched on
        value: Operand,
    },
    /// Loop break; target resolution is not modeled
    Break {
        /// Value carried out of the loop, if any
        value: Option<Operand>,
    },

    // Data movement
    /// result = source
    Copy {
        /// Destination variable
        result: Variable,
        /// Value copied
        source: Operand,
    },
    /// result = method(args...)
    Call {
        /// Variable receiving the return value, if used
        result: Option<Variable>,
        /// Resolved method reference
        method: String,
        /// Call arguments, evaluated left to right
        args: Vec<Operand>,
    },
    /// result = receiver.field
    GetField {
        /// Destination variable
        result: Variable,
        /// Object whose field is read
        receiver: Operand,
        /// Field being read
        field: FieldRef,
    },
    /// receiver.field = value
    PutField {
        /// Object whose field is written
        receiver: Operand,
        /// Field being written
        field: FieldRef,
        /// Value stored
        value: Operand,
    },
    /// result = incoming argument number `index`
    ReceiveArg {
        /// Destination variable
        result: Variable,
        /// Position in the routine's formal parameter list
        index: usize,
    },
    /// Return `value` to the caller
    Return {
        /// Returned value
        value: Operand,
    },

    // Definitions
    /// Define an instance method on the enclosing class
    DefineInstanceMethod {
        /// Method body
        method: Method,
    },
    /// Define a class-level method on the enclosing class
    DefineClassMethod {
        /// Method body
        method: Method,
    },
    /// Define a nested class
    DefineClass {
        /// Class body
        class: Class,
    },
}

impl Instruction {
    /// `label L`
    pub fn label(label: Label) -> Self {
        Instruction::Label { label }
    }

    /// `jump L`
    pub fn jump(target: Label) -> Self {
        Instruction::Jump { target }
    }

    /// `beq lhs, rhs, L`
    pub fn branch(lhs: Operand, rhs: Operand, target: Label) -> Self {
        Instruction::Branch { lhs, rhs, target }
    }

    /// `result = source`
    pub fn copy(result: impl Into<String>, source: Operand) -> Self {
        Instruction::Copy {
            result: Variable::new(result),
            source,
        }
    }

    /// `result = method(args...)`
    pub fn call(result: Option<&str>, method: impl Into<String>, args: Vec<Operand>) -> Self {
        Instruction::Call {
            result: result.map(Variable::new),
            method: method.into(),
            args,
        }
    }

    /// `result = receiver.field`
    pub fn get_field(result: impl Into<String>, receiver: Operand, field: impl Into<String>) -> Self {
        Instruction::GetField {
            result: Variable::new(result),
            receiver,
            field: FieldRef::new(field),
        }
    }

    /// `receiver.field = value`
    pub fn put_field(receiver: Operand, field: impl Into<String>, value: Operand) -> Self {
        Instruction::PutField {
            receiver,
            field: FieldRef::new(field),
            value,
        }
    }

    /// `result = recv_arg(index)`
    pub fn receive_arg(result: impl Into<String>, index: usize) -> Self {
        Instruction::ReceiveArg {
            result: Variable::new(result),
            index,
        }
    }

    /// `return value`
    pub fn ret(value: Operand) -> Self {
        Instruction::Return { value }
    }

    /// Kind tag of this instruction
    pub fn kind(&self) -> InstrKind {
        match self {
            Instruction::Label { .. } => InstrKind::Label,
            Instruction::Jump { .. } => InstrKind::Jump,
            Instruction::Branch { .. } => InstrKind::Beq,
            Instruction::Case { .. } => InstrKind::Case,
            Instruction::Break { .. } => InstrKind::Break,
            Instruction::Copy { .. } => InstrKind::Copy,
            Instruction::Call { .. } => InstrKind::Call,
            Instruction::GetField { .. } => InstrKind::GetField,
            Instruction::PutField { .. } => InstrKind::PutField,
            Instruction::ReceiveArg { .. } => InstrKind::RecvArg,
            Instruction::Return { .. } => InstrKind::Return,
            Instruction::DefineInstanceMethod { .. } => InstrKind::DefInstMeth,
            Instruction::DefineClassMethod { .. } => InstrKind::DefClsMeth,
            Instruction::DefineClass { .. } => InstrKind::DefClass,
        }
    }

    /// Operands in positional order
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Instruction::Label { label } => vec![Operand::Label(*label)],
            Instruction::Jump { target } => vec![Operand::Label(*target)],
            Instruction::Branch { lhs, rhs, target } => {
                vec![lhs.clone(), rhs.clone(), Operand::Label(*target)]
            }
            Instruction::Case { value } => vec![value.clone()],
            Instruction::Break { value } => value.iter().cloned().collect(),
            Instruction::Copy { source, .. } => vec![source.clone()],
            Instruction::Call { args, .. } => args.clone(),
            Instruction::GetField {
                receiver, field, ..
            } => vec![receiver.clone(), Operand::Field(field.clone())],
            Instruction::PutField {
                receiver,
                field,
                value,
            } => vec![
                receiver.clone(),
                Operand::Field(field.clone()),
                value.clone(),
            ],
            Instruction::ReceiveArg { .. } => Vec::new(),
            Instruction::Return { value } => vec![value.clone()],
            Instruction::DefineInstanceMethod { .. }
            | Instruction::DefineClassMethod { .. }
            | Instruction::DefineClass { .. } => Vec::new(),
        }
    }

    /// Variable written by this instruction, if any
    pub fn result(&self) -> Option<&Variable> {
        match self {
            Instruction::Copy { result, .. }
            | Instruction::GetField { result, .. }
            | Instruction::ReceiveArg { result, .. } => Some(result),
            Instruction::Call { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// Explicit control-transfer target (jumps and branches only)
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instruction::Jump { target } | Instruction::Branch { target, .. } => Some(*target),
            // Case arms are already branches and break targets are not modeled
            Instruction::Case { .. } | Instruction::Break { .. } => None,
            _ => None,
        }
    }

    /// Labels defined or referenced by this instruction
    pub fn labels(&self) -> Vec<Label> {
        match self {
            Instruction::Label { label } => vec![*label],
            _ => self.jump_target().into_iter().collect(),
        }
    }

    /// True for label markers
    pub fn starts_basic_block(&self) -> bool {
        matches!(self, Instruction::Label { .. })
    }

    /// True for instructions after which the current block must end
    pub fn ends_basic_block(&self) -> bool {
        matches!(
            self,
            Instruction::Jump { .. }
                | Instruction::Branch { .. }
                | Instruction::Case { .. }
                | Instruction::Break { .. }
        )
    }

    /// True if control never falls through to the next instruction
    pub fn is_unconditional_jump(&self) -> bool {
        matches!(self, Instruction::Jump { .. })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label { label } => write!(f, "{}:", label),
            Instruction::Jump { target } => write!(f, "jump {}", target),
            Instruction::Branch { lhs, rhs, target } => {
                write!(f, "beq {}, {}, {}", lhs, rhs, target)
            }
            Instruction::Case { value } => write!(f, "case {}", value),
            Instruction::Break { value: Some(v) } => write!(f, "break {}", v),
            Instruction::Break { value: None } => write!(f, "break"),
            Instruction::Copy { result, source } => write!(f, "{} = {}", result, source),
            Instruction::Call {
                result,
                method,
                args,
            } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                match result {
                    Some(r) => write!(f, "{} = call {}({})", r, method, args.join(", ")),
                    None => write!(f, "call {}({})", method, args.join(", ")),
                }
            }
            Instruction::GetField {
                result,
                receiver,
                field,
            } => write!(f, "{} = {}.{}", result, receiver, field),
            Instruction::PutField {
                receiver,
                field,
                value,
            } => write!(f, "{}.{} = {}", receiver, field, value),
            Instruction::ReceiveArg { result, index } => {
                write!(f, "{} = recv_arg({})", result, index)
            }
            Instruction::Return { value } => write!(f, "return {}", value),
            Instruction::DefineInstanceMethod { method } => write!(f, "def {}", method.name),
            Instruction::DefineClassMethod { method } => write!(f, "def self.{}", method.name),
            Instruction::DefineClass { class } => write!(f, "class {}", class.name),
        }
    }
}
