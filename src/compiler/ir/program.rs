//! Routine, container and script definitions

use super::instruction::Instruction;
use super::label::LabelGenerator;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Name of the routine that holds a class's root-level logic
pub const CLASS_BODY_ROUTINE: &str = "__class__";

/// A routine (method) with its linear instruction stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    /// Method name
    pub name: String,
    /// Instructions in program order
    pub instrs: Vec<Instruction>,
}

impl Method {
    /// Create a method from its instruction stream
    pub fn new(name: impl Into<String>, instrs: Vec<Instruction>) -> Self {
        Self {
            name: name.into(),
            instrs,
        }
    }

    /// Label generator owned by this routine, positioned past every label it already uses
    pub fn label_generator(&self) -> LabelGenerator {
        LabelGenerator::resume_after(&self.instrs)
    }
}

/// A container (class): root-level logic, methods and nested classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    /// Class name
    pub name: String,
    /// Root-level logic, lowered as the `__class__` routine
    #[serde(default)]
    pub instrs: Vec<Instruction>,
    /// Methods defined directly on this class
    #[serde(default)]
    pub methods: Vec<Method>,
    /// Nested classes
    #[serde(default)]
    pub classes: Vec<Class>,
}

impl Class {
    /// Create an empty class
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instrs: Vec::new(),
            methods: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Set the root-level logic
    pub fn with_body(mut self, instrs: Vec<Instruction>) -> Self {
        self.instrs = instrs;
        self
    }

    /// Add a method
    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a nested class
    pub fn with_class(mut self, class: Class) -> Self {
        self.classes.push(class);
        self
    }

    /// Root-level logic viewed as a routine
    pub fn body(&self) -> Method {
        Method::new(CLASS_BODY_ROUTINE, self.instrs.clone())
    }

    /// Every routine reachable from this class, with a qualified path.
    ///
    /// Order: root-level logic, methods, nested classes; definitions found
    /// inside an instruction stream follow the routine that contains them.
    pub fn routines(&self) -> Vec<(String, Method)> {
        let mut out = Vec::new();
        self.collect_routines(&self.name, &mut out);
        out
    }

    fn collect_routines(&self, path: &str, out: &mut Vec<(String, Method)>) {
        let body = self.body();
        collect_method(path, &format!("{}#{}", path, CLASS_BODY_ROUTINE), &body, out);
        for method in &self.methods {
            collect_method(path, &format!("{}#{}", path, method.name), method, out);
        }
        for class in &self.classes {
            class.collect_routines(&format!("{}::{}", path, class.name), out);
        }
    }
}

// Nested definitions are qualified relative to `owner`, the enclosing class path
fn collect_method(owner: &str, path: &str, method: &Method, out: &mut Vec<(String, Method)>) {
    out.push((path.to_string(), method.clone()));
    for instr in &method.instrs {
        match instr {
            Instruction::DefineInstanceMethod { method: nested } => {
                collect_method(owner, &format!("{}#{}", owner, nested.name), nested, out);
            }
            Instruction::DefineClassMethod { method: nested } => {
                collect_method(owner, &format!("{}.{}", owner, nested.name), nested, out);
            }
            Instruction::DefineClass { class } => {
                class.collect_routines(&format!("{}::{}", owner, class.name), out);
            }
            _ => {}
        }
    }
}

/// A compilation unit: source file name and its root class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Source file the IR was built from
    pub file_name: String,
    /// Top-level class holding the script's root logic
    pub root: Class,
}

impl Script {
    /// Create a script from its root class
    pub fn new(file_name: impl Into<String>, root: Class) -> Self {
        Self {
            file_name: file_name.into(),
            root,
        }
    }

    /// Decode a script from its JSON interchange form
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode the script as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{Label, Operand};

    #[test]
    fn test_routine_paths() {
        let inner = Class::new("Inner").with_method(Method::new("go", vec![]));
        let nested_def = Instruction::DefineInstanceMethod {
            method: Method::new("helper", vec![Instruction::ret(Operand::fixnum(1))]),
        };
        let root = Class::new("Main")
            .with_body(vec![nested_def])
            .with_method(Method::new("run", vec![]))
            .with_class(inner);

        let paths: Vec<String> = root.routines().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                "Main#__class__",
                "Main#helper",
                "Main#run",
                "Main::Inner#__class__",
                "Main::Inner#go",
            ]
        );
    }

    #[test]
    fn test_method_label_generator() {
        let method = Method::new(
            "m",
            vec![Instruction::label(Label(3)), Instruction::jump(Label(3))],
        );
        assert_eq!(method.label_generator().new_label().unwrap(), Label(4));
    }

    #[test]
    fn test_script_json_defaults() {
        let script = Script::from_json(r#"{"file_name": "a.rb", "root": {"name": "Object"}}"#)
            .unwrap();
        assert_eq!(script.root.name, "Object");
        assert!(script.root.instrs.is_empty());
        assert!(Script::from_json("{").is_err());
    }
}
