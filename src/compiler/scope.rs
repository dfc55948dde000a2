//! # Code-generation scope stack
//!
//! A stack of container (class) scopes, each holding a stack of routine
//! (method) scopes. Routine scopes map variables to local slots and IR labels
//! to target labels, allocating both on first use. Container scopes remember
//! which fields were already declared.
//!
//! `container_scope` / `routine_scope` return guards that pop the scope when
//! dropped, so an early `?` return still unwinds in push order.

use super::ir::{Label, Variable};
use super::target::{Slot, TargetLabel};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};

/// Per-method lowering state
#[derive(Debug, Clone)]
pub struct RoutineScope {
    name: String,
    slots: HashMap<Variable, Slot>,
    // Wider than the slot/label types so the last index can still be handed out
    next_slot: u32,
    labels: HashMap<Label, TargetLabel>,
    next_label: u64,
}

impl RoutineScope {
    /// Create a routine scope whose first local is `first_slot`
    pub fn new(name: impl Into<String>, first_slot: u16) -> Self {
        Self {
            name: name.into(),
            slots: HashMap::new(),
            next_slot: u32::from(first_slot),
            labels: HashMap::new(),
            next_label: 0,
        }
    }

    /// Routine name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot of `var`, allocating the next sequential slot on first reference
    pub fn slot_for(&mut self, var: &Variable) -> Result<Slot> {
        if let Some(&slot) = self.slots.get(var) {
            return Ok(slot);
        }
        let slot = u16::try_from(self.next_slot)
            .map(Slot)
            .map_err(|_| Error::TooManyLocals {
                routine: self.name.clone(),
            })?;
        self.next_slot += 1;
        self.slots.insert(var.clone(), slot);
        Ok(slot)
    }

    /// Target label for `label`, creating one on first reference or definition
    pub fn target_label_for(&mut self, label: Label) -> Result<TargetLabel> {
        if let Some(&target) = self.labels.get(&label) {
            return Ok(target);
        }
        let target = u32::try_from(self.next_label)
            .map(TargetLabel)
            .map_err(|_| Error::TooManyLabels {
                routine: self.name.clone(),
            })?;
        self.next_label += 1;
        self.labels.insert(label, target);
        Ok(target)
    }

    /// Number of variables allocated so far
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// One past the highest slot index in use
    pub fn max_locals(&self) -> u32 {
        self.next_slot
    }
}

/// Per-class lowering state
#[derive(Debug, Clone)]
pub struct ContainerScope {
    name: String,
    declared_fields: BTreeSet<String>,
    routines: Vec<RoutineScope>,
}

impl ContainerScope {
    /// Create an empty container scope
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_fields: BTreeSet::new(),
            routines: Vec::new(),
        }
    }

    /// Container name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record `field` as declared; true only the first time
    pub fn declare_field_once(&mut self, field: &str) -> bool {
        if self.declared_fields.contains(field) {
            return false;
        }
        self.declared_fields.insert(field.to_string());
        true
    }

    /// Fields declared so far, in name order
    pub fn declared_fields(&self) -> impl Iterator<Item = &str> {
        self.declared_fields.iter().map(String::as_str)
    }

    /// Innermost routine scope
    pub fn routine(&self) -> Option<&RoutineScope> {
        self.routines.last()
    }
}

/// Stack of container scopes, each owning a stack of routine scopes
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    containers: Vec<ContainerScope>,
    first_slot: u16,
}

impl ScopeStack {
    /// Create an empty stack; locals start at slot 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty stack whose routines allocate locals from `first_slot`
    pub fn with_first_slot(first_slot: u16) -> Self {
        Self {
            containers: Vec::new(),
            first_slot,
        }
    }

    /// Push a container scope
    pub fn enter_container(&mut self, name: impl Into<String>) {
        let name = name.into();
        tracing::trace!(container = %name, "enter container");
        self.containers.push(ContainerScope::new(name));
    }

    /// Pop the innermost container scope, which must be `name` with no open routines
    pub fn exit_container(&mut self, name: &str) -> Result<()> {
        let top = self.containers.last().ok_or(Error::NoActiveContainer)?;
        if let Some(routine) = top.routine() {
            return Err(Error::ScopeMismatch {
                expected: name.to_string(),
                found: routine.name().to_string(),
            });
        }
        if top.name() != name {
            return Err(Error::ScopeMismatch {
                expected: name.to_string(),
                found: top.name().to_string(),
            });
        }
        self.containers.pop();
        tracing::trace!(container = name, "exit container");
        Ok(())
    }

    /// Push a routine scope onto the innermost container
    pub fn enter_routine(&mut self, name: impl Into<String>) -> Result<()> {
        let first_slot = self.first_slot;
        let container = self.containers.last_mut().ok_or(Error::NoActiveContainer)?;
        let name = name.into();
        tracing::trace!(container = container.name(), routine = %name, "enter routine");
        container.routines.push(RoutineScope::new(name, first_slot));
        Ok(())
    }

    /// Pop the innermost routine scope, which must be `name`
    pub fn exit_routine(&mut self, name: &str) -> Result<()> {
        let container = self.containers.last_mut().ok_or(Error::NoActiveContainer)?;
        let top = container
            .routines
            .last()
            .ok_or_else(|| Error::no_routine("exit_routine"))?;
        if top.name() != name {
            return Err(Error::ScopeMismatch {
                expected: name.to_string(),
                found: top.name().to_string(),
            });
        }
        container.routines.pop();
        Ok(())
    }

    /// Push a container scope that is popped when the guard drops
    pub fn container_scope(&mut self, name: impl Into<String>) -> ContainerGuard<'_> {
        self.enter_container(name);
        let depth = self.containers.len();
        ContainerGuard { stack: self, depth }
    }

    /// Push a routine scope that is popped when the guard drops
    pub fn routine_scope(&mut self, name: impl Into<String>) -> Result<RoutineGuard<'_>> {
        self.enter_routine(name)?;
        let container_depth = self.containers.len();
        let routine_depth = self
            .containers
            .last()
            .map_or(0, |container| container.routines.len());
        Ok(RoutineGuard {
            stack: self,
            container_depth,
            routine_depth,
        })
    }

    /// Innermost container scope
    pub fn current_container(&self) -> Option<&ContainerScope> {
        self.containers.last()
    }

    /// Innermost routine scope of the innermost container
    pub fn current_routine(&self) -> Option<&RoutineScope> {
        self.containers.last().and_then(ContainerScope::routine)
    }

    fn routine_mut(&mut self, operation: &str) -> Result<&mut RoutineScope> {
        self.containers
            .last_mut()
            .and_then(|container| container.routines.last_mut())
            .ok_or_else(|| Error::no_routine(operation))
    }

    /// Slot of `var` in the innermost routine, allocated on first use
    pub fn slot_for(&mut self, var: &Variable) -> Result<Slot> {
        self.routine_mut("slot_for")?.slot_for(var)
    }

    /// Target label of `label` in the innermost routine, allocated on first use
    pub fn target_label_for(&mut self, label: Label) -> Result<TargetLabel> {
        self.routine_mut("target_label_for")?.target_label_for(label)
    }

    /// Declare `field` on the innermost container; true only the first time
    pub fn declare_field_once(&mut self, field: &str) -> Result<bool> {
        let container = self.containers.last_mut().ok_or(Error::NoActiveContainer)?;
        Ok(container.declare_field_once(field))
    }

    /// Open container names joined with `::`, outermost first
    pub fn container_path(&self) -> String {
        self.containers
            .iter()
            .map(ContainerScope::name)
            .collect::<Vec<_>>()
            .join("::")
    }

    /// Number of open container scopes
    pub fn container_depth(&self) -> usize {
        self.containers.len()
    }

    /// True when no scope is open
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Open container scope; pops it (and anything opened above it) on drop
pub struct ContainerGuard<'a> {
    stack: &'a mut ScopeStack,
    depth: usize,
}

impl Deref for ContainerGuard<'_> {
    type Target = ScopeStack;

    fn deref(&self) -> &ScopeStack {
        self.stack
    }
}

impl DerefMut for ContainerGuard<'_> {
    fn deref_mut(&mut self) -> &mut ScopeStack {
        self.stack
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        self.stack.containers.truncate(self.depth - 1);
    }
}

/// Open routine scope; pops it (and anything opened above it) on drop
pub struct RoutineGuard<'a> {
    stack: &'a mut ScopeStack,
    container_depth: usize,
    routine_depth: usize,
}

impl Deref for RoutineGuard<'_> {
    type Target = ScopeStack;

    fn deref(&self) -> &ScopeStack {
        self.stack
    }
}

impl DerefMut for RoutineGuard<'_> {
    fn deref_mut(&mut self) -> &mut ScopeStack {
        self.stack
    }
}

impl Drop for RoutineGuard<'_> {
    fn drop(&mut self) {
        self.stack.containers.truncate(self.container_depth);
        if let Some(container) = self.stack.containers.get_mut(self.container_depth - 1) {
            container.routines.truncate(self.routine_depth - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_stable_and_sequential() {
        let mut scopes = ScopeStack::new();
        scopes.enter_container("C");
        scopes.enter_routine("m").unwrap();

        let a = Variable::new("a");
        let b = Variable::new("b");
        assert_eq!(scopes.slot_for(&a).unwrap(), Slot(0));
        assert_eq!(scopes.slot_for(&b).unwrap(), Slot(1));
        assert_eq!(scopes.slot_for(&a).unwrap(), Slot(0));
        assert_eq!(scopes.current_routine().unwrap().slot_count(), 2);
    }

    #[test]
    fn test_slot_numbering_restarts_per_routine() {
        let mut scopes = ScopeStack::with_first_slot(2);
        scopes.enter_container("C");

        scopes.enter_routine("first").unwrap();
        assert_eq!(scopes.slot_for(&Variable::new("x")).unwrap(), Slot(2));
        assert_eq!(scopes.slot_for(&Variable::new("y")).unwrap(), Slot(3));
        scopes.exit_routine("first").unwrap();

        scopes.enter_routine("second").unwrap();
        assert_eq!(scopes.slot_for(&Variable::new("y")).unwrap(), Slot(2));
    }

    #[test]
    fn test_slot_space_exhaustion_is_an_error() {
        let mut scopes = ScopeStack::with_first_slot(u16::MAX);
        scopes.enter_container("C");
        scopes.enter_routine("m").unwrap();

        assert_eq!(scopes.slot_for(&Variable::new("a")).unwrap(), Slot(u16::MAX));
        assert_eq!(
            scopes.slot_for(&Variable::new("b")),
            Err(Error::TooManyLocals { routine: "m".into() })
        );
        // Existing variables still resolve
        assert_eq!(scopes.slot_for(&Variable::new("a")).unwrap(), Slot(u16::MAX));
        assert_eq!(scopes.current_routine().unwrap().slot_count(), 1);
        assert_eq!(scopes.current_routine().unwrap().max_locals(), 65536);
    }

    #[test]
    fn test_label_space_exhaustion_is_an_error() {
        let mut routine = RoutineScope::new("m", 0);
        routine.next_label = u64::from(u32::MAX);

        assert_eq!(routine.target_label_for(Label(7)).unwrap(), TargetLabel(u32::MAX));
        assert_eq!(
            routine.target_label_for(Label(8)),
            Err(Error::TooManyLabels { routine: "m".into() })
        );
        assert_eq!(routine.target_label_for(Label(7)).unwrap(), TargetLabel(u32::MAX));
    }

    #[test]
    fn test_container_path() {
        let mut scopes = ScopeStack::new();
        assert_eq!(scopes.container_path(), "");
        scopes.enter_container("Main");
        scopes.enter_container("Inner");
        assert_eq!(scopes.container_path(), "Main::Inner");
    }

    #[test]
    fn test_labels_allocated_once() {
        let mut scopes = ScopeStack::new();
        scopes.enter_container("C");
        scopes.enter_routine("m").unwrap();

        let t1 = scopes.target_label_for(Label(9)).unwrap();
        let t2 = scopes.target_label_for(Label(3)).unwrap();
        assert_ne!(t1, t2);
        assert_eq!(scopes.target_label_for(Label(9)).unwrap(), t1);
    }

    #[test]
    fn test_declare_field_once() {
        let mut scopes = ScopeStack::new();
        scopes.enter_container("A");
        assert!(scopes.declare_field_once("x").unwrap());
        assert!(!scopes.declare_field_once("x").unwrap());

        scopes.enter_container("B");
        assert!(scopes.declare_field_once("x").unwrap());
        scopes.exit_container("B").unwrap();

        assert!(!scopes.declare_field_once("x").unwrap());
        let fields: Vec<&str> = scopes.current_container().unwrap().declared_fields().collect();
        assert_eq!(fields, vec!["x"]);
    }

    #[test]
    fn test_resolve_without_routine_fails() {
        let mut scopes = ScopeStack::new();
        assert_eq!(
            scopes.slot_for(&Variable::new("a")),
            Err(Error::no_routine("slot_for"))
        );
        assert_eq!(scopes.declare_field_once("f"), Err(Error::NoActiveContainer));
        assert_eq!(scopes.enter_routine("m"), Err(Error::NoActiveContainer));

        scopes.enter_container("C");
        assert!(matches!(
            scopes.target_label_for(Label(0)),
            Err(Error::NoActiveRoutine { .. })
        ));
    }

    #[test]
    fn test_exit_must_match_innermost() {
        let mut scopes = ScopeStack::new();
        scopes.enter_container("C");
        scopes.enter_routine("m").unwrap();

        assert_eq!(
            scopes.exit_container("C"),
            Err(Error::ScopeMismatch {
                expected: "C".into(),
                found: "m".into()
            })
        );
        assert!(matches!(
            scopes.exit_routine("other"),
            Err(Error::ScopeMismatch { .. })
        ));
        scopes.exit_routine("m").unwrap();
        assert!(matches!(
            scopes.exit_container("D"),
            Err(Error::ScopeMismatch { .. })
        ));
        scopes.exit_container("C").unwrap();
        assert!(scopes.is_empty());
    }

    #[test]
    fn test_guards_unwind_on_early_return() {
        fn fails_inside(scopes: &mut ScopeStack) -> Result<()> {
            let mut class = scopes.container_scope("C");
            let mut method = class.routine_scope("m")?;
            method.slot_for(&Variable::new("a"))?;
            Err(Error::compiler("boom"))
        }

        let mut scopes = ScopeStack::new();
        assert!(fails_inside(&mut scopes).is_err());
        assert!(scopes.is_empty());
    }

    #[test]
    fn test_routine_guard_pops_only_its_routine() {
        let mut scopes = ScopeStack::new();
        scopes.enter_container("C");
        scopes.enter_routine("outer").unwrap();
        {
            let mut inner = scopes.routine_scope("inner").unwrap();
            assert_eq!(inner.current_routine().unwrap().name(), "inner");
            inner.slot_for(&Variable::new("z")).unwrap();
        }
        assert_eq!(scopes.current_routine().unwrap().name(), "outer");
        assert_eq!(scopes.current_routine().unwrap().slot_count(), 0);
    }
}
