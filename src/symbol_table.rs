//! Compile-time symbol storage for the parser.
//!
//! Macros and routines are global. Variables and parameters live in the
//! frame that declares them: a routine body cannot see the caller's
//! variables, only its own parameters and whatever it assigns.

use std::collections::HashMap;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Macro,
    Var,
    Param,
    Routine,
}

/// A routine signature collected at definition time. The parameter list is
/// compile-time only; it never appears in the generated code.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    name: String,
    params: Vec<String>,
}

impl Routine {
    pub fn new(name: &str) -> Self {
        Routine {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn add_param(&mut self, name: &str) {
        self.params.push(name.to_string());
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }
}

/// Scoped symbol storage shared by the parser and expression compiler.
#[derive(Debug)]
pub struct CallContext {
    macros: HashMap<String, Value>,
    routines: HashMap<String, Routine>,
    frames: Vec<HashMap<String, SymbolKind>>,
    routine_depth: usize,
}

impl CallContext {
    pub fn new() -> Self {
        CallContext {
            macros: HashMap::new(),
            routines: HashMap::new(),
            frames: vec![HashMap::new()],
            routine_depth: 0,
        }
    }

    pub fn clear(&mut self) {
        self.macros.clear();
        self.routines.clear();
        self.frames.clear();
        self.frames.push(HashMap::new());
        self.routine_depth = 0;
    }

    /// Open a new frame; symbols in outer frames become invisible.
    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn enter_routine(&mut self) {
        self.routine_depth += 1;
    }

    pub fn exit_routine(&mut self) {
        self.routine_depth = self.routine_depth.saturating_sub(1);
    }

    pub fn in_routine(&self) -> bool {
        self.routine_depth > 0
    }

    pub fn add_macro(&mut self, name: &str, value: Value) {
        self.macros.insert(name.to_string(), value);
    }

    pub fn get_macro(&self, name: &str) -> Option<&Value> {
        self.macros.get(name)
    }

    pub fn add_routine(&mut self, routine: Routine) {
        self.routines.insert(routine.name().to_string(), routine);
    }

    pub fn get_routine(&self, name: &str) -> Option<&Routine> {
        self.routines.get(name)
    }

    pub fn add_variable(&mut self, name: &str) {
        self.current_frame().insert(name.to_string(), SymbolKind::Var);
    }

    pub fn add_param(&mut self, name: &str) {
        self.current_frame().insert(name.to_string(), SymbolKind::Param);
    }

    pub fn has_symbol_typed(&self, name: &str, kind: SymbolKind) -> bool {
        match kind {
            SymbolKind::Macro => self.macros.contains_key(name),
            SymbolKind::Routine => self.routines.contains_key(name),
            SymbolKind::Var | SymbolKind::Param => self
                .frames
                .last()
                .map(|frame| frame.get(name) == Some(&kind))
                .unwrap_or(false),
        }
    }

    /// True when the name resolves to a variable or parameter in the
    /// current frame.
    pub fn is_variable(&self, name: &str) -> bool {
        self.frames
            .last()
            .map(|frame| frame.contains_key(name))
            .unwrap_or(false)
    }

    fn current_frame(&mut self) -> &mut HashMap<String, SymbolKind> {
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
        self.frames.last_mut().expect("frame just ensured")
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_are_global() {
        let mut context = CallContext::new();
        context.add_macro("red", Value::Integer(0));
        context.push();
        assert_eq!(context.get_macro("red"), Some(&Value::Integer(0)));
        context.pop();
        assert_eq!(context.get_macro("red"), Some(&Value::Integer(0)));
    }

    #[test]
    fn test_variables_are_frame_local() {
        let mut context = CallContext::new();
        context.add_variable("x");
        assert!(context.is_variable("x"));
        context.push();
        assert!(!context.is_variable("x"));
        context.add_param("p");
        assert!(context.is_variable("p"));
        assert!(context.has_symbol_typed("p", SymbolKind::Param));
        assert!(!context.has_symbol_typed("p", SymbolKind::Var));
        context.pop();
        assert!(context.is_variable("x"));
    }

    #[test]
    fn test_routine_tracking() {
        let mut context = CallContext::new();
        let mut routine = Routine::new("blink");
        routine.add_param("light");
        assert!(routine.has_param("light"));
        context.add_routine(routine);
        assert!(context.get_routine("blink").is_some());
        assert!(!context.in_routine());
        context.enter_routine();
        assert!(context.in_routine());
        context.exit_routine();
        assert!(!context.in_routine());
    }
}
