//! Symbol information published by the semantic analyzer.
//!
//! Lowering consults a [`SymbolTable`] only for identifiers that are not
//! already bound to a local or class-member register. Any analyzer can be
//! plugged in by implementing the trait; [`GlobalScope`] is a plain
//! map-backed implementation.

use hashbrown::{HashMap, HashSet};

/// Read-only view of the analyzer's global scope and class table.
pub trait SymbolTable {
    /// Whether `name` is a variable or constant in the global scope.
    fn has_global_symbol(&self, name: &str) -> bool;

    /// Whether `name` is a function signature in the global scope.
    fn has_global_function(&self, name: &str) -> bool;

    /// Whether class `class` declares a member variable `name`.
    fn class_has_member(&self, class: &str, name: &str) -> bool;

    /// Whether class `class` declares a method `name`.
    fn class_has_method(&self, class: &str, name: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub base_class: String,
    pub members: HashSet<String>,
    pub methods: HashSet<String>,
}

/// Map-backed [`SymbolTable`].
#[derive(Debug, Clone, Default)]
pub struct GlobalScope {
    symbols: HashSet<String>,
    functions: HashSet<String>,
    classes: HashMap<String, ClassInfo>,
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_symbol(&mut self, name: impl Into<String>) -> &mut Self {
        self.symbols.insert(name.into());
        self
    }

    pub fn define_function(&mut self, name: impl Into<String>) -> &mut Self {
        self.functions.insert(name.into());
        self
    }

    /// Get or create the class entry for `name`.
    pub fn class_mut(&mut self, name: impl Into<String>) -> &mut ClassInfo {
        self.classes.entry(name.into()).or_default()
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }
}

impl SymbolTable for GlobalScope {
    fn has_global_symbol(&self, name: &str) -> bool {
        self.symbols.contains(name)
    }

    fn has_global_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    fn class_has_member(&self, class: &str, name: &str) -> bool {
        self.classes
            .get(class)
            .is_some_and(|info| info.members.contains(name))
    }

    fn class_has_method(&self, class: &str, name: &str) -> bool {
        self.classes
            .get(class)
            .is_some_and(|info| info.methods.contains(name))
    }
}
