//! Lowering context records.
//!
//! Lowering a function (named or lambda) pushes a [`LoweringContext`] and
//! popping it restores whatever was being lowered before. The bottom record
//! is the top level of the program, which has no function and no block.

use hashbrown::HashMap;

use crate::core::{BlockId, FuncId, RegId};

#[derive(Debug, Default)]
pub struct LoweringContext {
    pub function: Option<FuncId>,
    pub block: Option<BlockId>,
    /// Variable name to register, for the current lexical scope.
    pub variables: HashMap<String, RegId>,
    /// Registers released when this context is popped.
    pub owned: Vec<RegId>,
    /// Loops of this function only; a nested function starts with none.
    pub loops: LoopLabels,
    /// Values pushed and not yet popped.
    pub stack_depth: u32,
}

impl LoweringContext {
    pub fn top_level() -> Self {
        Self::default()
    }

    pub fn for_function(function: FuncId, block: BlockId) -> Self {
        Self {
            function: Some(function),
            block: Some(block),
            ..Self::default()
        }
    }

    /// Insertion point, if instructions emitted now have somewhere to go.
    pub fn insertion_point(&self) -> Option<(FuncId, BlockId)> {
        Some((self.function?, self.block?))
    }

    pub fn lookup(&self, name: &str) -> Option<RegId> {
        self.variables.get(name).copied()
    }

    /// Bind `name` to `reg` and take ownership of the register.
    pub fn bind_owned(&mut self, name: &str, reg: RegId) {
        self.variables.insert(name.to_string(), reg);
        self.owned.push(reg);
    }
}

/// Break/continue targets of the enclosing loops, innermost last.
#[derive(Debug, Default)]
pub struct LoopLabels {
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
}

impl LoopLabels {
    pub fn push(&mut self, break_label: &str, continue_label: &str) {
        self.break_labels.push(break_label.to_string());
        self.continue_labels.push(continue_label.to_string());
    }

    pub fn pop(&mut self) {
        self.break_labels.pop();
        self.continue_labels.pop();
    }

    pub fn break_target(&self) -> Option<&str> {
        self.break_labels.last().map(String::as_str)
    }

    pub fn continue_target(&self) -> Option<&str> {
        self.continue_labels.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.break_labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_label_stack() {
        let mut loops = LoopLabels::default();
        assert_eq!(loops.break_target(), None);

        loops.push("while_end_1", "while_loop_0");
        loops.push("for_end_3", "for_loop_2");
        assert_eq!(loops.break_target(), Some("for_end_3"));
        assert_eq!(loops.continue_target(), Some("for_loop_2"));

        loops.pop();
        assert_eq!(loops.break_target(), Some("while_end_1"));
        assert_eq!(loops.depth(), 1);
    }

    #[test]
    fn test_top_level_has_no_insertion_point() {
        let ctx = LoweringContext::top_level();
        assert_eq!(ctx.insertion_point(), None);
        let ctx = LoweringContext::for_function(FuncId(0), BlockId(0));
        assert_eq!(ctx.insertion_point(), Some((FuncId(0), BlockId(0))));
    }

    #[test]
    fn test_function_context_starts_outside_any_loop() {
        let mut outer = LoweringContext::for_function(FuncId(0), BlockId(0));
        outer.loops.push("while_end_1", "while_loop_0");
        let inner = LoweringContext::for_function(FuncId(1), BlockId(0));
        assert_eq!(inner.loops.depth(), 0);
        assert_eq!(inner.loops.break_target(), None);
    }
}
