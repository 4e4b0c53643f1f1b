//! Per-compilation counters.

/// Counters gathered by one [`crate::CodeGenerator::generate`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationStats {
    pub functions: usize,
    pub blocks: usize,
    /// Instructions left after dead-code elimination.
    pub instructions: usize,
    pub nops_removed: usize,
    pub labels_generated: u32,
    pub virtual_registers: u32,
    /// Operands rewritten by the register binding pass.
    pub operands_rebound: usize,
    pub code_bytes: usize,
    pub diagnostics: usize,
}

impl CompilationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Display for CompilationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} functions, {} blocks, {} instructions ({} nops removed), \
             {} labels, {} virtual registers ({} operands rebound), {} code bytes, {} diagnostics",
            self.functions,
            self.blocks,
            self.instructions,
            self.nops_removed,
            self.labels_generated,
            self.virtual_registers,
            self.operands_rebound,
            self.code_bytes,
            self.diagnostics
        )
    }
}
