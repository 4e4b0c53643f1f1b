// This module gathers the pieces shared by every stage of the code generator: the IR data
// model (registers, instructions, basic blocks, functions), the register arena with its fixed
// physical pool and linear-scan binding pass, the error and diagnostic types, and the
// per-compilation statistics. Lowering writes into these structures, the optimization passes
// rewrite them in place, and the encoders and emitters read them.

//! Core code-generator infrastructure.
//!
//! # Key Components
//!
//! ## IR (`ir`)
//! - Registers referenced through copyable [`RegId`] handles
//! - Instructions, basic blocks with CFG edges, functions
//!
//! ## Register Allocation (`register_file`)
//! - 8 general + 8 floating-point physical registers, bitset tracking
//! - Virtual overflow and the post-lowering binding pass
//!
//! ## Errors (`error`)
//! - Recorded diagnostics with the node kind that raised them

pub mod error;
pub mod ir;
pub mod register_file;
pub mod stats;

pub use error::{CodegenError, CodegenResult, Diagnostic, Diagnostics};
pub use ir::{
    BasicBlock, BlockId, FuncId, Function, Instruction, Opcode, RegClass, RegId, Register,
    RegisterKind,
};
pub use register_file::{RegBitSet, RegisterFile};
pub use stats::CompilationStats;
