//! gdcodegen - backend of a small GDScript-style compiler.
//!
//! Takes the parser's AST (optionally with the semantic analyzer's global
//! scope), lowers it to an architecture-independent register IR, binds
//! leftover virtual registers, encodes x86-64 or ARM64 machine code and
//! writes assembly text, a placeholder object file and minimal native
//! executables for Windows, macOS and Linux.
//!
//! # Usage
//!
//! ```no_run
//! use gdcodegen::ast::{AstNode, Expr, Program, Stmt};
//! use gdcodegen::{CodeGenerator, CodegenOptions, OutputFormat, TargetPlatform};
//!
//! let program = Program::new(vec![Stmt::func(
//!     "main",
//!     vec![],
//!     "int",
//!     vec![Stmt::Return(Some(Expr::int(0)))],
//! )]);
//! let options = CodegenOptions::new(TargetPlatform::LinuxX64, OutputFormat::Executable);
//! let mut generator = CodeGenerator::new(options);
//! if !generator.generate(Some(&AstNode::from(program)), "hello") {
//!     for error in generator.errors() {
//!         eprintln!("{error}");
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`ast`], [`symbols`] - input contracts of the parser and analyzer
//! - [`lower`] - AST to IR lowering
//! - [`core`] - IR, register arena, errors and statistics
//! - [`encoder`], [`x64`], [`arm64`] - instruction encoding
//! - [`emit`] - assembly, object and executable writers
//! - [`codegen`] - the [`CodeGenerator`] driving all of the above

pub mod ast;
pub mod symbols;

pub mod core;
pub mod lower;
pub mod target;

pub mod arm64;
pub mod encoder;
pub mod x64;

pub mod codegen;
pub mod emit;

pub use codegen::CodeGenerator;
pub use core::{
    CodegenError, CodegenResult, CompilationStats, Diagnostic, Diagnostics, Function,
    Instruction, Opcode, RegId, RegisterFile,
};
pub use symbols::{GlobalScope, SymbolTable};
pub use target::{Architecture, CodegenOptions, OutputFormat, TargetOs, TargetPlatform};
