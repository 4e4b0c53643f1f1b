//! Assembly text output.
//!
//! The listing is informational: it uses the IR mnemonics and register
//! names rather than any real assembler syntax.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::core::{Function, RegisterFile};

const HEADER: &str = ".section .text\n.global _start\n\n";

/// Render every function as `name:` followed by its instructions indented
/// by four spaces, with a blank line after each function.
pub fn render(functions: &[Function], regs: &RegisterFile) -> String {
    let mut out = String::from(HEADER);
    for func in functions {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}:", func.name);
        for instr in func.instructions() {
            let _ = writeln!(out, "    {}", instr.render(regs));
        }
        out.push('\n');
    }
    out
}

pub fn write_assembly(path: &Path, functions: &[Function], regs: &RegisterFile) -> io::Result<()> {
    fs::write(path, render(functions, regs))
}
