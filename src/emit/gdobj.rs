//! Placeholder object file.
//!
//! Layout, all integers little-endian `u32`:
//!
//! ```text
//! "GDOBJ" count { name_len name[name_len] instr_count opcode[instr_count] }*
//! ```
//!
//! Opcodes are written as their declaration-order numbers. Operands and
//! immediates are not recorded.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::core::Function;

pub const MAGIC: &[u8; 5] = b"GDOBJ";

pub fn write<W: Write>(w: &mut W, functions: &[Function]) -> io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_all(&(functions.len() as u32).to_le_bytes())?;
    for func in functions {
        w.write_all(&(func.name.len() as u32).to_le_bytes())?;
        w.write_all(func.name.as_bytes())?;
        w.write_all(&(func.instruction_count() as u32).to_le_bytes())?;
        for instr in func.instructions() {
            w.write_all(&instr.opcode.number().to_le_bytes())?;
        }
    }
    Ok(())
}

pub fn encode(functions: &[Function]) -> Vec<u8> {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write(&mut buf, functions);
    buf
}

pub fn write_object(path: &Path, functions: &[Function]) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write(&mut w, functions)?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Instruction, Opcode, RegClass, RegisterFile};

    #[test]
    fn test_layout() {
        let mut regs = RegisterFile::new();
        let r = regs.allocate(RegClass::General);
        let mut f = Function::new("main");
        let entry = f.create_block("main_entry");
        f.block_mut(entry).push(Instruction::with_immediate(Opcode::Mov, r, 7));
        f.block_mut(entry).push(Instruction::new(Opcode::Ret));

        let bytes = encode(&[f]);
        let mut expected = b"GDOBJ".to_vec();
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(b"main");
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&Opcode::Mov.number().to_le_bytes());
        expected.extend_from_slice(&Opcode::Ret.number().to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_no_functions() {
        assert_eq!(encode(&[]), b"GDOBJ\0\0\0\0".to_vec());
    }
}
