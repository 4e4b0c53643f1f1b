//! Architecture dispatch for instruction encoding.
//!
//! Encoding never fails: every opcode/operand shape maps to a fixed-length
//! byte sequence, and anything an encoder does not handle becomes that
//! architecture's NOP.

use crate::arm64::Arm64Encoder;
use crate::core::{Function, Instruction, RegisterFile};
use crate::target::Architecture;
use crate::x64::X64Encoder;

pub trait InstructionEncoder {
    fn architecture(&self) -> Architecture;

    /// Encoding of the architecture's no-op.
    fn nop(&self) -> &'static [u8];

    /// Append the encoding of `instr` to `buf`.
    fn encode(&self, instr: &Instruction, regs: &RegisterFile, buf: &mut Vec<u8>);
}

/// Encoder for architectures without a backend: one `0x90` per instruction.
#[derive(Debug, Clone)]
pub struct NeutralEncoder {
    name: String,
}

impl InstructionEncoder for NeutralEncoder {
    fn architecture(&self) -> Architecture {
        Architecture::Unknown(self.name.clone())
    }

    fn nop(&self) -> &'static [u8] {
        &[0x90]
    }

    fn encode(&self, _instr: &Instruction, _regs: &RegisterFile, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.nop());
    }
}

pub fn encoder_for(arch: &Architecture) -> Box<dyn InstructionEncoder> {
    match arch {
        Architecture::X86_64 => Box::new(X64Encoder::new()),
        Architecture::Aarch64 => Box::new(Arm64Encoder::new()),
        Architecture::Unknown(name) => {
            log::warn!("no encoder for architecture {name}, emitting NOPs");
            Box::new(NeutralEncoder { name: name.clone() })
        }
    }
}

/// Encode a single instruction for `arch`.
pub fn encode_instruction(arch: &Architecture, instr: &Instruction, regs: &RegisterFile) -> Vec<u8> {
    let mut buf = Vec::new();
    encoder_for(arch).encode(instr, regs, &mut buf);
    buf
}

/// Concatenated machine code of every instruction, in function and block
/// order. LABEL pseudo-instructions are encoded like any other unmapped
/// opcode.
pub fn generate_machine_code(
    arch: &Architecture,
    functions: &[Function],
    regs: &RegisterFile,
) -> Vec<u8> {
    let encoder = encoder_for(arch);
    let mut code = Vec::new();
    for func in functions {
        let start = code.len();
        for instr in func.instructions() {
            encoder.encode(instr, regs, &mut code);
        }
        log::trace!("{}: {} bytes of {} code", func.name, code.len() - start, arch);
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Opcode, RegClass};

    #[test]
    fn test_unknown_architecture_emits_single_nop() {
        let regs = RegisterFile::new();
        let arch = Architecture::from_name("mips");
        let bytes = encode_instruction(&arch, &Instruction::new(Opcode::Ret), &regs);
        assert_eq!(bytes, vec![0x90]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut regs = RegisterFile::new();
        let r = regs.allocate(RegClass::General);
        let instr = Instruction::with_immediate(Opcode::Add, r, 9);
        for arch in [Architecture::X86_64, Architecture::Aarch64] {
            assert_eq!(
                encode_instruction(&arch, &instr, &regs),
                encode_instruction(&arch, &instr, &regs)
            );
        }
    }

    #[test]
    fn test_machine_code_concatenates_functions() {
        let regs = RegisterFile::new();
        let mut a = Function::new("a");
        let block = a.create_block("a_entry");
        a.block_mut(block).push(Instruction::new(Opcode::Nop));
        a.block_mut(block).push(Instruction::new(Opcode::Ret));
        let mut b = Function::new("b");
        let block = b.create_block("b_entry");
        b.block_mut(block).push(Instruction::new(Opcode::Ret));

        let code = generate_machine_code(&Architecture::X86_64, &[a, b], &regs);
        assert_eq!(code, vec![0x90, 0xC3, 0xC3]);
    }
}
