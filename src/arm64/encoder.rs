// This module encodes IR instructions into AArch64 machine code. All encodings are single
// 4-byte words: MOV uses MOVZ (imm16) or ORR-with-XZR, ADD and SUB use their imm12 or
// shifted-register forms, CALL is a BL with a zero offset placeholder, RET and NOP are fixed
// words, and any other opcode degrades to NOP. Immediates that do not fit the field are
// truncated to it. Register fields carry the operand's index within its bank.

//! ARM64 instruction encoding for the register IR.

use super::encoding;
use crate::core::{Instruction, Opcode, RegId, RegisterFile};
use crate::encoder::InstructionEncoder;
use crate::target::Architecture;

static NOP_BYTES: [u8; 4] = encoding::NOP.to_le_bytes();

#[derive(Debug, Clone, Copy, Default)]
pub struct Arm64Encoder;

impl Arm64Encoder {
    pub fn new() -> Self {
        Self
    }
}

fn hw(regs: &RegisterFile, reg: Option<&RegId>) -> u8 {
    reg.map(|r| regs.get(*r).hw_index()).unwrap_or(0)
}

impl InstructionEncoder for Arm64Encoder {
    fn architecture(&self) -> Architecture {
        Architecture::Aarch64
    }

    fn nop(&self) -> &'static [u8] {
        &NOP_BYTES
    }

    fn encode(&self, instr: &Instruction, regs: &RegisterFile, buf: &mut Vec<u8>) {
        let ops = &instr.operands;
        let rd = hw(regs, ops.first());
        // Two-operand forms read and write the destination.
        let rn = if ops.len() >= 3 { hw(regs, ops.get(1)) } else { rd };
        let rm = hw(regs, ops.iter().skip(1).last());

        match (instr.opcode, instr.immediate) {
            (Opcode::Mov, Some(imm)) => encoding::movz_x(buf, rd, imm as u16, 0),
            (Opcode::Mov, None) => encoding::mov_x(buf, rd, rm),
            (Opcode::Add, Some(imm)) => encoding::add_imm_x(buf, rd, rn, (imm & 0xFFF) as u16),
            (Opcode::Add, None) => encoding::add_x(buf, rd, rn, rm),
            (Opcode::Sub, Some(imm)) => encoding::sub_imm_x(buf, rd, rn, (imm & 0xFFF) as u16),
            (Opcode::Sub, None) => encoding::sub_x(buf, rd, rn, rm),
            (Opcode::Call, _) => encoding::bl(buf, 0),
            (Opcode::Ret, _) => encoding::ret(buf),
            _ => encoding::nop(buf),
        }
    }
}
