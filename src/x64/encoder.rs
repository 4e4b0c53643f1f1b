// This module encodes IR instructions into x86-64 machine code through iced-x86. Every IR form
// is mapped onto exactly one iced `Code`, which pins the encoding and therefore its length: MOV,
// ADD and SUB use the REX.W register/imm32 forms (7 bytes) and register/register forms
// (3 bytes), CALL is `Call_rel32_64` encoded against its own end so the displacement is a zero
// placeholder (no relocations exist yet), RET, PUSH, POP and NOP are single bytes. Every other
// opcode degrades to NOP (0x90). Register numbers are the operand's index within its bank
// (0..7), so no REX.B/REX.R extension is ever needed. Three-operand IR instructions use the
// destination and the last source.

//! x86-64 instruction encoding for the register IR using iced-x86.

use iced_x86::{Code, Encoder, IcedError, Register};

use crate::core::{Instruction, Opcode, RegId, RegisterFile};
use crate::encoder::InstructionEncoder;
use crate::target::Architecture;

pub const NOP: u8 = 0x90;

/// Length of `call rel32`; a branch to this address encoded at rip 0 has a zero displacement.
const CALL_REL32_LEN: u64 = 5;

const GP64_REGS: [Register; 8] = [
    Register::RAX,
    Register::RCX,
    Register::RDX,
    Register::RBX,
    Register::RSP,
    Register::RBP,
    Register::RSI,
    Register::RDI,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct X64Encoder;

impl X64Encoder {
    pub fn new() -> Self {
        Self
    }
}

fn gp64(regs: &RegisterFile, reg: Option<&RegId>) -> Register {
    let index = reg.map(|r| regs.get(*r).hw_index()).unwrap_or(0);
    GP64_REGS[usize::from(index & 7)]
}

/// Select the iced instruction for one IR instruction.
pub fn select(instr: &Instruction, regs: &RegisterFile) -> Result<iced_x86::Instruction, IcedError> {
    let dst = gp64(regs, instr.operands.first());
    let src = gp64(regs, instr.operands.iter().skip(1).last());

    // Immediates wider than 32 bits are truncated to the imm32 field.
    Ok(match (instr.opcode, instr.immediate) {
        (Opcode::Mov, Some(imm)) => iced_x86::Instruction::with2(Code::Mov_rm64_imm32, dst, imm as i32)?,
        (Opcode::Mov, None) => iced_x86::Instruction::with2(Code::Mov_rm64_r64, dst, src)?,
        (Opcode::Add, Some(imm)) => iced_x86::Instruction::with2(Code::Add_rm64_imm32, dst, imm as i32)?,
        (Opcode::Add, None) => iced_x86::Instruction::with2(Code::Add_rm64_r64, dst, src)?,
        (Opcode::Sub, Some(imm)) => iced_x86::Instruction::with2(Code::Sub_rm64_imm32, dst, imm as i32)?,
        (Opcode::Sub, None) => iced_x86::Instruction::with2(Code::Sub_rm64_r64, dst, src)?,
        (Opcode::Call, _) => iced_x86::Instruction::with_branch(Code::Call_rel32_64, CALL_REL32_LEN)?,
        (Opcode::Ret, _) => iced_x86::Instruction::with(Code::Retnq),
        (Opcode::Push, _) => iced_x86::Instruction::with1(Code::Push_r64, dst)?,
        (Opcode::Pop, _) => iced_x86::Instruction::with1(Code::Pop_r64, dst)?,
        _ => iced_x86::Instruction::with(Code::Nopd),
    })
}

/// Encode a single instruction at rip 0.
pub fn assemble(instr: &iced_x86::Instruction) -> Result<Vec<u8>, IcedError> {
    let mut encoder = Encoder::new(64);
    encoder.encode(instr, 0)?;
    Ok(encoder.take_buffer())
}

impl InstructionEncoder for X64Encoder {
    fn architecture(&self) -> Architecture {
        Architecture::X86_64
    }

    fn nop(&self) -> &'static [u8] {
        &[NOP]
    }

    fn encode(&self, instr: &Instruction, regs: &RegisterFile, buf: &mut Vec<u8>) {
        match select(instr, regs).and_then(|selected| assemble(&selected)) {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(err) => {
                log::error!("cannot encode {} for x86-64: {err}", instr.opcode.mnemonic());
                buf.push(NOP);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RegClass;
    use iced_x86::{Decoder, DecoderOptions, Mnemonic, OpKind};

    fn decode_one(bytes: &[u8]) -> iced_x86::Instruction {
        let mut decoder = Decoder::new(64, bytes, DecoderOptions::NONE);
        let instr = decoder.decode();
        assert_eq!(instr.len(), bytes.len(), "trailing bytes in {bytes:02x?}");
        instr
    }

    fn encode(instr: &Instruction, regs: &RegisterFile) -> Vec<u8> {
        let mut buf = Vec::new();
        X64Encoder.encode(instr, regs, &mut buf);
        buf
    }

    #[test]
    fn test_mov_imm_decodes() {
        let regs = RegisterFile::new();
        let rbx = regs.physical(RegClass::General)[3];
        let buf = encode(&Instruction::with_immediate(Opcode::Mov, rbx, 42), &regs);
        assert_eq!(buf, vec![0x48, 0xC7, 0xC3, 42, 0, 0, 0]);

        let instr = decode_one(&buf);
        assert_eq!(instr.mnemonic(), Mnemonic::Mov);
        assert_eq!(instr.op0_register(), Register::RBX);
        assert_eq!(instr.op1_kind(), OpKind::Immediate32to64);
        assert_eq!(instr.immediate32to64(), 42);
    }

    #[test]
    fn test_register_forms_decode() {
        let regs = RegisterFile::new();
        let gp = regs.physical(RegClass::General);

        let buf = encode(&Instruction::with_operands(Opcode::Add, &[gp[1], gp[2]]), &regs);
        let instr = decode_one(&buf);
        assert_eq!(instr.mnemonic(), Mnemonic::Add);
        assert_eq!(instr.op0_register(), Register::RCX);
        assert_eq!(instr.op1_register(), Register::RDX);

        let buf = encode(&Instruction::with_immediate(Opcode::Sub, gp[0], -1), &regs);
        assert_eq!(buf, vec![0x48, 0x81, 0xE8, 0xFF, 0xFF, 0xFF, 0xFF]);
        let instr = decode_one(&buf);
        assert_eq!(instr.mnemonic(), Mnemonic::Sub);
        assert_eq!(instr.immediate32to64(), -1);

        let buf = encode(&Instruction::with_operands(Opcode::Push, &[gp[7]]), &regs);
        assert_eq!(buf, vec![0x57]);
        assert_eq!(decode_one(&buf).op0_register(), Register::RDI);
    }

    #[test]
    fn test_encoder_uses_bank_indices() {
        let mut regs = RegisterFile::new();
        let a = regs.allocate(RegClass::General);
        let b = regs.allocate(RegClass::General);
        let c = regs.allocate(RegClass::General);

        // add rdx, rcx
        assert_eq!(encode(&Instruction::with_operands(Opcode::Add, &[c, a, b]), &regs), vec![0x48, 0x01, 0xCA]);
    }

    #[test]
    fn test_call_has_zero_displacement() {
        let regs = RegisterFile::new();
        let buf = encode(&Instruction::with_target(Opcode::Call, "print"), &regs);
        assert_eq!(buf, vec![0xE8, 0, 0, 0, 0]);
        let instr = decode_one(&buf);
        assert_eq!(instr.mnemonic(), Mnemonic::Call);
        assert_eq!(instr.near_branch64(), CALL_REL32_LEN);
    }

    #[test]
    fn test_fixed_lengths_and_nop_fallback() {
        let regs = RegisterFile::new();
        let r0 = regs.physical(RegClass::General)[0];
        let cases = [
            (Instruction::with_immediate(Opcode::Mov, r0, 1 << 20), 7),
            (Instruction::with_operands(Opcode::Mov, &[r0, r0]), 3),
            (Instruction::with_target(Opcode::Call, "f"), 5),
            (Instruction::new(Opcode::Ret), 1),
            (Instruction::with_operands(Opcode::Mul, &[r0, r0, r0]), 1),
            (Instruction::with_target(Opcode::Jmp, "l"), 1),
        ];
        for (instr, len) in cases {
            assert_eq!(encode(&instr, &regs).len(), len, "{:?}", instr.opcode);
        }

        assert_eq!(encode(&Instruction::with_operands(Opcode::Xor, &[r0, r0]), &regs), vec![NOP]);
    }

    #[test]
    fn test_every_opcode_round_trips_through_decoder() {
        let regs = RegisterFile::new();
        let gp = regs.physical(RegClass::General);
        for opcode in Opcode::ALL {
            for instr in [
                Instruction::with_operands(opcode, &[gp[5], gp[6]]),
                Instruction::with_immediate(opcode, gp[2], 0x1234),
            ] {
                let bytes = encode(&instr, &regs);
                let decoded = decode_one(&bytes);
                assert_ne!(decoded.code(), Code::INVALID, "{opcode:?}");

                // Re-encoding what the decoder saw must reproduce the same bytes.
                let selected = select(&instr, &regs).unwrap();
                assert_eq!(decoded.code(), selected.code(), "{opcode:?}");
                assert_eq!(assemble(&decoded).unwrap(), bytes, "{opcode:?}");
            }
        }
    }
}
