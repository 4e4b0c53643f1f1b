//! ARM64 (AArch64) instruction words.
//!
//! Every instruction is exactly 4 bytes, appended little-endian. Register
//! arguments are the 5-bit register numbers.

pub const NOP: u32 = 0xD503201F;
pub const RET: u32 = 0xD65F03C0;

/// Append a 32-bit instruction word.
pub fn emit(buf: &mut Vec<u8>, insn: u32) {
    buf.extend_from_slice(&insn.to_le_bytes());
}

fn reg(r: u8) -> u32 {
    (r & 0x1F) as u32
}

/// MOVZ Xd, #imm16, LSL #shift
pub fn movz_x(buf: &mut Vec<u8>, rd: u8, imm16: u16, shift: u8) {
    let hw = (shift / 16) as u32;
    emit(buf, 0xD2800000 | (hw << 21) | ((imm16 as u32) << 5) | reg(rd));
}

/// MOVK Xd, #imm16, LSL #shift
pub fn movk_x(buf: &mut Vec<u8>, rd: u8, imm16: u16, shift: u8) {
    let hw = (shift / 16) as u32;
    emit(buf, 0xF2800000 | (hw << 21) | ((imm16 as u32) << 5) | reg(rd));
}

/// MOV Xd, Xm (ORR Xd, XZR, Xm)
pub fn mov_x(buf: &mut Vec<u8>, rd: u8, rm: u8) {
    emit(buf, 0xAA0003E0 | (reg(rm) << 16) | reg(rd));
}

/// ADD Xd, Xn, #imm12
pub fn add_imm_x(buf: &mut Vec<u8>, rd: u8, rn: u8, imm12: u16) {
    emit(buf, 0x91000000 | (((imm12 & 0xFFF) as u32) << 10) | (reg(rn) << 5) | reg(rd));
}

/// SUB Xd, Xn, #imm12
pub fn sub_imm_x(buf: &mut Vec<u8>, rd: u8, rn: u8, imm12: u16) {
    emit(buf, 0xD1000000 | (((imm12 & 0xFFF) as u32) << 10) | (reg(rn) << 5) | reg(rd));
}

/// ADD Xd, Xn, Xm
pub fn add_x(buf: &mut Vec<u8>, rd: u8, rn: u8, rm: u8) {
    emit(buf, 0x8B000000 | (reg(rm) << 16) | (reg(rn) << 5) | reg(rd));
}

/// SUB Xd, Xn, Xm
pub fn sub_x(buf: &mut Vec<u8>, rd: u8, rn: u8, rm: u8) {
    emit(buf, 0xCB000000 | (reg(rm) << 16) | (reg(rn) << 5) | reg(rd));
}

/// BL with a word offset (26-bit signed).
pub fn bl(buf: &mut Vec<u8>, offset: i32) {
    emit(buf, 0x94000000 | ((offset as u32) & 0x03FF_FFFF));
}

/// SVC #imm16
pub fn svc(buf: &mut Vec<u8>, imm16: u16) {
    emit(buf, 0xD4000001 | ((imm16 as u32) << 5));
}

pub fn ret(buf: &mut Vec<u8>) {
    emit(buf, RET);
}

pub fn nop(buf: &mut Vec<u8>) {
    emit(buf, NOP);
}

/// Load a 64-bit constant with MOVZ followed by MOVK for each non-zero
/// upper halfword.
pub fn load_imm64(buf: &mut Vec<u8>, rd: u8, value: u64) {
    movz_x(buf, rd, value as u16, 0);
    for shift in [16u8, 32, 48] {
        let part = (value >> shift) as u16;
        if part != 0 {
            movk_x(buf, rd, part, shift);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(buf: &[u8]) -> Vec<u32> {
        buf.chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_known_encodings() {
        let mut buf = Vec::new();
        movz_x(&mut buf, 0, 0, 0); // mov x0, #0
        movz_x(&mut buf, 16, 1, 0); // mov x16, #1
        svc(&mut buf, 0x80);
        ret(&mut buf);
        mov_x(&mut buf, 0, 1); // mov x0, x1
        add_x(&mut buf, 0, 0, 1); // add x0, x0, x1
        assert_eq!(
            words(&buf),
            vec![0xD2800000, 0xD2800030, 0xD4001001, 0xD65F03C0, 0xAA0103E0, 0x8B010000]
        );
    }

    #[test]
    fn test_load_imm64_skips_zero_halfwords() {
        let mut buf = Vec::new();
        load_imm64(&mut buf, 1, 0x0001_0000_0040_2000);
        let w = words(&buf);
        assert_eq!(w.len(), 3);
        assert_eq!(w[0], 0xD2800000 | (0x2000 << 5) | 1);
        assert_eq!(w[1], 0xF2800000 | (1 << 21) | (0x40 << 5) | 1);
        assert_eq!(w[2], 0xF2800000 | (3 << 21) | (1 << 5) | 1);
    }
}
