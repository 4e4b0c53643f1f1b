//! Minimal AArch64 programs written when a compilation produced no code.

use super::encoding::{load_imm64, movz_x, ret, svc};

/// Darwin `exit(0)`: syscall number in x16, trap with `svc #0x80`.
pub fn macos_exit() -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    movz_x(&mut buf, 0, 0, 0);
    movz_x(&mut buf, 16, 1, 0);
    svc(&mut buf, 0x80);
    ret(&mut buf);
    buf
}

/// Linux `write(1, message, len)` then `exit(0)`; syscall number in x8.
pub fn linux_write_exit(message_addr: u64, message_len: usize) -> Vec<u8> {
    const SYS_WRITE: u16 = 64;
    const SYS_EXIT: u16 = 93;

    let mut buf = Vec::with_capacity(48);
    movz_x(&mut buf, 0, 1, 0);
    load_imm64(&mut buf, 1, message_addr);
    movz_x(&mut buf, 2, message_len as u16, 0);
    movz_x(&mut buf, 8, SYS_WRITE, 0);
    svc(&mut buf, 0);
    movz_x(&mut buf, 0, 0, 0);
    movz_x(&mut buf, 8, SYS_EXIT, 0);
    svc(&mut buf, 0);
    buf
}
