//! Minimal x86-64 programs written when a compilation produced no code.
//!
//! Assembled with iced-x86 so each stub is checked by a real assembler.

use iced_x86::code_asm::*;
use iced_x86::IcedError;

/// `ExitProcess(0)` style stub. The call target is a zero placeholder that a
/// loader-aware linker would patch.
pub fn windows_exit(base: u64) -> Result<Vec<u8>, IcedError> {
    let mut a = CodeAssembler::new(64)?;
    a.mov(rcx, 0i64)?;
    a.mov(rax, 0i64)?;
    a.call(rax)?;
    a.ret()?;
    a.assemble(base)
}

/// BSD `exit(0)` syscall.
pub fn macos_exit(base: u64) -> Result<Vec<u8>, IcedError> {
    let mut a = CodeAssembler::new(64)?;
    a.mov(rax, 0x200_0001i64)?;
    a.mov(rdi, 0i64)?;
    a.syscall()?;
    a.ret()?;
    a.assemble(base)
}

/// `write(1, message, len)` followed by `exit(0)`.
pub fn linux_write_exit(base: u64, message_addr: u64, message_len: usize) -> Result<Vec<u8>, IcedError> {
    let mut a = CodeAssembler::new(64)?;
    a.mov(rax, 1i64)?;
    a.mov(rdi, 1i64)?;
    a.mov(rsi, message_addr as i64)?;
    a.mov(rdx, message_len as i64)?;
    a.syscall()?;
    a.mov(rax, 60i64)?;
    a.xor(rdi, rdi)?;
    a.syscall()?;
    a.assemble(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::{Decoder, DecoderOptions, Mnemonic};

    fn mnemonics(code: &[u8]) -> Vec<Mnemonic> {
        Decoder::new(64, code, DecoderOptions::NONE)
            .into_iter()
            .map(|instr| instr.mnemonic())
            .collect()
    }

    #[test]
    fn test_windows_stub_calls_and_returns() -> Result<(), IcedError> {
        let code = windows_exit(0x1000)?;
        assert_eq!(
            mnemonics(&code),
            vec![Mnemonic::Mov, Mnemonic::Mov, Mnemonic::Call, Mnemonic::Ret]
        );
        Ok(())
    }

    #[test]
    fn test_linux_stub_embeds_message_address() -> Result<(), IcedError> {
        let code = linux_write_exit(0x401000, 0x402000, 37)?;
        let decoded: Vec<_> = Decoder::new(64, &code, DecoderOptions::NONE).into_iter().collect();
        assert_eq!(decoded[2].immediate(1), 0x402000);
        assert_eq!(
            decoded.iter().filter(|i| i.mnemonic() == Mnemonic::Syscall).count(),
            2
        );
        Ok(())
    }

    #[test]
    fn test_macos_stub() -> Result<(), IcedError> {
        let code = macos_exit(0x1000)?;
        assert_eq!(
            mnemonics(&code),
            vec![Mnemonic::Mov, Mnemonic::Mov, Mnemonic::Syscall, Mnemonic::Ret]
        );
        Ok(())
    }
}
