//! ELF64 executable generation.
//!
//! Minimal static Linux executables: one read/execute `PT_LOAD` covering the
//! headers and code, one read/write `PT_LOAD` for the data region, and a
//! section table (`.text`, `.data`, `.shstrtab`) so tools can inspect the
//! result.

use std::io::{self, Write};

use object::elf::{
    ELFCLASS64, ELFDATA2LSB, ELFMAG, ELFOSABI_SYSV, EM_AARCH64, EM_X86_64, ET_EXEC, EV_CURRENT,
    PF_R, PF_W, PF_X, PT_LOAD, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_PROGBITS, SHT_STRTAB,
};

use super::{align_up, stub_error};
use crate::target::Architecture;
use crate::{arm64, x64};

pub mod consts {
    pub const EHDR_SIZE: u16 = 64;
    pub const PHDR_SIZE: u16 = 56;
    pub const SHDR_SIZE: u16 = 64;

    pub const LOAD_ADDR: u64 = 0x400000;
    pub const CODE_OFFSET: u64 = 0x1000;
    pub const PAGE_SIZE: u64 = 0x1000;

    pub const SHSTRTAB: &[u8] = b"\0.text\0.data\0.shstrtab\0";
    pub const TEXT_NAME: u32 = 1;
    pub const DATA_NAME: u32 = 7;
    pub const SHSTRTAB_NAME: u32 = 13;
}

#[derive(Debug, Clone)]
pub struct Elf64Header {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_phnum: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl Elf64Header {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut ident = [0u8; 16];
        ident[..4].copy_from_slice(&ELFMAG);
        ident[4] = ELFCLASS64;
        ident[5] = ELFDATA2LSB;
        ident[6] = EV_CURRENT;
        ident[7] = ELFOSABI_SYSV;
        w.write_all(&ident)?;
        w.write_all(&self.e_type.to_le_bytes())?;
        w.write_all(&self.e_machine.to_le_bytes())?;
        w.write_all(&(EV_CURRENT as u32).to_le_bytes())?;
        w.write_all(&self.e_entry.to_le_bytes())?;
        w.write_all(&self.e_phoff.to_le_bytes())?;
        w.write_all(&self.e_shoff.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // e_flags
        w.write_all(&consts::EHDR_SIZE.to_le_bytes())?;
        w.write_all(&consts::PHDR_SIZE.to_le_bytes())?;
        w.write_all(&self.e_phnum.to_le_bytes())?;
        w.write_all(&consts::SHDR_SIZE.to_le_bytes())?;
        w.write_all(&self.e_shnum.to_le_bytes())?;
        w.write_all(&self.e_shstrndx.to_le_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Elf64ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl Elf64ProgramHeader {
    fn load(flags: u32, offset: u64, size: u64) -> Self {
        Self {
            p_type: PT_LOAD as u32,
            p_flags: flags,
            p_offset: offset,
            p_vaddr: consts::LOAD_ADDR + offset,
            p_filesz: size,
            p_memsz: size,
            p_align: consts::PAGE_SIZE,
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.p_type.to_le_bytes())?;
        w.write_all(&self.p_flags.to_le_bytes())?;
        w.write_all(&self.p_offset.to_le_bytes())?;
        w.write_all(&self.p_vaddr.to_le_bytes())?;
        w.write_all(&self.p_vaddr.to_le_bytes())?; // p_paddr
        w.write_all(&self.p_filesz.to_le_bytes())?;
        w.write_all(&self.p_memsz.to_le_bytes())?;
        w.write_all(&self.p_align.to_le_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Elf64SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_addralign: u64,
}

impl Elf64SectionHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.sh_name.to_le_bytes())?;
        w.write_all(&self.sh_type.to_le_bytes())?;
        w.write_all(&self.sh_flags.to_le_bytes())?;
        w.write_all(&self.sh_addr.to_le_bytes())?;
        w.write_all(&self.sh_offset.to_le_bytes())?;
        w.write_all(&self.sh_size.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // sh_link
        w.write_all(&0u32.to_le_bytes())?; // sh_info
        w.write_all(&self.sh_addralign.to_le_bytes())?;
        w.write_all(&0u64.to_le_bytes())?; // sh_entsize
        Ok(())
    }
}

/// Data region offset for `code_len` bytes of code.
pub fn data_offset(code_len: usize) -> u64 {
    align_up(consts::CODE_OFFSET + code_len as u64, consts::PAGE_SIZE)
}

#[derive(Debug)]
pub struct Elf64Builder {
    arch: Architecture,
    code: Vec<u8>,
    data: Vec<u8>,
}

impl Elf64Builder {
    pub fn new(arch: Architecture) -> Self {
        Self {
            arch,
            code: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn code(mut self, code: Vec<u8>) -> Self {
        self.code = code;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn entry_point(&self) -> u64 {
        consts::LOAD_ADDR + consts::CODE_OFFSET
    }

    fn machine(&self) -> u16 {
        match self.arch {
            Architecture::Aarch64 => EM_AARCH64 as u16,
            _ => EM_X86_64 as u16,
        }
    }

    /// `write(1, data, len)` + `exit(0)`. The data address depends on the
    /// code length only through page alignment, so a first pass with a
    /// dummy address fixes the layout.
    fn fallback_code(&self) -> io::Result<Vec<u8>> {
        let len = self.data.len().saturating_sub(1);
        let stub = |addr: u64| -> io::Result<Vec<u8>> {
            match self.arch {
                Architecture::Aarch64 => Ok(arm64::stubs::linux_write_exit(addr, len)),
                _ => x64::stubs::linux_write_exit(self.entry_point(), addr, len).map_err(stub_error),
            }
        };
        let provisional = stub(0)?;
        stub(consts::LOAD_ADDR + data_offset(provisional.len()))
    }

    pub fn build(mut self) -> io::Result<Vec<u8>> {
        if self.code.is_empty() {
            log::debug!("no machine code, using the {} exit stub", self.arch);
            self.code = self.fallback_code()?;
        }

        let code_len = self.code.len() as u64;
        let data_off = data_offset(self.code.len());
        let shstrtab_off = data_off + self.data.len() as u64;
        let shoff = align_up(shstrtab_off + consts::SHSTRTAB.len() as u64, 8);

        let ehdr = Elf64Header {
            e_type: ET_EXEC as u16,
            e_machine: self.machine(),
            e_entry: self.entry_point(),
            e_phoff: consts::EHDR_SIZE as u64,
            e_shoff: shoff,
            e_phnum: 2,
            e_shnum: 4,
            e_shstrndx: 3,
        };
        let text_seg = Elf64ProgramHeader::load((PF_R | PF_X) as u32, 0, consts::CODE_OFFSET + code_len);
        let data_seg = Elf64ProgramHeader::load((PF_R | PF_W) as u32, data_off, self.data.len() as u64);

        let sections = [
            Elf64SectionHeader::default(),
            Elf64SectionHeader {
                sh_name: consts::TEXT_NAME,
                sh_type: SHT_PROGBITS as u32,
                sh_flags: (SHF_ALLOC | SHF_EXECINSTR) as u64,
                sh_addr: consts::LOAD_ADDR + consts::CODE_OFFSET,
                sh_offset: consts::CODE_OFFSET,
                sh_size: code_len,
                sh_addralign: 16,
            },
            Elf64SectionHeader {
                sh_name: consts::DATA_NAME,
                sh_type: SHT_PROGBITS as u32,
                sh_flags: (SHF_ALLOC | SHF_WRITE) as u64,
                sh_addr: consts::LOAD_ADDR + data_off,
                sh_offset: data_off,
                sh_size: self.data.len() as u64,
                sh_addralign: 8,
            },
            Elf64SectionHeader {
                sh_name: consts::SHSTRTAB_NAME,
                sh_type: SHT_STRTAB as u32,
                sh_offset: shstrtab_off,
                sh_size: consts::SHSTRTAB.len() as u64,
                sh_addralign: 1,
                ..Default::default()
            },
        ];

        let total = shoff + sections.len() as u64 * consts::SHDR_SIZE as u64;
        let mut buf = Vec::with_capacity(total as usize);
        ehdr.write(&mut buf)?;
        text_seg.write(&mut buf)?;
        data_seg.write(&mut buf)?;
        buf.resize(consts::CODE_OFFSET as usize, 0);
        buf.extend_from_slice(&self.code);
        buf.resize(data_off as usize, 0);
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(consts::SHSTRTAB);
        buf.resize(shoff as usize, 0);
        for section in &sections {
            section.write(&mut buf)?;
        }
        Ok(buf)
    }
}
