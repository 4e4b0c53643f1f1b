//! Mach-O 64-bit executable generation for macOS (x86-64 and ARM64).
//!
//! Header, `__TEXT` and `__DATA` segments with one section each, and an
//! `LC_MAIN` entry point at the start of `__text`.

use std::io::{self, Write};

use object::macho::{
    CPU_SUBTYPE_ARM64_ALL, CPU_SUBTYPE_X86_64_ALL, CPU_TYPE_ARM64, CPU_TYPE_X86_64, LC_MAIN,
    LC_SEGMENT_64, MH_DYLDLINK, MH_EXECUTE, MH_MAGIC_64, MH_NOUNDEFS, MH_PIE, MH_TWOLEVEL,
    S_ATTR_PURE_INSTRUCTIONS, S_ATTR_SOME_INSTRUCTIONS, S_REGULAR, VM_PROT_EXECUTE, VM_PROT_READ,
    VM_PROT_WRITE,
};

use super::{align_up, stub_error};
use crate::target::Architecture;
use crate::{arm64, x64};

pub mod consts {
    pub const HEADER_SIZE: u32 = 32;
    pub const SEGMENT_COMMAND_SIZE: u32 = 72;
    pub const SECTION_SIZE: u32 = 80;
    pub const ENTRY_COMMAND_SIZE: u32 = 24;
    pub const SIZEOF_CMDS: u32 = 2 * (SEGMENT_COMMAND_SIZE + SECTION_SIZE) + ENTRY_COMMAND_SIZE;

    pub const TEXT_VMADDR: u64 = 0x1_0000_0000;
    pub const CODE_OFFSET: u64 = 0x1000;
    pub const PAGE_SIZE: u64 = 0x1000;
}

fn name16(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let len = name.len().min(16);
    out[..len].copy_from_slice(&name.as_bytes()[..len]);
    out
}

#[derive(Debug, Clone)]
pub struct MachHeader64 {
    pub cputype: u32,
    pub cpusubtype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
}

impl MachHeader64 {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let flags = MH_NOUNDEFS | MH_DYLDLINK | MH_TWOLEVEL | MH_PIE;
        for field in [
            MH_MAGIC_64,
            self.cputype,
            self.cpusubtype,
            MH_EXECUTE,
            self.ncmds,
            self.sizeofcmds,
            flags,
            0,
        ] {
            w.write_all(&field.to_le_bytes())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Section64 {
    pub sectname: &'static str,
    pub segname: &'static str,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    /// Power of two.
    pub align: u32,
    pub flags: u32,
}

impl Section64 {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&name16(self.sectname))?;
        w.write_all(&name16(self.segname))?;
        w.write_all(&self.addr.to_le_bytes())?;
        w.write_all(&self.size.to_le_bytes())?;
        w.write_all(&self.offset.to_le_bytes())?;
        w.write_all(&self.align.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // reloff
        w.write_all(&0u32.to_le_bytes())?; // nreloc
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&[0u8; 12]) // reserved1..3
    }
}

/// `LC_SEGMENT_64` carrying exactly one section.
#[derive(Debug, Clone)]
pub struct SegmentCommand64 {
    pub segname: &'static str,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub initprot: u32,
    pub section: Section64,
}

impl SegmentCommand64 {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&LC_SEGMENT_64.to_le_bytes())?;
        w.write_all(&(consts::SEGMENT_COMMAND_SIZE + consts::SECTION_SIZE).to_le_bytes())?;
        w.write_all(&name16(self.segname))?;
        w.write_all(&self.vmaddr.to_le_bytes())?;
        w.write_all(&self.vmsize.to_le_bytes())?;
        w.write_all(&self.fileoff.to_le_bytes())?;
        w.write_all(&self.filesize.to_le_bytes())?;
        w.write_all(&self.initprot.to_le_bytes())?; // maxprot
        w.write_all(&self.initprot.to_le_bytes())?;
        w.write_all(&1u32.to_le_bytes())?; // nsects
        w.write_all(&0u32.to_le_bytes())?; // flags
        self.section.write(w)
    }
}

#[derive(Debug, Clone)]
pub struct EntryPointCommand {
    pub entryoff: u64,
}

impl EntryPointCommand {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&LC_MAIN.to_le_bytes())?;
        w.write_all(&consts::ENTRY_COMMAND_SIZE.to_le_bytes())?;
        w.write_all(&self.entryoff.to_le_bytes())?;
        w.write_all(&0u64.to_le_bytes()) // stacksize
    }
}

#[derive(Debug)]
pub struct MachOBuilder {
    arch: Architecture,
    code: Vec<u8>,
    data: Vec<u8>,
}

impl MachOBuilder {
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

    fn cpu(&self) -> (u32, u32) {
        match self.arch {
            Architecture::Aarch64 => (CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL),
            _ => (CPU_TYPE_X86_64, CPU_SUBTYPE_X86_64_ALL),
        }
    }

    pub fn build(mut self) -> io::Result<Vec<u8>> {
        if self.code.is_empty() {
            log::debug!("no machine code, using the {} exit stub", self.arch);
            self.code = match self.arch {
                Architecture::Aarch64 => arm64::stubs::macos_exit(),
                _ => x64::stubs::macos_exit(consts::TEXT_VMADDR + consts::CODE_OFFSET)
                    .map_err(stub_error)?,
            };
        }

        let text_end = consts::CODE_OFFSET + self.code.len() as u64;
        let data_off = align_up(text_end, consts::PAGE_SIZE);
        let data_len = self.data.len() as u64;
        let (cputype, cpusubtype) = self.cpu();

        let header = MachHeader64 {
            cputype,
            cpusubtype,
            ncmds: 3,
            sizeofcmds: consts::SIZEOF_CMDS,
        };
        let text = SegmentCommand64 {
            segname: "__TEXT",
            vmaddr: consts::TEXT_VMADDR,
            vmsize: data_off,
            fileoff: 0,
            filesize: text_end,
            initprot: VM_PROT_READ | VM_PROT_EXECUTE,
            section: Section64 {
                sectname: "__text",
                segname: "__TEXT",
                addr: consts::TEXT_VMADDR + consts::CODE_OFFSET,
                size: self.code.len() as u64,
                offset: consts::CODE_OFFSET as u32,
                align: 4,
                flags: S_REGULAR | S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS,
            },
        };
        let data = SegmentCommand64 {
            segname: "__DATA",
            vmaddr: consts::TEXT_VMADDR + data_off,
            vmsize: align_up(data_len.max(1), consts::PAGE_SIZE),
            fileoff: data_off,
            filesize: data_len,
            initprot: VM_PROT_READ | VM_PROT_WRITE,
            section: Section64 {
                sectname: "__data",
                segname: "__DATA",
                addr: consts::TEXT_VMADDR + data_off,
                size: data_len,
                offset: data_off as u32,
                align: 3,
                flags: S_REGULAR,
            },
        };

        let mut buf = Vec::with_capacity((data_off + data_len) as usize);
        header.write(&mut buf)?;
        text.write(&mut buf)?;
        data.write(&mut buf)?;
        EntryPointCommand {
            entryoff: consts::CODE_OFFSET,
        }
        .write(&mut buf)?;
        buf.resize(consts::CODE_OFFSET as usize, 0);
        buf.extend_from_slice(&self.code);
        buf.resize(data_off as usize, 0);
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Object, ObjectSection};

    #[test]
    fn test_load_command_sizes() -> io::Result<()> {
        let image = MachOBuilder::new(Architecture::X86_64).code(vec![0xC3]).build()?;
        let sizeofcmds = u32::from_le_bytes([image[20], image[21], image[22], image[23]]);
        assert_eq!(sizeofcmds, 328);
        // cmdsize of the first LC_SEGMENT_64
        assert_eq!(u32::from_le_bytes([image[36], image[37], image[38], image[39]]), 152);
        Ok(())
    }

    #[test]
    fn test_magic_and_cpu() -> io::Result<()> {
        let image = MachOBuilder::new(Architecture::Aarch64).build()?;
        assert_eq!(&image[..4], &[0xcf, 0xfa, 0xed, 0xfe]);
        assert_eq!(u32::from_le_bytes([image[4], image[5], image[6], image[7]]), 0x0100000c);
        assert_eq!(u32::from_le_bytes([image[8], image[9], image[10], image[11]]), 0);
        // fallback svc #0x80
        assert_eq!(&image[0x1008..0x100c], &0xD4001001u32.to_le_bytes());
        Ok(())
    }

    #[test]
    fn test_parses_back() -> Result<(), Box<dyn std::error::Error>> {
        let image = MachOBuilder::new(Architecture::X86_64)
            .code(vec![0x90, 0xC3])
            .data(b"Hi\0".to_vec())
            .build()?;
        let file = object::File::parse(&*image)?;
        assert_eq!(file.format(), object::BinaryFormat::MachO);
        assert_eq!(file.architecture(), object::Architecture::X86_64);
        let text = file.section_by_name("__text").ok_or("no __text")?;
        assert_eq!(text.data()?, &[0x90u8, 0xC3]);
        let data = file.section_by_name("__data").ok_or("no __data")?;
        assert_eq!(data.address(), consts::TEXT_VMADDR + 0x2000);
        assert_eq!(data.data()?, b"Hi\0");
        Ok(())
    }
}
