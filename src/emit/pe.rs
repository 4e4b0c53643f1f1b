//! PE32+ executable generation for Windows x64.
//!
//! DOS header and stub, `PE\0\0`, COFF header, a 240-byte optional header
//! with empty data directories, then `.text` and `.data`. No imports are
//! declared; the fallback stub calls through a zero placeholder where a
//! linker would put `ExitProcess`.

use std::io::{self, Write};

use object::pe::{
    IMAGE_DLLCHARACTERISTICS_NX_COMPAT, IMAGE_DLLCHARACTERISTICS_TERMINAL_SERVER_AWARE,
    IMAGE_DOS_SIGNATURE, IMAGE_FILE_EXECUTABLE_IMAGE, IMAGE_FILE_LARGE_ADDRESS_AWARE,
    IMAGE_FILE_MACHINE_AMD64, IMAGE_NT_OPTIONAL_HDR64_MAGIC, IMAGE_NT_SIGNATURE,
    IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ,
    IMAGE_SCN_MEM_WRITE, IMAGE_SUBSYSTEM_WINDOWS_CUI,
};

use super::{align_up, stub_error};
use crate::x64;

pub mod consts {
    pub const PE_HEADER_OFFSET: u32 = 0x80;
    pub const OPTIONAL_HEADER_SIZE: u16 = 240;
    pub const SECTION_HEADER_SIZE: usize = 40;
    pub const DATA_DIRECTORY_COUNT: usize = 16;

    pub const IMAGE_BASE: u64 = 0x1_4000_0000;
    pub const SECTION_ALIGNMENT: u32 = 0x1000;
    pub const FILE_ALIGNMENT: u32 = 0x200;
    pub const SIZE_OF_HEADERS: u32 = 0x400;
    pub const TEXT_RVA: u32 = 0x1000;

    /// Real-mode program printing the classic message and exiting.
    pub const DOS_STUB: &[u8] = b"\x0e\x1f\xba\x0e\x00\xb4\x09\xcd\x21\xb8\x01\x4c\xcd\x21\
This program cannot be run in DOS mode.\r\r\n$";
}

#[derive(Debug, Clone)]
pub struct DosHeader {
    pub e_lfanew: u32,
}

impl DosHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut header = [0u8; 64];
        header[0..2].copy_from_slice(&IMAGE_DOS_SIGNATURE.to_le_bytes());
        header[2..4].copy_from_slice(&0x90u16.to_le_bytes()); // e_cblp
        header[4..6].copy_from_slice(&3u16.to_le_bytes()); // e_cp
        header[8..10].copy_from_slice(&4u16.to_le_bytes()); // e_cparhdr
        header[12..14].copy_from_slice(&0xFFFFu16.to_le_bytes()); // e_maxalloc
        header[16..18].copy_from_slice(&0xB8u16.to_le_bytes()); // e_sp
        header[24..26].copy_from_slice(&0x40u16.to_le_bytes()); // e_lfarlc
        header[60..64].copy_from_slice(&self.e_lfanew.to_le_bytes());
        w.write_all(&header)?;

        let mut stub = [0u8; 64];
        stub[..consts::DOS_STUB.len()].copy_from_slice(consts::DOS_STUB);
        w.write_all(&stub)
    }
}

#[derive(Debug, Clone)]
pub struct CoffHeader {
    pub number_of_sections: u16,
}

impl CoffHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&IMAGE_NT_SIGNATURE.to_le_bytes())?;
        w.write_all(&IMAGE_FILE_MACHINE_AMD64.to_le_bytes())?;
        w.write_all(&self.number_of_sections.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // TimeDateStamp
        w.write_all(&0u32.to_le_bytes())?; // PointerToSymbolTable
        w.write_all(&0u32.to_le_bytes())?; // NumberOfSymbols
        w.write_all(&consts::OPTIONAL_HEADER_SIZE.to_le_bytes())?;
        let characteristics = IMAGE_FILE_EXECUTABLE_IMAGE | IMAGE_FILE_LARGE_ADDRESS_AWARE;
        w.write_all(&characteristics.to_le_bytes())
    }
}

/// The fields of the PE32+ optional header that depend on the image.
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub address_of_entry_point: u32,
    pub size_of_image: u32,
}

impl OptionalHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&IMAGE_NT_OPTIONAL_HDR64_MAGIC.to_le_bytes())?;
        w.write_all(&[14, 0])?; // linker version
        w.write_all(&self.size_of_code.to_le_bytes())?;
        w.write_all(&self.size_of_initialized_data.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // SizeOfUninitializedData
        w.write_all(&self.address_of_entry_point.to_le_bytes())?;
        w.write_all(&consts::TEXT_RVA.to_le_bytes())?; // BaseOfCode
        w.write_all(&consts::IMAGE_BASE.to_le_bytes())?;
        w.write_all(&consts::SECTION_ALIGNMENT.to_le_bytes())?;
        w.write_all(&consts::FILE_ALIGNMENT.to_le_bytes())?;
        for version in [6u16, 0, 0, 0, 6, 0] {
            // OS, image and subsystem major/minor
            w.write_all(&version.to_le_bytes())?;
        }
        w.write_all(&0u32.to_le_bytes())?; // Win32VersionValue
        w.write_all(&self.size_of_image.to_le_bytes())?;
        w.write_all(&consts::SIZE_OF_HEADERS.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // CheckSum
        w.write_all(&IMAGE_SUBSYSTEM_WINDOWS_CUI.to_le_bytes())?;
        let dll = IMAGE_DLLCHARACTERISTICS_NX_COMPAT | IMAGE_DLLCHARACTERISTICS_TERMINAL_SERVER_AWARE;
        w.write_all(&dll.to_le_bytes())?;
        for size in [0x10_0000u64, 0x1000, 0x10_0000, 0x1000] {
            // stack reserve/commit, heap reserve/commit
            w.write_all(&size.to_le_bytes())?;
        }
        w.write_all(&0u32.to_le_bytes())?; // LoaderFlags
        w.write_all(&(consts::DATA_DIRECTORY_COUNT as u32).to_le_bytes())?;
        w.write_all(&[0u8; consts::DATA_DIRECTORY_COUNT * 8])
    }
}

#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

impl SectionHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.name)?;
        w.write_all(&self.virtual_size.to_le_bytes())?;
        w.write_all(&self.virtual_address.to_le_bytes())?;
        w.write_all(&self.size_of_raw_data.to_le_bytes())?;
        w.write_all(&self.pointer_to_raw_data.to_le_bytes())?;
        w.write_all(&[0u8; 12])?; // relocations and line numbers
        w.write_all(&self.characteristics.to_le_bytes())
    }
}

fn file_align(size: usize) -> u32 {
    align_up(size as u64, consts::FILE_ALIGNMENT as u64) as u32
}

fn section_align(size: usize) -> u32 {
    align_up(size as u64, consts::SECTION_ALIGNMENT as u64) as u32
}

#[derive(Debug, Default)]
pub struct Pe64Builder {
    code: Vec<u8>,
    data: Vec<u8>,
}

impl Pe64Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, code: Vec<u8>) -> Self {
        self.code = code;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn build(mut self) -> io::Result<Vec<u8>> {
        if self.code.is_empty() {
            log::debug!("no machine code, using the ExitProcess stub");
            self.code = x64::stubs::windows_exit(consts::IMAGE_BASE + consts::TEXT_RVA as u64)
                .map_err(stub_error)?;
        }

        let text_raw = file_align(self.code.len());
        let data_raw = file_align(self.data.len());
        let data_rva = consts::TEXT_RVA + section_align(self.code.len());
        let data_ptr = consts::SIZE_OF_HEADERS + text_raw;

        let optional = OptionalHeader {
            size_of_code: text_raw,
            size_of_initialized_data: data_raw,
            address_of_entry_point: consts::TEXT_RVA,
            size_of_image: data_rva + section_align(self.data.len().max(1)),
        };
        let text = SectionHeader {
            name: *b".text\0\0\0",
            virtual_size: self.code.len() as u32,
            virtual_address: consts::TEXT_RVA,
            size_of_raw_data: text_raw,
            pointer_to_raw_data: consts::SIZE_OF_HEADERS,
            characteristics: IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ,
        };
        let data = SectionHeader {
            name: *b".data\0\0\0",
            virtual_size: self.data.len() as u32,
            virtual_address: data_rva,
            size_of_raw_data: data_raw,
            pointer_to_raw_data: data_ptr,
            characteristics: IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ | IMAGE_SCN_MEM_WRITE,
        };

        let mut buf = Vec::with_capacity((data_ptr + data_raw) as usize);
        DosHeader {
            e_lfanew: consts::PE_HEADER_OFFSET,
        }
        .write(&mut buf)?;
        CoffHeader { number_of_sections: 2 }.write(&mut buf)?;
        optional.write(&mut buf)?;
        text.write(&mut buf)?;
        data.write(&mut buf)?;
        buf.resize(consts::SIZE_OF_HEADERS as usize, 0);
        buf.extend_from_slice(&self.code);
        buf.resize(data_ptr as usize, 0);
        buf.extend_from_slice(&self.data);
        buf.resize((data_ptr + data_raw) as usize, 0);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Object, ObjectSection};

    #[test]
    fn test_header_sizes() -> io::Result<()> {
        let mut buf = Vec::new();
        DosHeader { e_lfanew: 0x80 }.write(&mut buf)?;
        assert_eq!(buf.len(), 0x80);
        CoffHeader { number_of_sections: 2 }.write(&mut buf)?;
        assert_eq!(buf.len(), 0x80 + 24);

        buf.clear();
        OptionalHeader {
            size_of_code: 0,
            size_of_initialized_data: 0,
            address_of_entry_point: 0,
            size_of_image: 0,
        }
        .write(&mut buf)?;
        assert_eq!(buf.len(), consts::OPTIONAL_HEADER_SIZE as usize);
        Ok(())
    }

    #[test]
    fn test_dos_stub_message() -> io::Result<()> {
        let image = Pe64Builder::new().code(vec![0xC3]).build()?;
        assert_eq!(&image[..2], b"MZ");
        assert_eq!(u32::from_le_bytes([image[60], image[61], image[62], image[63]]), 0x80);
        let stub = &image[0x40..0x80];
        assert!(stub.windows(38).any(|w| w == b"This program cannot be run in DOS mode"));
        assert_eq!(&image[0x80..0x84], b"PE\0\0");
        Ok(())
    }

    #[test]
    fn test_parses_back() -> Result<(), Box<dyn std::error::Error>> {
        let image = Pe64Builder::new()
            .code(vec![0x90, 0xC3])
            .data(b"Hello\0".to_vec())
            .build()?;
        assert_eq!(image[0x400], 0x90);
        assert_eq!(&image[0x600..0x606], b"Hello\0");

        let file = object::File::parse(&*image)?;
        assert_eq!(file.format(), object::BinaryFormat::Pe);
        assert_eq!(file.architecture(), object::Architecture::X86_64);
        let text = file.section_by_name(".text").ok_or("no .text")?;
        assert_eq!(text.address(), consts::IMAGE_BASE + 0x1000);
        let data = file.section_by_name(".data").ok_or("no .data")?;
        assert_eq!(data.address(), consts::IMAGE_BASE + 0x2000);
        assert!(data.data()?.starts_with(b"Hello\0"));
        Ok(())
    }
}
