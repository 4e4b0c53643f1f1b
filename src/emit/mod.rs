// This module writes the artifacts of a compilation. `asm` renders the IR as assembly text,
// `gdobj` writes the placeholder object format, and `pe`, `macho` and `elf` build minimal
// native executables. The executable writers share one layout: headers first, machine code at
// a fixed file offset, the greeting string in a data region after the code. When a compilation
// produced no machine code the writers substitute a platform exit sequence, so an executable is
// never empty.

//! Artifact writers.

pub mod asm;
pub mod elf;
pub mod gdobj;
pub mod macho;
pub mod pe;

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::target::{TargetOs, TargetPlatform};

/// Round `value` up to a multiple of `align` (a power of two).
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// NUL-terminated string placed in the data region of an executable.
pub fn greeting(os: TargetOs) -> &'static [u8] {
    match os {
        TargetOs::Windows => b"Hello, World from GDScript!\n\0",
        TargetOs::Macos => b"Hello, World from GDScript on macOS!\n\0",
        TargetOs::Linux => b"Hello, World from GDScript on Linux!\n\0",
    }
}

pub(crate) fn stub_error(err: iced_x86::IcedError) -> io::Error {
    io::Error::other(format!("failed to assemble exit stub: {err}"))
}

/// Build the executable image for `platform` around `code`.
pub fn build_executable(platform: TargetPlatform, code: &[u8]) -> io::Result<Vec<u8>> {
    let data = greeting(platform.os()).to_vec();
    let image = match platform.os() {
        TargetOs::Windows => pe::Pe64Builder::new().code(code.to_vec()).data(data).build()?,
        TargetOs::Macos => macho::MachOBuilder::new(platform.architecture())
            .code(code.to_vec())
            .data(data)
            .build()?,
        TargetOs::Linux => elf::Elf64Builder::new(platform.architecture())
            .code(code.to_vec())
            .data(data)
            .build()?,
    };
    log::debug!(
        "{}: {} byte executable around {} bytes of code",
        platform,
        image.len(),
        code.len()
    );
    Ok(image)
}

/// Build the executable for `platform` and write it to `path`, marking it
/// executable on Unix hosts.
pub fn write_executable(platform: TargetPlatform, code: &[u8], path: &Path) -> io::Result<()> {
    let image = build_executable(platform, code)?;
    let mut file = File::create(path)?;
    file.write_all(&image)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }

    Ok(())
}
