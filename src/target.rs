//! Target platforms, output formats and generator options.

use std::fmt;
use std::str::FromStr;

use crate::core::CodegenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetPlatform {
    WindowsX64,
    #[default]
    MacosX64,
    MacosArm64,
    LinuxX64,
    LinuxArm64,
}

impl TargetPlatform {
    pub const ALL: [TargetPlatform; 5] = [
        TargetPlatform::WindowsX64,
        TargetPlatform::MacosX64,
        TargetPlatform::MacosArm64,
        TargetPlatform::LinuxX64,
        TargetPlatform::LinuxArm64,
    ];

    /// Human-readable name, e.g. `"macOS ARM64"`.
    pub fn display_name(self) -> &'static str {
        match self {
            TargetPlatform::WindowsX64 => "Windows x64",
            TargetPlatform::MacosX64 => "macOS x64",
            TargetPlatform::MacosArm64 => "macOS ARM64",
            TargetPlatform::LinuxX64 => "Linux x64",
            TargetPlatform::LinuxArm64 => "Linux ARM64",
        }
    }

    /// Name accepted by [`FromStr`], e.g. `"macos-arm64"`.
    pub fn cli_name(self) -> &'static str {
        match self {
            TargetPlatform::WindowsX64 => "windows-x64",
            TargetPlatform::MacosX64 => "macos-x64",
            TargetPlatform::MacosArm64 => "macos-arm64",
            TargetPlatform::LinuxX64 => "linux-x64",
            TargetPlatform::LinuxArm64 => "linux-arm64",
        }
    }

    pub fn architecture(self) -> Architecture {
        match self {
            TargetPlatform::WindowsX64 | TargetPlatform::MacosX64 | TargetPlatform::LinuxX64 => {
                Architecture::X86_64
            }
            TargetPlatform::MacosArm64 | TargetPlatform::LinuxArm64 => Architecture::Aarch64,
        }
    }

    pub fn os(self) -> TargetOs {
        match self {
            TargetPlatform::WindowsX64 => TargetOs::Windows,
            TargetPlatform::MacosX64 | TargetPlatform::MacosArm64 => TargetOs::Macos,
            TargetPlatform::LinuxX64 | TargetPlatform::LinuxArm64 => TargetOs::Linux,
        }
    }

    /// Extension appended to the executable artifact, including the dot.
    pub fn executable_extension(self) -> &'static str {
        match self.os() {
            TargetOs::Windows => ".exe",
            TargetOs::Macos => ".app",
            TargetOs::Linux => "",
        }
    }

    /// Conventional linker program. Never invoked by this crate.
    pub fn linker(self) -> &'static str {
        match self.os() {
            TargetOs::Windows => "link",
            TargetOs::Macos | TargetOs::Linux => "ld",
        }
    }

    pub fn system_libraries(self) -> &'static [&'static str] {
        match self.os() {
            TargetOs::Windows => &["kernel32", "user32", "msvcrt"],
            TargetOs::Macos => &["System", "c"],
            TargetOs::Linux => &["c", "m"],
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TargetPlatform {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('_', "-");
        TargetPlatform::ALL
            .into_iter()
            .find(|platform| platform.cli_name() == normalized)
            .ok_or_else(|| CodegenError::UnsupportedPlatform { name: s.to_string() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOs {
    Windows,
    Macos,
    Linux,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86_64,
    Aarch64,
    Unknown(String),
}

impl Architecture {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "x86_64" | "x86-64" | "x64" | "amd64" => Architecture::X86_64,
            "aarch64" | "arm64" => Architecture::Aarch64,
            _ => Architecture::Unknown(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Aarch64 => "aarch64",
            Architecture::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested artifacts. Each format implies the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum OutputFormat {
    #[default]
    Assembly,
    Object,
    Executable,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Assembly => "assembly",
            OutputFormat::Object => "object",
            OutputFormat::Executable => "executable",
        }
    }

    pub fn writes_object(self) -> bool {
        self >= OutputFormat::Object
    }

    pub fn writes_executable(self) -> bool {
        self == OutputFormat::Executable
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "assembly" | "asm" | "s" => Ok(OutputFormat::Assembly),
            "object" | "obj" | "o" => Ok(OutputFormat::Object),
            "executable" | "exe" | "bin" => Ok(OutputFormat::Executable),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Generator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodegenOptions {
    pub platform: TargetPlatform,
    pub format: OutputFormat,
    /// Synthesize a `_start` function that calls `main` and then `exit`.
    pub entry_stub: bool,
}

impl CodegenOptions {
    pub fn new(platform: TargetPlatform, format: OutputFormat) -> Self {
        Self {
            platform,
            format,
            entry_stub: false,
        }
    }

    pub fn with_entry_stub(mut self, enabled: bool) -> Self {
        self.entry_stub = enabled;
        self
    }
}
