//! Developer tool for the code generator.
//!
//! - `encodings`: every opcode in register and immediate form with its bytes
//! - `stub`: run the whole pipeline on an empty program
//! - `info`: platform facts

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use iced_x86::{Decoder, DecoderOptions, Formatter, NasmFormatter};

use gdcodegen::ast::{AstNode, Program};
use gdcodegen::core::RegClass;
use gdcodegen::encoder::encoder_for;
use gdcodegen::{
    Architecture, CodeGenerator, CodegenOptions, Instruction, Opcode, OutputFormat, RegisterFile,
    TargetPlatform,
};

#[derive(Parser)]
#[command(name = "gdcodegen")]
#[command(version)]
#[command(about = "Inspect the GDScript backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the encoding of every opcode
    Encodings {
        /// Architecture name: x86_64, aarch64, ...
        #[arg(long, default_value = "x86_64")]
        arch: String,
    },

    /// Write the artifacts of an empty program
    Stub {
        #[arg(long, default_value = "linux-x64")]
        platform: TargetPlatform,

        /// assembly, object or executable
        #[arg(long, default_value = "executable")]
        format: OutputFormat,

        /// Output path without extension
        #[arg(short, long, default_value = "stub")]
        output: PathBuf,

        /// Also synthesize `_start`
        #[arg(long)]
        entry_stub: bool,
    },

    /// Show platform properties
    Info {
        #[arg(long)]
        platform: Option<TargetPlatform>,
    },
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

fn disassemble(bytes: &[u8]) -> String {
    let mut formatter = NasmFormatter::new();
    let mut out = Vec::new();
    for instr in Decoder::new(64, bytes, DecoderOptions::NONE) {
        let mut text = String::new();
        formatter.format(&instr, &mut text);
        out.push(text);
    }
    out.join("; ")
}

fn cmd_encodings(arch: Architecture) -> ExitCode {
    let mut regs = RegisterFile::new();
    let dst = regs.allocate(RegClass::General);
    let src = regs.allocate(RegClass::General);
    let encoder = encoder_for(&arch);

    println!("{arch}: nop = {}", hex(encoder.nop()));
    for opcode in Opcode::ALL {
        let forms = [
            ("reg", Instruction::with_operands(opcode, &[dst, src])),
            ("imm", Instruction::with_immediate(opcode, dst, 42)),
        ];
        for (form, instr) in forms {
            let mut bytes = Vec::new();
            encoder.encode(&instr, &regs, &mut bytes);
            let line = format!("{:<6} {form}  {:<32}", opcode.mnemonic(), hex(&bytes));
            if arch == Architecture::X86_64 {
                println!("{line} {}", disassemble(&bytes));
            } else {
                println!("{}", line.trim_end());
            }
        }
    }
    ExitCode::SUCCESS
}

fn cmd_stub(options: CodegenOptions, output: PathBuf) -> ExitCode {
    let program = AstNode::from(Program::new(Vec::new()));
    let mut generator = CodeGenerator::new(options);
    let ok = generator.generate(Some(&program), &output);
    println!("{}", generator.stats());
    if ok {
        ExitCode::SUCCESS
    } else {
        for error in generator.errors() {
            eprintln!("{error}");
        }
        ExitCode::FAILURE
    }
}

fn cmd_info(platform: Option<TargetPlatform>) -> ExitCode {
    let platforms = match platform {
        Some(platform) => vec![platform],
        None => TargetPlatform::ALL.to_vec(),
    };
    for platform in platforms {
        let extension = match platform.executable_extension() {
            "" => "(none)",
            ext => ext,
        };
        println!("{} [{}]", platform, platform.cli_name());
        println!("  architecture: {}", platform.architecture());
        println!("  executable:   {extension}");
        println!("  linker:       {}", platform.linker());
        println!("  libraries:    {}", platform.system_libraries().join(" "));
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Encodings { arch } => cmd_encodings(Architecture::from_name(&arch)),
        Commands::Stub {
            platform,
            format,
            output,
            entry_stub,
        } => cmd_stub(
            CodegenOptions::new(platform, format).with_entry_stub(entry_stub),
            output,
        ),
        Commands::Info { platform } => cmd_info(platform),
    }
}
