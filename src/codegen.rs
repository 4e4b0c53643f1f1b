// This module holds the CodeGenerator, the entry point of the backend. One call to generate()
// runs a whole compilation: validate the AST root, lower it to IR, drop NOPs, bind leftover
// virtual registers to physical ones, encode machine code for the target architecture and write
// the requested artifacts. Output formats are cumulative: assembly text is always written, the
// placeholder object is added for the object format, and the native executable is added for the
// executable format. Problems with the AST root abort the compilation. Every other problem is
// recorded as a diagnostic and the compilation goes on, so callers get every error at once plus
// best-effort artifacts; generate() reports failure whenever any diagnostic was recorded.

//! Compilation driver.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::ast::{AstNode, Program};
use crate::core::{
    CodegenError, CodegenResult, CompilationStats, Diagnostic, Diagnostics, Function, Opcode, RegisterFile,
};
use crate::emit;
use crate::encoder::generate_machine_code;
use crate::lower::Lowerer;
use crate::symbols::SymbolTable;
use crate::target::{CodegenOptions, OutputFormat, TargetPlatform};

/// Remove every NOP instruction. Returns how many were removed.
pub fn eliminate_dead_code(functions: &mut [Function]) -> usize {
    let mut removed = 0;
    for block in functions.iter_mut().flat_map(|f| f.blocks.iter_mut()) {
        let before = block.instructions.len();
        block.instructions.retain(|instr| instr.opcode != Opcode::Nop);
        removed += before - block.instructions.len();
    }
    removed
}

/// The program an AST root must be; anything else aborts generation.
fn program_root(ast: Option<&AstNode>) -> CodegenResult<&Program> {
    match ast {
        None => Err(CodegenError::MissingAst),
        Some(AstNode::Program(program)) => Ok(program),
        Some(_) => Err(CodegenError::NotAProgram),
    }
}

/// `path` with `suffix` appended to its final component.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[derive(Debug, Default)]
pub struct CodeGenerator {
    options: CodegenOptions,
    functions: Vec<Function>,
    registers: RegisterFile,
    diagnostics: Diagnostics,
    stats: CompilationStats,
}

impl CodeGenerator {
    pub fn new(options: CodegenOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Compile `ast` and write the artifacts next to `output_path`.
    pub fn generate(&mut self, ast: Option<&AstNode>, output_path: impl AsRef<Path>) -> bool {
        self.generate_with_symbols(ast, output_path, None)
    }

    /// Like [`generate`](Self::generate), resolving otherwise unbound
    /// identifiers through the semantic analyzer's `symbols`.
    pub fn generate_with_symbols(
        &mut self,
        ast: Option<&AstNode>,
        output_path: impl AsRef<Path>,
        symbols: Option<&dyn SymbolTable>,
    ) -> bool {
        let output_path = output_path.as_ref();
        self.reset();

        let program = match program_root(ast) {
            Ok(program) => program,
            Err(error) => return self.fail(ast.map(AstNode::kind), error),
        };

        log::info!(
            "generating {} for {} ({} top-level statements)",
            self.options.format,
            self.options.platform,
            program.statements.len()
        );

        let lowered = Lowerer::new(symbols)
            .with_entry_stub(self.options.entry_stub)
            .lower_program(program);
        self.functions = lowered.functions;
        self.registers = lowered.registers;
        self.diagnostics = lowered.diagnostics;
        self.stats.labels_generated = lowered.labels_generated;

        self.stats.nops_removed = eliminate_dead_code(&mut self.functions);
        log::debug!("dead code elimination removed {} NOPs", self.stats.nops_removed);

        self.stats.operands_rebound = self.registers.bind_virtuals(&mut self.functions);
        log::debug!("bound {} virtual register operands", self.stats.operands_rebound);

        let code = generate_machine_code(
            &self.options.platform.architecture(),
            &self.functions,
            &self.registers,
        );
        self.write_artifacts(output_path, &code);

        self.collect_stats(code.len());
        log::info!("compilation finished: {}", self.stats);
        for diagnostic in self.diagnostics.iter() {
            log::error!("{diagnostic}");
        }
        self.diagnostics.is_empty()
    }

    /// Retarget, then [`generate`](Self::generate).
    pub fn generate_for(
        &mut self,
        ast: Option<&AstNode>,
        output_path: impl AsRef<Path>,
        platform: TargetPlatform,
        format: OutputFormat,
    ) -> bool {
        self.set_target_platform(platform);
        self.set_output_format(format);
        self.generate(ast, output_path)
    }

    fn reset(&mut self) {
        self.functions.clear();
        self.registers = RegisterFile::new();
        self.diagnostics.clear();
        self.stats.reset();
    }

    fn fail(&mut self, node: Option<crate::ast::AstNodeKind>, error: CodegenError) -> bool {
        self.diagnostics.record(node, error);
        self.stats.diagnostics = self.diagnostics.len();
        false
    }

    fn write_artifacts(&mut self, output_path: &Path, code: &[u8]) {
        let asm_path = with_suffix(output_path, ".s");
        let result = emit::asm::write_assembly(&asm_path, &self.functions, &self.registers);
        self.check_written(asm_path, result);

        if self.options.format.writes_object() {
            let obj_path = with_suffix(output_path, ".o");
            let result = emit::gdobj::write_object(&obj_path, &self.functions);
            self.check_written(obj_path, result);
        }

        if self.options.format.writes_executable() {
            let platform = self.options.platform;
            let exe_path = with_suffix(output_path, platform.executable_extension());
            let result = emit::write_executable(platform, code, &exe_path);
            self.check_written(exe_path, result);
        }
    }

    fn check_written(&mut self, path: PathBuf, result: std::io::Result<()>) {
        match result {
            Ok(()) => log::info!("wrote {}", path.display()),
            Err(source) => self
                .diagnostics
                .record(None, CodegenError::OutputFile { path, source }),
        }
    }

    fn collect_stats(&mut self, code_bytes: usize) {
        let stats = &mut self.stats;
        stats.functions = self.functions.len();
        stats.blocks = self.functions.iter().map(|f| f.blocks.len()).sum();
        stats.instructions = self.functions.iter().map(Function::instruction_count).sum();
        stats.virtual_registers = self.registers.virtual_count();
        stats.code_bytes = code_bytes;
        stats.diagnostics = self.diagnostics.len();
    }

    /// Rendered diagnostics of the last compilation.
    pub fn errors(&self) -> Vec<String> {
        self.diagnostics.messages()
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn stats(&self) -> &CompilationStats {
        &self.stats
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn set_target_platform(&mut self, platform: TargetPlatform) {
        self.options.platform = platform;
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.options.format = format;
    }

    pub fn target_platform(&self) -> TargetPlatform {
        self.options.platform
    }

    pub fn output_format(&self) -> OutputFormat {
        self.options.format
    }

    pub fn platform_name(&self) -> &'static str {
        self.options.platform.display_name()
    }

    pub fn executable_extension(&self) -> &'static str {
        self.options.platform.executable_extension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Program, Stmt};
    use crate::core::Instruction;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_missing_ast_is_fatal() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let mut generator = CodeGenerator::default();
        assert!(!generator.generate(None, dir.path().join("out")));
        assert_eq!(generator.errors(), vec!["Code Generation Error: No AST provided".to_string()]);
        assert!(!dir.path().join("out.s").exists());
    }

    #[test]
    fn test_non_program_root_is_fatal() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let mut generator = CodeGenerator::default();
        let root = AstNode::Expression(Expr::int(1));
        assert!(!generator.generate(Some(&root), dir.path().join("out")));
        assert_eq!(generator.errors(), vec!["Code Generation Error: Expected program node".to_string()]);
        let diag = generator.diagnostics().next().unwrap();
        assert_eq!(diag.node, Some(crate::ast::AstNodeKind::LiteralExpr));
    }

    #[test]
    fn test_program_root_errors_are_fatal() {
        let program = AstNode::from(Program::default());
        assert!(program_root(Some(&program)).is_ok());

        let missing = program_root(None).unwrap_err();
        assert!(missing.is_fatal());
        let literal = AstNode::Expression(Expr::int(1));
        let wrong = program_root(Some(&literal)).unwrap_err();
        assert!(matches!(wrong, CodegenError::NotAProgram));
        assert!(wrong.is_fatal());
    }

    #[test]
    fn test_nops_are_removed() {
        let mut regs = RegisterFile::new();
        let r = regs.allocate(crate::core::RegClass::General);
        let mut f = Function::new("f");
        let entry = f.create_block("f_entry");
        f.block_mut(entry).push(Instruction::new(Opcode::Nop));
        f.block_mut(entry).push(Instruction::with_immediate(Opcode::Mov, r, 1));
        f.block_mut(entry).push(Instruction::new(Opcode::Nop));
        f.block_mut(entry).push(Instruction::new(Opcode::Ret));

        let mut functions = vec![f];
        assert_eq!(eliminate_dead_code(&mut functions), 2);
        assert_eq!(functions[0].instruction_count(), 2);
    }

    #[test]
    fn test_pass_statement_leaves_no_nop() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let program = Program::new(vec![Stmt::func("main", vec![], "void", vec![Stmt::Pass])]);
        let mut generator = CodeGenerator::default();
        assert!(generator.generate(Some(&AstNode::from(program)), dir.path().join("p")));
        assert_eq!(generator.stats().nops_removed, 1);
        assert!(generator.functions()[0].instructions().all(|i| i.opcode != Opcode::Nop));
    }

    #[test]
    fn test_suffix_appends() {
        assert_eq!(with_suffix(Path::new("/tmp/prog"), ".s"), PathBuf::from("/tmp/prog.s"));
        assert_eq!(with_suffix(Path::new("a.b"), ".o"), PathBuf::from("a.b.o"));
        assert_eq!(with_suffix(Path::new("a"), ""), PathBuf::from("a"));
    }

    #[test]
    fn test_unwritable_output_is_recorded() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_such_dir").join("out");
        let program = Program::new(vec![]);
        let mut generator = CodeGenerator::new(CodegenOptions::new(
            TargetPlatform::LinuxX64,
            OutputFormat::Object,
        ));
        assert!(!generator.generate(Some(&AstNode::from(program)), &missing));
        let errors = generator.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Code Generation Error: Cannot open output file: "));
        assert!(errors[0].ends_with("out.s"));
    }
}
