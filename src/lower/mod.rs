// This module translates the parser's AST into the register IR. A Lowerer owns everything one
// compilation produces while walking the tree: the function list, the register arena, the
// diagnostics, the label counter and the compilation-unit maps (function names, class members,
// interned member slots). Lowering state that changes with nesting (current function, current
// block, variable map, enclosing loops) lives in an explicit stack of LoweringContext records: entering a
// function or lambda pushes a record, leaving it pops the record, releases the registers the
// record owns and resumes the enclosing context. Instructions emitted while no function is open
// (top-level statements) have no insertion point and are dropped. Statement lowering lives in
// stmt.rs and expression lowering in expr.rs; this file holds the shared emission helpers.

//! AST to IR lowering.

mod context;
mod expr;
mod stmt;

pub use context::{LoopLabels, LoweringContext};

use hashbrown::HashMap;

use crate::ast::{AstNodeKind, FuncDecl, Program};
use crate::core::{
    CodegenError, Diagnostics, FuncId, Function, Instruction, Opcode, RegClass, RegId,
    RegisterFile,
};
use crate::symbols::SymbolTable;

/// Bytes one pushed value occupies.
const STACK_SLOT_SIZE: u32 = 8;

/// Runtime symbol backing a builtin function, if `name` is one.
pub fn builtin_symbol(name: &str) -> Option<&'static str> {
    match name {
        "print" => Some("_builtin_print"),
        "len" => Some("_builtin_len"),
        "range" => Some("_builtin_range"),
        "str" => Some("_builtin_str"),
        "int" => Some("_builtin_int"),
        "float" => Some("_builtin_float"),
        _ => None,
    }
}

/// Everything lowering produced for one compilation.
#[derive(Debug)]
pub struct LoweredProgram {
    pub functions: Vec<Function>,
    pub registers: RegisterFile,
    pub diagnostics: Diagnostics,
    pub labels_generated: u32,
}

pub struct Lowerer<'a> {
    functions: Vec<Function>,
    function_map: HashMap<String, FuncId>,
    regs: RegisterFile,
    diagnostics: Diagnostics,
    symbols: Option<&'a dyn SymbolTable>,

    scope: LoweringContext,
    saved_scopes: Vec<LoweringContext>,

    current_class: Option<String>,
    class_members: HashMap<String, RegId>,
    member_slots: HashMap<String, i64>,

    next_label: u32,
    entry_stub: bool,
}

impl<'a> Lowerer<'a> {
    pub fn new(symbols: Option<&'a dyn SymbolTable>) -> Self {
        Self {
            functions: Vec::new(),
            function_map: HashMap::new(),
            regs: RegisterFile::new(),
            diagnostics: Diagnostics::new(),
            symbols,
            scope: LoweringContext::top_level(),
            saved_scopes: Vec::new(),
            current_class: None,
            class_members: HashMap::new(),
            member_slots: HashMap::new(),
            next_label: 0,
            entry_stub: false,
        }
    }

    /// Synthesize a `_start` function ahead of all user code.
    pub fn with_entry_stub(mut self, enabled: bool) -> Self {
        self.entry_stub = enabled;
        self
    }

    pub fn lower_program(mut self, program: &Program) -> LoweredProgram {
        self.lower_runtime_support();

        for stmt in &program.statements {
            self.lower_stmt(stmt);
        }

        if !self.function_map.contains_key("main") {
            log::debug!("no main declared, synthesizing default entry");
            self.open_function("main");
            let exit_code = self.regs.allocate(RegClass::General);
            self.emit(Instruction::with_immediate(Opcode::Mov, exit_code, 0));
            self.emit(Instruction::new(Opcode::Ret));
            self.regs.free(exit_code);
            self.close_function();
        }

        self.finish()
    }

    fn lower_runtime_support(&mut self) {
        if !self.entry_stub {
            return;
        }
        self.open_function("_start");
        self.emit(Instruction::with_target(Opcode::Call, "main"));
        let exit_code = self.regs.allocate(RegClass::General);
        self.emit(Instruction::with_immediate(Opcode::Mov, exit_code, 0));
        self.emit(Instruction::with_operands(Opcode::Push, &[exit_code]));
        self.emit(Instruction::with_target(Opcode::Call, "exit"));
        self.emit(Instruction::new(Opcode::Ret));
        self.regs.free(exit_code);
        self.close_function();
    }

    fn finish(mut self) -> LoweredProgram {
        while !self.saved_scopes.is_empty() {
            self.close_function();
        }
        for reg in std::mem::take(&mut self.scope.owned) {
            self.regs.free(reg);
        }
        LoweredProgram {
            functions: self.functions,
            registers: self.regs,
            diagnostics: self.diagnostics,
            labels_generated: self.next_label,
        }
    }

    /// Start a new function and make it the insertion point.
    ///
    /// The new variable scope starts empty, or with the class members when
    /// lowering inside a class.
    fn open_function(&mut self, name: &str) -> FuncId {
        let mut function = Function::new(name);
        let entry = function.create_block(format!("{name}_entry"));
        let id = FuncId(self.functions.len());
        self.functions.push(function);
        self.function_map.insert(name.to_string(), id);

        let mut context = LoweringContext::for_function(id, entry);
        if self.current_class.is_some() {
            context.variables = self.class_members.clone();
        }
        self.saved_scopes
            .push(std::mem::replace(&mut self.scope, context));
        log::debug!("lowering function {name}");
        id
    }

    /// Leave the current function, releasing the registers it owned.
    fn close_function(&mut self) {
        let Some(previous) = self.saved_scopes.pop() else {
            return;
        };
        let finished = std::mem::replace(&mut self.scope, previous);
        for reg in finished.owned {
            self.regs.free(reg);
        }
        if let Some(id) = finished.function {
            let function = &self.functions[id.0];
            log::debug!(
                "finished function {} ({} instructions)",
                function.name,
                function.instruction_count()
            );
        }
    }

    /// Shared body of named functions and methods: parameters, body and the
    /// trailing return.
    fn lower_function(&mut self, name: &str, decl: &FuncDecl, self_param: bool) {
        let id = self.open_function(name);

        let mut parameters: Vec<&str> = Vec::with_capacity(decl.parameters.len() + 1);
        if self_param {
            parameters.push("self");
        }
        parameters.extend(decl.parameters.iter().map(|param| param.name.as_str()));
        for param in parameters {
            let reg = self.regs.allocate_named(RegClass::General, param);
            self.scope.bind_owned(param, reg);
            self.functions[id.0].parameters.push(reg);
        }

        self.lower_stmt(&decl.body);

        let ends_with_ret = self.functions[id.0]
            .last_instruction()
            .is_some_and(|instr| instr.opcode == Opcode::Ret);
        if !ends_with_ret {
            if decl.returns_value() {
                let value = self.regs.allocate(RegClass::General);
                self.emit(Instruction::with_immediate(Opcode::Mov, value, 0));
                self.emit(Instruction::new(Opcode::Ret));
                self.regs.free(value);
            } else {
                self.emit(Instruction::new(Opcode::Ret));
            }
        }

        self.close_function();
    }

    /// Return register of the current function, allocated on first use.
    fn return_register(&mut self) -> Option<RegId> {
        let id = self.scope.function?;
        if let Some(reg) = self.functions[id.0].return_register {
            return Some(reg);
        }
        let reg = self.regs.allocate(RegClass::General);
        self.functions[id.0].return_register = Some(reg);
        self.scope.owned.push(reg);
        Some(reg)
    }

    fn emit(&mut self, instruction: Instruction) {
        match self.scope.insertion_point() {
            Some((func, block)) => {
                log::trace!(
                    "{}: {}",
                    self.functions[func.0].name,
                    instruction.render(&self.regs)
                );
                match instruction.opcode {
                    Opcode::Push => {
                        self.scope.stack_depth += 1;
                        let function = &mut self.functions[func.0];
                        function.stack_size = function
                            .stack_size
                            .max(self.scope.stack_depth * STACK_SLOT_SIZE);
                    }
                    Opcode::Pop => self.scope.stack_depth = self.scope.stack_depth.saturating_sub(1),
                    _ => {}
                }
                self.functions[func.0].block_mut(block).push(instruction);
            }
            None => log::trace!("no open function, dropping {:?}", instruction.opcode),
        }
    }

    fn emit_label(&mut self, label: &str) {
        self.emit(Instruction::label(label));
    }

    /// `prefix_N` with a compilation-wide counter.
    fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}_{}", self.next_label);
        self.next_label += 1;
        label
    }

    /// Call a runtime or builtin symbol.
    ///
    /// Arguments are pushed in reverse order and popped back into scratch
    /// registers after the call. The result is a fresh register.
    fn runtime_call(&mut self, symbol: &str, args: &[RegId]) -> RegId {
        for arg in args.iter().rev() {
            self.emit(Instruction::with_operands(Opcode::Push, &[*arg]));
        }
        self.emit(Instruction::with_target(Opcode::Call, symbol));
        self.pop_arguments(args.len());
        self.regs.allocate(RegClass::General)
    }

    fn pop_arguments(&mut self, count: usize) {
        for _ in 0..count {
            let scratch = self.regs.allocate(RegClass::General);
            self.emit(Instruction::with_operands(Opcode::Pop, &[scratch]));
            self.regs.free(scratch);
        }
    }

    /// Slot number for a member name, assigned in first-seen order.
    fn member_slot(&mut self, member: &str) -> i64 {
        let next = self.member_slots.len() as i64;
        *self.member_slots.entry(member.to_string()).or_insert(next)
    }

    fn error(&mut self, node: AstNodeKind, error: CodegenError) {
        self.diagnostics.record(Some(node), error);
    }
}
