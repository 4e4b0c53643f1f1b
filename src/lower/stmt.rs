//! Statement lowering.

use super::Lowerer;
use crate::ast::{AstNodeKind, ClassDecl, Expr, MatchCase, Stmt};
use crate::core::{CodegenError, Instruction, Opcode, RegClass};

impl Lowerer<'_> {
    pub(super) fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => self.lower_binding(&decl.name, decl.initializer.as_ref()),
            Stmt::ConstDecl(decl) => self.lower_binding(&decl.name, Some(&decl.value)),
            Stmt::FuncDecl(decl) => self.lower_function(&decl.name, decl, false),
            Stmt::ClassDecl(decl) => self.lower_class(decl),
            Stmt::SignalDecl(decl) => {
                log::trace!("registering signal {}", decl.name);
                let name_addr = self.regs.allocate(RegClass::General);
                self.emit(Instruction::with_immediate(Opcode::Mov, name_addr, 0));
                let result = self.runtime_call("_register_signal", &[name_addr]);
                self.regs.free(result);
                self.regs.free(name_addr);
            }
            // Enum values were resolved by the analyzer.
            Stmt::EnumDecl(_) => {}
            Stmt::Block(statements) => {
                for stmt in statements {
                    self.lower_stmt(stmt);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch.as_deref()),
            Stmt::While { condition, body } => self.lower_while(condition, body),
            Stmt::For {
                variable,
                iterable,
                body,
            } => self.lower_for(variable, iterable, body),
            Stmt::Match { scrutinee, cases } => self.lower_match(scrutinee, cases),
            Stmt::Return(value) => self.lower_return(value.as_ref()),
            Stmt::Expression(expr) => {
                let reg = self.lower_expr(expr);
                self.regs.free(reg);
            }
            Stmt::Break => match self.scope.loops.break_target().map(str::to_string) {
                Some(target) => self.emit(Instruction::with_target(Opcode::Jmp, target)),
                None => self.error(AstNodeKind::BreakStmt, CodegenError::BreakOutsideLoop),
            },
            Stmt::Continue => match self.scope.loops.continue_target().map(str::to_string) {
                Some(target) => self.emit(Instruction::with_target(Opcode::Jmp, target)),
                None => self.error(AstNodeKind::ContinueStmt, CodegenError::ContinueOutsideLoop),
            },
            Stmt::Pass => self.emit(Instruction::new(Opcode::Nop)),
        }
    }

    /// `var`/`const`: a register named after the variable, initialized from
    /// the value or zero.
    fn lower_binding(&mut self, name: &str, value: Option<&Expr>) {
        let reg = self.regs.allocate_named(RegClass::General, name);
        self.scope.bind_owned(name, reg);
        match value {
            Some(expr) => {
                let init = self.lower_expr(expr);
                self.emit(Instruction::with_operands(Opcode::Mov, &[reg, init]));
                self.regs.free(init);
            }
            None => self.emit(Instruction::with_immediate(Opcode::Mov, reg, 0)),
        }
    }

    fn lower_class(&mut self, decl: &ClassDecl) {
        log::debug!("lowering class {}", decl.name);
        self.current_class = Some(decl.name.clone());

        for member in &decl.members {
            if let Stmt::VarDecl(field) = member {
                let reg = self.regs.allocate_named(RegClass::General, &field.name);
                self.class_members.insert(field.name.clone(), reg);
            }
        }

        for member in &decl.members {
            if let Stmt::FuncDecl(method) = member {
                let mangled = format!("{}_{}", decl.name, method.name);
                self.lower_function(&mangled, method, !method.is_static);
            }
        }

        for (_, reg) in self.class_members.drain() {
            self.regs.free(reg);
        }
        self.current_class = None;
    }

    fn lower_if(&mut self, condition: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) {
        let cond = self.lower_expr(condition);
        let else_label = self.new_label("else");
        let end_label = self.new_label("endif");

        self.emit(Instruction::with_immediate(Opcode::Cmp, cond, 0));
        self.emit(Instruction::with_target(Opcode::Je, else_label.as_str()));
        self.regs.free(cond);

        self.lower_stmt(then_branch);
        self.emit(Instruction::with_target(Opcode::Jmp, end_label.as_str()));

        self.emit_label(&else_label);
        if let Some(else_branch) = else_branch {
            self.lower_stmt(else_branch);
        }
        self.emit_label(&end_label);
    }

    fn lower_while(&mut self, condition: &Expr, body: &Stmt) {
        let loop_label = self.new_label("while_loop");
        let end_label = self.new_label("while_end");
        self.scope.loops.push(&end_label, &loop_label);

        self.emit_label(&loop_label);
        let cond = self.lower_expr(condition);
        self.emit(Instruction::with_immediate(Opcode::Cmp, cond, 0));
        self.emit(Instruction::with_target(Opcode::Je, end_label.as_str()));
        self.regs.free(cond);

        self.lower_stmt(body);
        self.emit(Instruction::with_target(Opcode::Jmp, loop_label.as_str()));
        self.emit_label(&end_label);

        self.scope.loops.pop();
    }

    /// `for` loops drive the runtime iterator protocol.
    fn lower_for(&mut self, variable: &str, iterable: &Expr, body: &Stmt) {
        let iterable_reg = self.lower_expr(iterable);
        let iterator = self.regs.allocate(RegClass::General);
        let loop_var = self.regs.allocate_named(RegClass::General, variable);
        self.scope.bind_owned(variable, loop_var);

        let loop_label = self.new_label("for_loop");
        let end_label = self.new_label("for_end");
        self.scope.loops.push(&end_label, &loop_label);

        self.emit(Instruction::with_operands(Opcode::Mov, &[iterator, iterable_reg]));
        self.emit_label(&loop_label);

        let valid = self.runtime_call("_iterator_valid", &[iterator]);
        self.emit(Instruction::with_immediate(Opcode::Cmp, valid, 0));
        self.emit(Instruction::with_target(Opcode::Je, end_label.as_str()));
        self.regs.free(valid);

        let current = self.runtime_call("_iterator_get", &[iterator]);
        self.emit(Instruction::with_operands(Opcode::Mov, &[loop_var, current]));
        self.regs.free(current);

        self.lower_stmt(body);

        let advanced = self.runtime_call("_iterator_next", &[iterator]);
        self.regs.free(advanced);
        self.emit(Instruction::with_target(Opcode::Jmp, loop_label.as_str()));
        self.emit_label(&end_label);

        self.regs.free(iterable_reg);
        self.regs.free(iterator);
        self.scope.loops.pop();
    }

    /// Sequential compare chain; the first matching case wins. With no
    /// match control continues at the end label.
    fn lower_match(&mut self, scrutinee: &Expr, cases: &[MatchCase]) {
        let value = self.lower_expr(scrutinee);
        let end_label = self.new_label("match_end");
        let case_labels: Vec<String> = (0..cases.len())
            .map(|i| self.new_label(&format!("match_case_{i}")))
            .collect();

        for (case, label) in cases.iter().zip(&case_labels) {
            let pattern = self.lower_expr(&case.pattern);
            self.emit(Instruction::with_operands(Opcode::Cmp, &[value, pattern]));
            self.emit(Instruction::with_target(Opcode::Je, label.as_str()));
            self.regs.free(pattern);
        }
        self.emit(Instruction::with_target(Opcode::Jmp, end_label.as_str()));

        for (case, label) in cases.iter().zip(&case_labels) {
            self.emit_label(label);
            self.lower_stmt(&case.body);
            self.emit(Instruction::with_target(Opcode::Jmp, end_label.as_str()));
        }

        self.emit_label(&end_label);
        self.regs.free(value);
    }

    fn lower_return(&mut self, value: Option<&Expr>) {
        if let Some(expr) = value {
            let result = self.lower_expr(expr);
            if let Some(ret) = self.return_register() {
                self.emit(Instruction::with_operands(Opcode::Mov, &[ret, result]));
            }
            self.regs.free(result);
        }
        self.emit(Instruction::new(Opcode::Ret));
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Expr, MatchCase, Operator, Program, Stmt};
    use crate::core::{Instruction, Opcode};
    use crate::lower::{LoweredProgram, Lowerer};

    fn lower(body: Vec<Stmt>) -> LoweredProgram {
        let program = Program::new(vec![Stmt::func("main", vec![], "", body)]);
        Lowerer::new(None).lower_program(&program)
    }

    fn main_instructions(lowered: &LoweredProgram) -> Vec<&Instruction> {
        lowered.functions[0].instructions().collect()
    }

    #[test]
    fn test_pool_overflow_renders_virtual_registers() {
        let body = (0..9).map(|i| Stmt::var(format!("x{i}"), Some(Expr::int(i)))).collect();
        let lowered = lower(body);
        let rendered: Vec<String> = main_instructions(&lowered)
            .iter()
            .map(|i| i.render(&lowered.registers))
            .collect();
        for line in ["mov v0, #7", "mov r7, v0", "mov v2, #8", "mov v1, v2"] {
            assert!(rendered.iter().any(|l| l == line), "{line} missing from {rendered:?}");
        }
    }

    #[test]
    fn test_nested_function_has_its_own_loop_stack() {
        let lowered = lower(vec![Stmt::While {
            condition: Expr::int(1),
            body: Box::new(Stmt::Block(vec![
                Stmt::func("inner", vec![], "", vec![Stmt::Continue]),
                Stmt::Continue,
            ])),
        }]);
        assert_eq!(
            lowered.diagnostics.messages(),
            vec!["Code Generation Error: Continue statement outside loop".to_string()]
        );
        let inner = lowered.functions.iter().find(|f| f.name == "inner").unwrap();
        assert!(inner.instructions().all(|i| i.label.is_none()));
    }

    #[test]
    fn test_while_break_continue_targets() {
        let lowered = lower(vec![Stmt::While {
            condition: Expr::int(1),
            body: Box::new(Stmt::Block(vec![Stmt::Continue, Stmt::Break])),
        }]);
        assert!(lowered.diagnostics.is_empty());

        let instrs = main_instructions(&lowered);
        assert_eq!(instrs[0].render(&lowered.registers), "while_loop_0:");
        let jumps: Vec<_> = instrs
            .iter()
            .filter(|i| i.opcode == Opcode::Jmp)
            .filter_map(|i| i.label.as_deref())
            .collect();
        assert_eq!(jumps, vec!["while_loop_0", "while_end_1", "while_loop_0"]);
    }

    #[test]
    fn test_break_outside_loop_is_recorded() {
        let lowered = lower(vec![Stmt::Break, Stmt::Continue]);
        assert_eq!(
            lowered.diagnostics.messages(),
            vec![
                "Code Generation Error: Break statement outside loop".to_string(),
                "Code Generation Error: Continue statement outside loop".to_string(),
            ]
        );
        // Generation carried on.
        assert_eq!(lowered.functions[0].last_instruction().map(|i| i.opcode), Some(Opcode::Ret));
    }

    #[test]
    fn test_for_uses_iterator_protocol() {
        let lowered = lower(vec![Stmt::For {
            variable: "item".into(),
            iterable: Expr::ArrayLiteral(vec![]),
            body: Box::new(Stmt::Expression(Expr::call("print", vec![Expr::ident("item")]))),
        }]);
        assert!(lowered.diagnostics.is_empty());

        let calls: Vec<_> = main_instructions(&lowered)
            .into_iter()
            .filter(|i| i.opcode == Opcode::Call)
            .filter_map(|i| i.label.clone())
            .collect();
        assert_eq!(
            calls,
            vec![
                "_array_create",
                "_iterator_valid",
                "_iterator_get",
                "_builtin_print",
                "_iterator_next"
            ]
        );
    }

    #[test]
    fn test_match_compare_chain() {
        let lowered = lower(vec![
            Stmt::var("x", Some(Expr::int(2))),
            Stmt::Match {
                scrutinee: Expr::ident("x"),
                cases: vec![
                    MatchCase {
                        pattern: Expr::int(1),
                        body: Stmt::Pass,
                    },
                    MatchCase {
                        pattern: Expr::int(2),
                        body: Stmt::Pass,
                    },
                ],
            },
        ]);
        let regs = &lowered.registers;
        let rendered: Vec<_> = main_instructions(&lowered)
            .into_iter()
            .filter(|i| i.label.is_some())
            .map(|i| i.render(regs))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "je match_case_0_1",
                "je match_case_1_2",
                "jmp match_end_0",
                "match_case_0_1:",
                "jmp match_end_0",
                "match_case_1_2:",
                "jmp match_end_0",
                "match_end_0:",
            ]
        );
    }

    #[test]
    fn test_class_methods_are_mangled() {
        use crate::ast::{ClassDecl, FuncDecl, Parameter};

        let heal = FuncDecl {
            name: "heal".into(),
            parameters: vec![Parameter::new("amount")],
            return_type: String::new(),
            body: Box::new(Stmt::Block(vec![Stmt::Expression(Expr::binary(
                Expr::ident("health"),
                Operator::PlusAssign,
                Expr::ident("amount"),
            ))])),
            is_static: false,
        };
        let create = FuncDecl {
            name: "create".into(),
            parameters: vec![],
            return_type: String::new(),
            body: Box::new(Stmt::Block(vec![])),
            is_static: true,
        };
        let class = Stmt::ClassDecl(ClassDecl {
            name: "Player".into(),
            base_class: String::new(),
            members: vec![
                Stmt::var("health", Some(Expr::int(100))),
                Stmt::FuncDecl(heal),
                Stmt::FuncDecl(create),
            ],
        });
        let lowered = Lowerer::new(None).lower_program(&Program::new(vec![class]));
        assert!(lowered.diagnostics.is_empty(), "{:?}", lowered.diagnostics.messages());

        let names: Vec<_> = lowered.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Player_heal", "Player_create", "main"]);
        // self + amount
        assert_eq!(lowered.functions[0].parameters.len(), 2);
        assert_eq!(lowered.functions[1].parameters.len(), 0);
    }

    #[test]
    fn test_signal_registers_with_runtime() {
        use crate::ast::SignalDecl;

        let lowered = lower(vec![Stmt::SignalDecl(SignalDecl {
            name: "died".into(),
            parameters: vec![],
        })]);
        let regs = &lowered.registers;
        let rendered: Vec<_> = main_instructions(&lowered)
            .into_iter()
            .map(|i| i.render(regs))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "mov r0, #0",
                "push r0",
                "call _register_signal",
                "pop r1",
                "ret"
            ]
        );
    }
}
