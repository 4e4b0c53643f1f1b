//! Expression lowering.
//!
//! Every expression lowers to a freshly allocated result register which the
//! caller releases once it has consumed the value.

use super::{builtin_symbol, Lowerer};
use crate::ast::{AstNodeKind, Expr, Literal, Operator, Parameter};
use crate::core::{CodegenError, Instruction, Opcode, RegClass, RegId};

/// Scale applied to float literals before truncation to an integer immediate.
const FLOAT_SCALE: f64 = 1000.0;

impl Lowerer<'_> {
    pub(super) fn lower_expr(&mut self, expr: &Expr) -> RegId {
        match expr {
            Expr::Literal(literal) => self.lower_literal(literal),
            Expr::Identifier(name) => self.lower_identifier(name),
            Expr::Binary { left, op, right } => self.lower_binary(left, *op, right),
            Expr::Unary { op, operand } => self.lower_unary(*op, operand),
            Expr::Call { callee, arguments } => self.lower_call(callee, arguments),
            Expr::MemberAccess { object, member } => {
                let base = self.lower_expr(object);
                let result = self.regs.allocate(RegClass::General);
                let mut load = Instruction::with_operands(Opcode::Load, &[result, base]);
                load.immediate = Some(self.member_slot(member));
                self.emit(load);
                self.regs.free(base);
                result
            }
            Expr::ArrayAccess { array, index } => {
                let array = self.lower_expr(array);
                let index = self.lower_expr(index);
                let result = self.runtime_call("_array_get", &[array, index]);
                self.regs.free(array);
                self.regs.free(index);
                result
            }
            Expr::ArrayLiteral(elements) => {
                let array = self.runtime_call("_array_create", &[]);
                for element in elements {
                    let value = self.lower_expr(element);
                    let status = self.runtime_call("_array_append", &[array, value]);
                    self.regs.free(status);
                    self.regs.free(value);
                }
                array
            }
            Expr::DictLiteral(pairs) => {
                let dict = self.runtime_call("_dict_create", &[]);
                for (key, value) in pairs {
                    let key = self.lower_expr(key);
                    let value = self.lower_expr(value);
                    let status = self.runtime_call("_dict_set", &[dict, key, value]);
                    self.regs.free(status);
                    self.regs.free(key);
                    self.regs.free(value);
                }
                dict
            }
            Expr::Lambda { parameters, body } => self.lower_lambda(parameters, body),
            Expr::Ternary {
                condition,
                true_expr,
                false_expr,
            } => self.lower_ternary(condition, true_expr, false_expr),
        }
    }

    fn lower_literal(&mut self, literal: &Literal) -> RegId {
        let (class, value) = match literal {
            Literal::Integer(value) => (RegClass::General, *value),
            // Fixed-point stand-in until float immediates are supported.
            Literal::Float(value) => (RegClass::Float, (value * FLOAT_SCALE) as i64),
            // String table linkage does not exist yet; load a null address.
            Literal::String(_) => (RegClass::General, 0),
            Literal::Boolean(value) => (RegClass::General, i64::from(*value)),
            Literal::Null => (RegClass::General, 0),
        };
        let reg = self.regs.allocate(class);
        self.emit(Instruction::with_immediate(Opcode::Mov, reg, value));
        reg
    }

    /// Register already bound to `name` in the local scope or class.
    fn bound_register(&self, name: &str) -> Option<RegId> {
        self.scope
            .lookup(name)
            .or_else(|| self.class_members.get(name).copied())
    }

    /// Resolve an identifier and copy its value into a fresh register.
    ///
    /// Lookup order: local variables, class members, then the symbol table
    /// (global symbol, global function, class member, class method). An
    /// unresolved name is reported and still yields a register.
    fn lower_identifier(&mut self, name: &str) -> RegId {
        if let Some(bound) = self.bound_register(name) {
            return self.copy_of(bound);
        }

        let Some(symbols) = self.symbols else {
            return self.undefined(name);
        };

        if symbols.has_global_symbol(name) {
            let reg = self.regs.allocate_named(RegClass::General, name);
            self.scope.bind_owned(name, reg);
            return self.copy_of(reg);
        }
        if symbols.has_global_function(name) {
            return self.address_placeholder();
        }
        if let Some(class) = self.current_class.clone() {
            if symbols.class_has_member(&class, name) {
                let reg = self.regs.allocate_named(RegClass::General, name);
                self.class_members.insert(name.to_string(), reg);
                return self.copy_of(reg);
            }
            if symbols.class_has_method(&class, name) {
                return self.address_placeholder();
            }
        }

        self.undefined(name)
    }

    fn copy_of(&mut self, source: RegId) -> RegId {
        let result = self.regs.allocate(RegClass::General);
        self.emit(Instruction::with_operands(Opcode::Mov, &[result, source]));
        result
    }

    fn address_placeholder(&mut self) -> RegId {
        let result = self.regs.allocate(RegClass::General);
        self.emit(Instruction::with_immediate(Opcode::Mov, result, 0));
        result
    }

    fn undefined(&mut self, name: &str) -> RegId {
        self.error(
            AstNodeKind::IdentifierExpr,
            CodegenError::UndefinedVariable {
                name: name.to_string(),
            },
        );
        self.regs.allocate(RegClass::General)
    }

    fn lower_binary(&mut self, left: &Expr, op: Operator, right: &Expr) -> RegId {
        if let Some(compute) = assignment_opcode(op) {
            return self.lower_assignment(left, compute, right);
        }

        let lhs = self.lower_expr(left);
        let rhs = self.lower_expr(right);
        let result = self.regs.allocate(RegClass::General);

        if let Some(opcode) = arithmetic_opcode(op) {
            self.emit(Instruction::with_operands(opcode, &[result, lhs, rhs]));
        } else if let Some(branch) = comparison_branch(op) {
            self.emit(Instruction::with_operands(Opcode::Cmp, &[lhs, rhs]));
            let true_label = self.new_label("cmp_true");
            let end_label = self.new_label("cmp_end");
            self.emit(Instruction::with_target(branch, true_label.as_str()));
            self.emit(Instruction::with_immediate(Opcode::Mov, result, 0));
            self.emit(Instruction::with_target(Opcode::Jmp, end_label.as_str()));
            self.emit_label(&true_label);
            self.emit(Instruction::with_immediate(Opcode::Mov, result, 1));
            self.emit_label(&end_label);
        } else {
            self.error(
                AstNodeKind::BinaryOpExpr,
                CodegenError::UnknownBinaryOperator { op },
            );
            self.emit(Instruction::with_immediate(Opcode::Mov, result, 0));
        }

        self.regs.free(lhs);
        self.regs.free(rhs);
        result
    }

    /// Plain and compound assignment.
    ///
    /// An identifier target is written through its own register; any other
    /// target is evaluated into a temporary. The assigned value is also
    /// copied into a fresh result register.
    fn lower_assignment(&mut self, target: &Expr, compute: Option<Opcode>, value: &Expr) -> RegId {
        let bound = match target {
            Expr::Identifier(name) => self.bound_register(name),
            _ => None,
        };
        let dest = match bound {
            Some(reg) => reg,
            None => self.lower_expr(target),
        };
        let rhs = self.lower_expr(value);
        let result = self.regs.allocate(RegClass::General);

        match compute {
            Some(opcode) => self.emit(Instruction::with_operands(opcode, &[dest, dest, rhs])),
            None => self.emit(Instruction::with_operands(Opcode::Mov, &[dest, rhs])),
        }
        self.emit(Instruction::with_operands(Opcode::Mov, &[result, dest]));

        if bound.is_none() {
            self.regs.free(dest);
        }
        self.regs.free(rhs);
        result
    }

    fn lower_unary(&mut self, op: Operator, operand: &Expr) -> RegId {
        let value = self.lower_expr(operand);
        let result = self.regs.allocate(RegClass::General);

        match op {
            Operator::Minus => {
                let zero = self.regs.allocate(RegClass::General);
                self.emit(Instruction::with_immediate(Opcode::Mov, zero, 0));
                self.emit(Instruction::with_operands(Opcode::Sub, &[result, zero, value]));
                self.regs.free(zero);
            }
            Operator::Plus => self.emit(Instruction::with_operands(Opcode::Mov, &[result, value])),
            Operator::Not | Operator::LogicalNot => {
                self.emit(Instruction::with_operands(Opcode::Not, &[result, value]))
            }
            _ => {
                self.error(
                    AstNodeKind::UnaryOpExpr,
                    CodegenError::UnknownUnaryOperator { op },
                );
                self.emit(Instruction::with_operands(Opcode::Mov, &[result, value]));
            }
        }

        self.regs.free(value);
        result
    }

    fn lower_call(&mut self, callee: &Expr, arguments: &[Expr]) -> RegId {
        let args: Vec<RegId> = arguments.iter().map(|arg| self.lower_expr(arg)).collect();

        let result = match callee {
            Expr::Identifier(name) => match builtin_symbol(name) {
                Some(symbol) => self.runtime_call(symbol, &args),
                None => self.runtime_call(name, &args),
            },
            indirect => {
                let target = self.lower_expr(indirect);
                for arg in args.iter().rev() {
                    self.emit(Instruction::with_operands(Opcode::Push, &[*arg]));
                }
                self.emit(Instruction::with_operands(Opcode::Call, &[target]));
                self.pop_arguments(args.len());
                self.regs.free(target);
                self.regs.allocate(RegClass::General)
            }
        };

        for arg in args {
            self.regs.free(arg);
        }
        result
    }

    /// Lambdas become `_lambda_N` functions; the expression itself yields a
    /// function-address placeholder in the enclosing function.
    fn lower_lambda(&mut self, parameters: &[Parameter], body: &Expr) -> RegId {
        let name = self.new_label("_lambda");
        let id = self.open_function(&name);

        for param in parameters {
            let reg = self.regs.allocate_named(RegClass::General, &param.name);
            self.scope.bind_owned(&param.name, reg);
            self.functions[id.0].parameters.push(reg);
        }

        let value = self.lower_expr(body);
        if let Some(ret) = self.return_register() {
            self.emit(Instruction::with_operands(Opcode::Mov, &[ret, value]));
        }
        self.emit(Instruction::new(Opcode::Ret));
        self.regs.free(value);
        self.close_function();

        self.address_placeholder()
    }

    fn lower_ternary(&mut self, condition: &Expr, true_expr: &Expr, false_expr: &Expr) -> RegId {
        let cond = self.lower_expr(condition);
        let false_label = self.new_label("ternary_false");
        let end_label = self.new_label("ternary_end");

        self.emit(Instruction::with_immediate(Opcode::Cmp, cond, 0));
        self.emit(Instruction::with_target(Opcode::Je, false_label.as_str()));
        self.regs.free(cond);

        let then_value = self.lower_expr(true_expr);
        let result = self.regs.allocate(RegClass::General);
        self.emit(Instruction::with_operands(Opcode::Mov, &[result, then_value]));
        self.regs.free(then_value);
        self.emit(Instruction::with_target(Opcode::Jmp, end_label.as_str()));

        self.emit_label(&false_label);
        let else_value = self.lower_expr(false_expr);
        self.emit(Instruction::with_operands(Opcode::Mov, &[result, else_value]));
        self.regs.free(else_value);

        self.emit_label(&end_label);
        result
    }
}

fn arithmetic_opcode(op: Operator) -> Option<Opcode> {
    match op {
        Operator::Plus => Some(Opcode::Add),
        Operator::Minus => Some(Opcode::Sub),
        Operator::Multiply => Some(Opcode::Mul),
        Operator::Divide => Some(Opcode::Div),
        Operator::Modulo => Some(Opcode::Mod),
        // No short-circuit evaluation.
        Operator::And => Some(Opcode::And),
        Operator::Or => Some(Opcode::Or),
        _ => None,
    }
}

fn comparison_branch(op: Operator) -> Option<Opcode> {
    match op {
        Operator::Equal => Some(Opcode::Je),
        Operator::NotEqual => Some(Opcode::Jne),
        Operator::Less => Some(Opcode::Jl),
        Operator::LessEqual => Some(Opcode::Jle),
        Operator::Greater => Some(Opcode::Jg),
        Operator::GreaterEqual => Some(Opcode::Jge),
        _ => None,
    }
}

/// `Some(None)` for plain assignment, `Some(Some(op))` for compound.
fn assignment_opcode(op: Operator) -> Option<Option<Opcode>> {
    match op {
        Operator::Assign | Operator::TypeInferAssign => Some(None),
        Operator::PlusAssign => Some(Some(Opcode::Add)),
        Operator::MinusAssign => Some(Some(Opcode::Sub)),
        Operator::MultiplyAssign => Some(Some(Opcode::Mul)),
        Operator::DivideAssign => Some(Some(Opcode::Div)),
        Operator::ModuloAssign => Some(Some(Opcode::Mod)),
        _ => None,
    }
}
