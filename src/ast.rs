//! Syntax tree handed over by the parser.
//!
//! The backend only reads this tree. Node shapes follow the parser's
//! published contract: a [`Program`] root holding statements, statements
//! holding expressions. Literal text has already been converted to typed
//! values by the parser.

/// Root handed to [`crate::CodeGenerator::generate`].
///
/// Anything other than [`AstNode::Program`] is rejected as a fatal error.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Program(Program),
    Statement(Stmt),
    Expression(Expr),
}

impl AstNode {
    pub fn kind(&self) -> AstNodeKind {
        match self {
            AstNode::Program(_) => AstNodeKind::Program,
            AstNode::Statement(stmt) => stmt.kind(),
            AstNode::Expression(expr) => expr.kind(),
        }
    }
}

impl From<Program> for AstNode {
    fn from(program: Program) -> Self {
        AstNode::Program(program)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

/// Function, lambda or signal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// Declared type name, empty when untyped.
    pub type_name: String,
    pub default_value: Option<Expr>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: String::new(),
            default_value: None,
        }
    }

    pub fn typed(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default_value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub type_name: String,
    pub initializer: Option<Expr>,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Declared return type; empty or `"void"` means no value is returned.
    pub return_type: String,
    pub body: Box<Stmt>,
    pub is_static: bool,
}

impl FuncDecl {
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_empty() && self.return_type != "void"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub base_class: String,
    /// Field and method declarations; other statement kinds are ignored.
    pub members: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecl {
    pub name: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: Expr,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl(VarDecl),
    ConstDecl(ConstDecl),
    FuncDecl(FuncDecl),
    ClassDecl(ClassDecl),
    SignalDecl(SignalDecl),
    EnumDecl(EnumDecl),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        /// An `elif` chain arrives here as a nested [`Stmt::If`].
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    For {
        variable: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Match {
        scrutinee: Expr,
        cases: Vec<MatchCase>,
    },
    Return(Option<Expr>),
    Expression(Expr),
    Break,
    Continue,
    Pass,
}

impl Stmt {
    pub fn kind(&self) -> AstNodeKind {
        match self {
            Stmt::VarDecl(_) => AstNodeKind::VarDecl,
            Stmt::ConstDecl(_) => AstNodeKind::ConstDecl,
            Stmt::FuncDecl(_) => AstNodeKind::FuncDecl,
            Stmt::ClassDecl(_) => AstNodeKind::ClassDecl,
            Stmt::SignalDecl(_) => AstNodeKind::SignalDecl,
            Stmt::EnumDecl(_) => AstNodeKind::EnumDecl,
            Stmt::Block(_) => AstNodeKind::BlockStmt,
            Stmt::If { .. } => AstNodeKind::IfStmt,
            Stmt::While { .. } => AstNodeKind::WhileStmt,
            Stmt::For { .. } => AstNodeKind::ForStmt,
            Stmt::Match { .. } => AstNodeKind::MatchStmt,
            Stmt::Return(_) => AstNodeKind::ReturnStmt,
            Stmt::Expression(_) => AstNodeKind::ExpressionStmt,
            Stmt::Break => AstNodeKind::BreakStmt,
            Stmt::Continue => AstNodeKind::ContinueStmt,
            Stmt::Pass => AstNodeKind::PassStmt,
        }
    }

    pub fn var(name: impl Into<String>, initializer: Option<Expr>) -> Self {
        Stmt::VarDecl(VarDecl {
            name: name.into(),
            type_name: String::new(),
            initializer,
            is_static: false,
        })
    }

    pub fn func(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: impl Into<String>,
        body: Vec<Stmt>,
    ) -> Self {
        Stmt::FuncDecl(FuncDecl {
            name: name.into(),
            parameters,
            return_type: return_type.into(),
            body: Box::new(Stmt::Block(body)),
            is_static: false,
        })
    }

    pub fn if_else(condition: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Self {
        Stmt::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// Operator tokens as the parser forwards them.
///
/// Binary and unary expressions share one operator set, so a tree can carry
/// an operator that makes no sense in its position (e.g. `Not` as a binary
/// operator). Lowering reports those instead of rejecting the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Not,
    LogicalNot,
    Assign,
    PlusAssign,
    MinusAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    /// `:=`
    TypeInferAssign,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::LogicalNot => "!",
            Operator::Assign => "=",
            Operator::PlusAssign => "+=",
            Operator::MinusAssign => "-=",
            Operator::MultiplyAssign => "*=",
            Operator::DivideAssign => "/=",
            Operator::ModuloAssign => "%=",
            Operator::TypeInferAssign => ":=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(String),
    Binary {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    Unary {
        op: Operator,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    MemberAccess {
        object: Box<Expr>,
        member: String,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    DictLiteral(Vec<(Expr, Expr)>),
    Lambda {
        parameters: Vec<Parameter>,
        body: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
}

impl Expr {
    pub fn kind(&self) -> AstNodeKind {
        match self {
            Expr::Literal(_) => AstNodeKind::LiteralExpr,
            Expr::Identifier(_) => AstNodeKind::IdentifierExpr,
            Expr::Binary { .. } => AstNodeKind::BinaryOpExpr,
            Expr::Unary { .. } => AstNodeKind::UnaryOpExpr,
            Expr::Call { .. } => AstNodeKind::CallExpr,
            Expr::MemberAccess { .. } => AstNodeKind::MemberAccessExpr,
            Expr::ArrayAccess { .. } => AstNodeKind::ArrayAccessExpr,
            Expr::ArrayLiteral(_) => AstNodeKind::ArrayLiteralExpr,
            Expr::DictLiteral(_) => AstNodeKind::DictLiteralExpr,
            Expr::Lambda { .. } => AstNodeKind::LambdaExpr,
            Expr::Ternary { .. } => AstNodeKind::TernaryExpr,
        }
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier(name.into())
    }

    pub fn binary(left: Expr, op: Operator, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: Operator, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(callee: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(Expr::Identifier(callee.into())),
            arguments,
        }
    }
}

/// Tag naming a node kind, attached to diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AstNodeKind {
    Program,
    VarDecl,
    ConstDecl,
    FuncDecl,
    ClassDecl,
    SignalDecl,
    EnumDecl,
    BlockStmt,
    IfStmt,
    WhileStmt,
    ForStmt,
    MatchStmt,
    ReturnStmt,
    ExpressionStmt,
    BreakStmt,
    ContinueStmt,
    PassStmt,
    LiteralExpr,
    IdentifierExpr,
    BinaryOpExpr,
    UnaryOpExpr,
    CallExpr,
    MemberAccessExpr,
    ArrayAccessExpr,
    ArrayLiteralExpr,
    DictLiteralExpr,
    LambdaExpr,
    TernaryExpr,
}

impl std::fmt::Display for AstNodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
