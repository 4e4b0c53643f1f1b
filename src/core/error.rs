// This module defines the error types of the code generator using thiserror. CodegenError
// covers the two classes of failure: fatal problems with the AST root that abort generation,
// and recoverable problems (undefined identifiers, operators in an invalid position, break or
// continue outside a loop, unwritable output files) that are recorded and skipped. Every
// variant displays with the "Code Generation Error: " prefix. A Diagnostic pairs an error with
// the kind of AST node being lowered when it occurred, and Diagnostics is the append-only
// accumulator the generator fills during a compilation and exposes to callers afterwards.

//! Error types for the code generator.

use crate::ast::{AstNodeKind, Operator};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Code Generation Error: No AST provided")]
    MissingAst,

    #[error("Code Generation Error: Expected program node")]
    NotAProgram,

    #[error("Code Generation Error: Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Code Generation Error: Unknown binary operator: {}", op.symbol())]
    UnknownBinaryOperator { op: Operator },

    #[error("Code Generation Error: Unknown unary operator: {}", op.symbol())]
    UnknownUnaryOperator { op: Operator },

    #[error("Code Generation Error: Break statement outside loop")]
    BreakOutsideLoop,

    #[error("Code Generation Error: Continue statement outside loop")]
    ContinueOutsideLoop,

    #[error("Code Generation Error: Cannot open output file: {}", path.display())]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Code Generation Error: Unsupported target platform: {name}")]
    UnsupportedPlatform { name: String },
}

impl CodegenError {
    /// Whether generation must stop right away. Fatal errors are logged at
    /// error level, recoverable ones at warn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodegenError::MissingAst | CodegenError::NotAProgram)
    }
}

/// Result type alias for code generation operations.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// An error plus the kind of node being lowered when it was raised.
#[derive(Debug)]
pub struct Diagnostic {
    pub node: Option<AstNodeKind>,
    pub error: CodegenError,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node: Option<AstNodeKind>, error: CodegenError) {
        let level = if error.is_fatal() { log::Level::Error } else { log::Level::Warn };
        match node {
            Some(kind) => log::log!(level, "{error} (while lowering {kind})"),
            None => log::log!(level, "{error}"),
        }
        self.entries.push(Diagnostic { node, error });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Rendered messages, in recording order.
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_prefix() {
        let mut diags = Diagnostics::new();
        diags.record(
            Some(AstNodeKind::IdentifierExpr),
            CodegenError::UndefinedVariable { name: "foo".into() },
        );
        diags.record(Some(AstNodeKind::BreakStmt), CodegenError::BreakOutsideLoop);

        assert_eq!(
            diags.messages(),
            vec![
                "Code Generation Error: Undefined variable: foo".to_string(),
                "Code Generation Error: Break statement outside loop".to_string(),
            ]
        );
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_operator_errors_use_symbols() {
        let err = CodegenError::UnknownBinaryOperator { op: Operator::Not };
        assert_eq!(err.to_string(), "Code Generation Error: Unknown binary operator: not");
        assert!(!err.is_fatal());
        assert!(CodegenError::NotAProgram.is_fatal());
    }
}
