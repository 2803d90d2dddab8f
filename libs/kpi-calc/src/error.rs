//! Error types for kpi-calc

use thiserror::Error;

/// Formula parsing and evaluation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("Formula is empty")]
    EmptyFormula,

    #[error("Missing or invalid operand: {0}")]
    MissingOperand(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid argument count for {function}: expected {expected}, got {got}")]
    ArityMismatch {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Malformed expression at position {position}: {message}")]
    MalformedExpression { position: usize, message: String },

    #[error("{function}: {message}")]
    DomainError { function: String, message: String },

    #[error("Arithmetic overflow")]
    Overflow,
}

impl FormulaError {
    pub fn malformed(position: usize, message: impl Into<String>) -> Self {
        Self::MalformedExpression {
            position,
            message: message.into(),
        }
    }

    pub fn domain(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DomainError {
            function: function.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FormulaError>;
