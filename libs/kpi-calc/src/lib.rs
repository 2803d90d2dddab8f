//! kpi-calc - Formula evaluator for the KPI engine
//!
//! Parses arithmetic formulas over metric identifiers into an expression tree
//! and evaluates them with decimal arithmetic.
//!
//! # Features
//!
//! - **Identifiers**: `category.subCategory.name`, segments may be CJK
//! - **Operators**: `+ - * / ^` and parentheses
//! - **Functions**: `abs()`, `sqrt()`, `log()`, `exp()`, `min()`, `max()`
//!
//! # Example
//!
//! ```rust
//! use kpi_calc::{evaluate, validate_syntax, FormulaError};
//! use std::collections::HashMap;
//!
//! let mut vars = HashMap::new();
//! vars.insert("grid.feeder.a".to_string(), 16.0);
//! vars.insert("grid.feeder.b".to_string(), 4.0);
//!
//! assert_eq!(evaluate("sqrt(grid.feeder.a)", &vars).unwrap(), 4.0);
//! assert_eq!(evaluate("max(grid.feeder.a, grid.feeder.b)", &vars).unwrap(), 16.0);
//!
//! vars.insert("grid.feeder.b".to_string(), 0.0);
//! assert_eq!(
//!     evaluate("grid.feeder.a / grid.feeder.b", &vars),
//!     Err(FormulaError::DivisionByZero)
//! );
//!
//! assert!(validate_syntax("(grid.feeder.a + 1) * 2"));
//! assert!(!validate_syntax("grid.feeder.a + * 2"));
//! ```
//!
//! # Evaluation rules
//!
//! | Rule | Behavior |
//! |------|----------|
//! | Precedence | `^` before `* /` before `+ -`, all left-to-right |
//! | Power | right operand truncated to an integer exponent |
//! | Division | by exact zero fails; result rounded half-up to 10 digits |
//! | Operands | missing or non-`Good` value fails with `MissingOperand` |

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod identifier;
pub mod lexer;
pub mod parser;

// Re-exports for convenience
pub use ast::{BinaryOp, Expr, UnaryOp};
pub use error::{FormulaError, Result};
pub use evaluator::{evaluate, evaluate_expr, OperandSource, DECIMAL_PRECISION};
pub use functions::{supported_functions, Arity, Function};
pub use identifier::extract_identifiers;
pub use parser::parse;

/// Check a formula's syntax without operand values
///
/// Catches unbalanced parentheses, doubled operators, stray characters and
/// unknown functions or wrong argument counts.
pub fn check_syntax(formula: &str) -> Result<()> {
    parse(formula).map(|_| ())
}

/// Cheap pre-check used to reject obviously malformed formulas
pub fn validate_syntax(formula: &str) -> bool {
    check_syntax(formula).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid() {
        assert!(validate_syntax("1 + 2"));
        assert!(validate_syntax("a.b.c * x.y.z"));
        assert!(validate_syntax("min(a.b.c, 2, 3)"));
        assert!(validate_syntax("-(a.b.c ^ 2) / 4"));
    }

    #[test]
    fn test_validate_invalid() {
        assert!(!validate_syntax(""));
        assert!(!validate_syntax("1 +"));
        assert!(!validate_syntax("((1 + 2)"));
        assert!(!validate_syntax("1 + 2)"));
        assert!(!validate_syntax("a.b.c ** 2"));
        assert!(!validate_syntax("median(a.b.c, 2)"));
        assert!(!validate_syntax("Max(a.b.c, 2)"));
        assert!(!validate_syntax("sqrt(a.b.c, 2)"));
    }

    #[test]
    fn test_check_syntax_reports_reason() {
        assert_eq!(
            check_syntax("median(1, 2)"),
            Err(FormulaError::UnknownFunction("median".to_string()))
        );
        assert_eq!(check_syntax(" "), Err(FormulaError::EmptyFormula));
    }
}
