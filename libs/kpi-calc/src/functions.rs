//! Built-in functions
//!
//! | Function | Arity | Description |
//! |----------|-------|-------------|
//! | `abs`  | 1  | Absolute value |
//! | `sqrt` | 1  | Square root, argument must be non-negative |
//! | `log`  | 1  | Natural logarithm, argument must be positive |
//! | `exp`  | 1  | e raised to the argument |
//! | `min`  | ≥2 | Smallest argument |
//! | `max`  | ≥2 | Largest argument |
//!
//! `sqrt`, `log` and `exp` are computed in `f64` and converted back to a
//! decimal rounded to [`crate::evaluator::DECIMAL_PRECISION`] fractional digits.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::{FormulaError, Result};
use crate::evaluator::round_to_precision;

/// Accepted number of arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Arity::Exactly(n) => n.to_string(),
            Arity::AtLeast(n) => format!("at least {}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Sqrt,
    Log,
    Exp,
    Min,
    Max,
}

impl Function {
    /// Look up a function by its case-sensitive name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Function::Abs),
            "sqrt" => Some(Function::Sqrt),
            "log" => Some(Function::Log),
            "exp" => Some(Function::Exp),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
            Function::Exp => "exp",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Function::Abs | Function::Sqrt | Function::Log | Function::Exp => Arity::Exactly(1),
            Function::Min | Function::Max => Arity::AtLeast(2),
        }
    }

    /// Fail with `ArityMismatch` when `count` arguments are not accepted
    pub fn check_arity(&self, count: usize) -> Result<()> {
        let arity = self.arity();
        if arity.accepts(count) {
            Ok(())
        } else {
            Err(FormulaError::ArityMismatch {
                function: self.name().to_string(),
                expected: arity.describe(),
                got: count,
            })
        }
    }

    /// Apply the function to already evaluated arguments
    pub fn apply(&self, args: &[Decimal]) -> Result<Decimal> {
        self.check_arity(args.len())?;

        match self {
            Function::Abs => Ok(args[0].abs()),
            Function::Sqrt => {
                if args[0].is_sign_negative() && !args[0].is_zero() {
                    return Err(FormulaError::domain(
                        self.name(),
                        format!("argument {} is negative", args[0]),
                    ));
                }
                self.via_f64(args[0], f64::sqrt)
            },
            Function::Log => {
                if args[0] <= Decimal::ZERO {
                    return Err(FormulaError::domain(
                        self.name(),
                        format!("argument {} is not positive", args[0]),
                    ));
                }
                self.via_f64(args[0], f64::ln)
            },
            Function::Exp => self.via_f64(args[0], f64::exp),
            Function::Min => Ok(args.iter().copied().fold(args[0], std::cmp::min)),
            Function::Max => Ok(args.iter().copied().fold(args[0], std::cmp::max)),
        }
    }

    fn via_f64(&self, arg: Decimal, f: fn(f64) -> f64) -> Result<Decimal> {
        let input = arg.to_f64().ok_or(FormulaError::Overflow)?;
        let output = f(input);
        if !output.is_finite() {
            return Err(FormulaError::Overflow);
        }
        Decimal::from_f64(output)
            .map(round_to_precision)
            .ok_or(FormulaError::Overflow)
    }
}

/// Names of all built-in functions
pub fn supported_functions() -> &'static [&'static str] {
    &["abs", "sqrt", "log", "exp", "min", "max"]
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert_eq!(Function::from_name("sqrt"), Some(Function::Sqrt));
        assert_eq!(Function::from_name("SQRT"), None);
        assert_eq!(Function::from_name("round"), None);
        for name in supported_functions() {
            assert_eq!(Function::from_name(name).unwrap().name(), *name);
        }
    }

    #[test]
    fn test_arity() {
        assert!(Function::Abs.check_arity(1).is_ok());
        assert!(Function::Abs.check_arity(2).is_err());
        assert!(Function::Min.check_arity(1).is_err());
        assert!(Function::Max.check_arity(5).is_ok());
    }

    #[test]
    fn test_sqrt() {
        assert_eq!(Function::Sqrt.apply(&[d(16)]).unwrap(), d(4));
        assert_eq!(Function::Sqrt.apply(&[d(0)]).unwrap(), d(0));
        assert!(matches!(
            Function::Sqrt.apply(&[d(-4)]),
            Err(FormulaError::DomainError { .. })
        ));
    }

    #[test]
    fn test_log_exp() {
        assert_eq!(Function::Log.apply(&[d(1)]).unwrap(), d(0));
        assert_eq!(Function::Exp.apply(&[d(0)]).unwrap(), d(1));
        assert!(Function::Log.apply(&[d(0)]).is_err());
        assert!(matches!(
            Function::Exp.apply(&[d(100_000)]),
            Err(FormulaError::Overflow)
        ));
    }

    #[test]
    fn test_min_max_variadic() {
        let args = [d(3), d(-7), d(12), d(5)];
        assert_eq!(Function::Min.apply(&args).unwrap(), d(-7));
        assert_eq!(Function::Max.apply(&args).unwrap(), d(12));
    }

    #[test]
    fn test_abs() {
        assert_eq!(Function::Abs.apply(&[d(-5)]).unwrap(), d(5));
    }
}
