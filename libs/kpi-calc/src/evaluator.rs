//! Decimal expression evaluator
//!
//! Walks an [`Expr`] tree with `rust_decimal` arithmetic so chained rate
//! calculations do not accumulate binary floating point error. Division
//! results are rounded half-up to [`DECIMAL_PRECISION`] fractional digits.

use std::collections::HashMap;

use kpi_model::{MetricId, MetricValue};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::trace;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{FormulaError, Result};
use crate::parser::parse;

/// Fractional digits kept after a division
pub const DECIMAL_PRECISION: u32 = 10;

/// Round half-up to [`DECIMAL_PRECISION`] fractional digits
pub fn round_to_precision(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

/// Supplies operand values for metric identifiers during evaluation
///
/// Returning `None` means the operand is missing or not usable, which fails
/// the evaluation with `MissingOperand`.
pub trait OperandSource {
    fn operand(&self, id: &MetricId) -> Option<f64>;
}

/// Only `Good` values are usable operands
impl OperandSource for HashMap<MetricId, MetricValue> {
    fn operand(&self, id: &MetricId) -> Option<f64> {
        self.get(id).filter(|v| v.is_valid()).and_then(|v| v.value)
    }
}

impl OperandSource for HashMap<String, f64> {
    fn operand(&self, id: &MetricId) -> Option<f64> {
        self.get(id.as_str()).copied().filter(|v| v.is_finite())
    }
}

/// Parse and evaluate a formula
///
/// ```
/// use kpi_calc::evaluate;
/// use std::collections::HashMap;
///
/// let mut values = HashMap::new();
/// values.insert("grid.topology.mismatch".to_string(), 20.0);
/// values.insert("grid.transformer.total".to_string(), 100.0);
///
/// let rate = evaluate(
///     "(1 - grid.topology.mismatch / grid.transformer.total) * 100",
///     &values,
/// )
/// .unwrap();
/// assert_eq!(rate, 80.0);
/// ```
pub fn evaluate<S: OperandSource + ?Sized>(formula: &str, values: &S) -> Result<f64> {
    let expr = parse(formula)?;
    let result = evaluate_expr(&expr, values)?;
    trace!("Evaluated '{}' = {}", formula, result);
    result.to_f64().ok_or(FormulaError::Overflow)
}

/// Evaluate an already parsed expression to a decimal
pub fn evaluate_expr<S: OperandSource + ?Sized>(expr: &Expr, values: &S) -> Result<Decimal> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Metric(id) => {
            let value = values
                .operand(id)
                .ok_or_else(|| FormulaError::MissingOperand(id.to_string()))?;
            Decimal::from_f64(value).ok_or(FormulaError::Overflow)
        },
        Expr::Unary { op, expr } => {
            let value = evaluate_expr(expr, values)?;
            Ok(match op {
                UnaryOp::Neg => -value,
                UnaryOp::Plus => value,
            })
        },
        Expr::Binary { op, left, right } => {
            let l = evaluate_expr(left, values)?;
            let r = evaluate_expr(right, values)?;
            apply_binary(*op, l, r)
        },
        Expr::Call { function, args } => {
            let arg_values = args
                .iter()
                .map(|a| evaluate_expr(a, values))
                .collect::<Result<Vec<_>>>()?;
            function.apply(&arg_values)
        },
    }
}

fn apply_binary(op: BinaryOp, l: Decimal, r: Decimal) -> Result<Decimal> {
    match op {
        BinaryOp::Add => l.checked_add(r).ok_or(FormulaError::Overflow),
        BinaryOp::Sub => l.checked_sub(r).ok_or(FormulaError::Overflow),
        BinaryOp::Mul => l.checked_mul(r).ok_or(FormulaError::Overflow),
        BinaryOp::Div => divide(l, r),
        BinaryOp::Pow => power(l, r),
    }
}

fn divide(l: Decimal, r: Decimal) -> Result<Decimal> {
    if r.is_zero() {
        return Err(FormulaError::DivisionByZero);
    }
    l.checked_div(r)
        .map(round_to_precision)
        .ok_or(FormulaError::Overflow)
}

/// `base ^ exponent` with the exponent truncated to an integer
fn power(base: Decimal, exponent: Decimal) -> Result<Decimal> {
    let n = exponent.trunc().to_i64().ok_or(FormulaError::Overflow)?;
    let magnitude = integer_power(base, n.unsigned_abs())?;
    if n >= 0 {
        Ok(magnitude)
    } else {
        divide(Decimal::ONE, magnitude)
    }
}

/// Exponentiation by squaring with overflow checks
fn integer_power(base: Decimal, mut exp: u64) -> Result<Decimal> {
    let mut result = Decimal::ONE;
    let mut factor = base;

    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(factor).ok_or(FormulaError::Overflow)?;
        }
        exp >>= 1;
        if exp > 0 {
            factor = factor.checked_mul(factor).ok_or(FormulaError::Overflow)?;
        }
    }

    Ok(result)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use kpi_model::Quality;

    fn make_vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn make_values(pairs: &[(&str, f64)]) -> HashMap<MetricId, MetricValue> {
        pairs
            .iter()
            .map(|(k, v)| (MetricId::new(*k), MetricValue::good(MetricId::new(*k), *v, "")))
            .collect()
    }

    #[test]
    fn test_basic_arithmetic() {
        let vars = make_values(&[("kpi.a.val", 10.0), ("kpi.b.val", 5.0)]);

        assert_eq!(evaluate("kpi.a.val + kpi.b.val", &vars).unwrap(), 15.0);
        assert_eq!(evaluate("kpi.a.val - kpi.b.val", &vars).unwrap(), 5.0);
        assert_eq!(evaluate("kpi.a.val * kpi.b.val", &vars).unwrap(), 50.0);
        assert_eq!(evaluate("kpi.a.val / kpi.b.val", &vars).unwrap(), 2.0);
    }

    #[test]
    fn test_rate_formula() {
        let vars = make_values(&[("kpi.a.val", 100.0), ("kpi.b.val", 20.0)]);
        let result = evaluate("(1 - kpi.b.val / kpi.a.val) * 100", &vars).unwrap();
        assert_eq!(result, 80.0);
    }

    #[test]
    fn test_functions() {
        let vars = make_values(&[("kpi.a.val", 16.0), ("kpi.b.val", 4.0)]);
        assert_eq!(evaluate("sqrt(kpi.a.val)", &vars).unwrap(), 4.0);
        assert_eq!(evaluate("max(kpi.a.val,kpi.b.val)", &vars).unwrap(), 16.0);
        assert_eq!(evaluate("min(kpi.a.val, kpi.b.val, 9)", &vars).unwrap(), 4.0);
        assert_eq!(evaluate("abs(kpi.b.val - kpi.a.val)", &vars).unwrap(), 12.0);
    }

    #[test]
    fn test_division_by_zero() {
        let vars = make_values(&[("kpi.a.val", 10.0), ("kpi.b.val", 0.0)]);
        assert_eq!(
            evaluate("kpi.a.val / kpi.b.val", &vars),
            Err(FormulaError::DivisionByZero)
        );
        assert_eq!(
            evaluate("max(1, kpi.a.val / kpi.b.val)", &vars),
            Err(FormulaError::DivisionByZero)
        );
    }

    #[test]
    fn test_decimal_precision() {
        let vars = make_vars(&[]);
        // 0.1 + 0.2 is exact in decimal arithmetic
        assert_eq!(evaluate("0.1 + 0.2", &vars).unwrap(), 0.3);
        // 2 / 3 rounds half-up at the 10th fractional digit
        assert_eq!(evaluate("2 / 3", &vars).unwrap(), 0.6666666667);
        assert_eq!(evaluate("1 / 3 * 3", &vars).unwrap(), 0.9999999999);
    }

    #[test]
    fn test_power_truncates_exponent() {
        let vars = make_vars(&[]);
        assert_eq!(evaluate("2 ^ 3", &vars).unwrap(), 8.0);
        assert_eq!(evaluate("2 ^ 3.9", &vars).unwrap(), 8.0);
        assert!(evaluate("2 ^ -2", &vars).is_err());
        assert_eq!(evaluate("2 ^ (-2)", &vars).unwrap(), 0.25);
        assert_eq!(evaluate("5 ^ 0", &vars).unwrap(), 1.0);
        assert_eq!(evaluate("0 ^ (-1)", &vars), Err(FormulaError::DivisionByZero));
        assert_eq!(evaluate("10 ^ 40", &vars), Err(FormulaError::Overflow));
    }

    #[test]
    fn test_leading_negation() {
        let vars = make_vars(&[("kpi.a.val", 3.0)]);
        assert_eq!(evaluate("-kpi.a.val * 2", &vars).unwrap(), -6.0);
        assert_eq!(evaluate("-2 ^ 2", &vars).unwrap(), -4.0);
        assert_eq!(evaluate("(-2) ^ 2", &vars).unwrap(), 4.0);
    }

    #[test]
    fn test_missing_operand() {
        let vars = make_values(&[("kpi.a.val", 10.0)]);
        assert_eq!(
            evaluate("kpi.a.val + kpi.b.val", &vars),
            Err(FormulaError::MissingOperand("kpi.b.val".to_string()))
        );
    }

    #[test]
    fn test_non_good_operand_is_missing() {
        let mut vars = make_values(&[("kpi.a.val", 10.0)]);
        let id = MetricId::new("kpi.b.val");
        vars.insert(
            id.clone(),
            MetricValue::good(id.clone(), 5.0, "").with_quality(Quality::Warning),
        );
        assert_eq!(
            evaluate("kpi.a.val + kpi.b.val", &vars),
            Err(FormulaError::MissingOperand("kpi.b.val".to_string()))
        );
    }

    #[test]
    fn test_deterministic() {
        let vars = make_vars(&[("kpi.a.val", 7.3), ("kpi.b.val", 1.9)]);
        let formula = "(kpi.a.val / kpi.b.val) ^ 2 - log(kpi.a.val) + exp(1)";
        let first = evaluate(formula, &vars).unwrap();
        for _ in 0..10 {
            assert_eq!(evaluate(formula, &vars).unwrap().to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_cjk_identifiers() {
        let vars = make_vars(&[
            ("中压拓扑.拓扑不一致.数量", 5.0),
            ("中压拓扑.配变统计.配变总数", 200.0),
        ]);
        let result = evaluate(
            "(1 - 中压拓扑.拓扑不一致.数量 / 中压拓扑.配变统计.配变总数) * 100",
            &vars,
        )
        .unwrap();
        assert_eq!(result, 97.5);
    }

    #[test]
    fn test_whitespace_insignificant() {
        let vars = make_vars(&[("kpi.a.val", 6.0)]);
        assert_eq!(
            evaluate("  max ( kpi.a.val ,\t2 )*3", &vars).unwrap(),
            evaluate("max(kpi.a.val,2)*3", &vars).unwrap()
        );
    }
}
