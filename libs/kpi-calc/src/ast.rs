//! Abstract syntax tree for formula expressions

use std::collections::BTreeSet;
use std::fmt;

use kpi_model::MetricId;
use rust_decimal::Decimal;

use crate::functions::Function;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

/// Expression nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(Decimal),
    /// Metric reference, substituted with the metric's value
    Metric(MetricId),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Built-in function call (e.g., `max(a, b)`)
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn number(n: impl Into<Decimal>) -> Self {
        Expr::Number(n.into())
    }

    pub fn metric(id: impl Into<MetricId>) -> Self {
        Expr::Metric(id.into())
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(function: Function, args: Vec<Expr>) -> Self {
        Expr::Call { function, args }
    }

    /// All metric identifiers referenced by the expression, deduplicated
    pub fn identifiers(&self) -> BTreeSet<MetricId> {
        let mut ids = BTreeSet::new();
        self.collect_identifiers(&mut ids);
        ids
    }

    fn collect_identifiers(&self, ids: &mut BTreeSet<MetricId>) {
        match self {
            Expr::Number(_) => {},
            Expr::Metric(id) => {
                ids.insert(id.clone());
            },
            Expr::Unary { expr, .. } => expr.collect_identifiers(ids),
            Expr::Binary { left, right, .. } => {
                left.collect_identifiers(ids);
                right.collect_identifiers(ids);
            },
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_identifiers(ids);
                }
            },
        }
    }
}

/// Fully parenthesized rendering, useful in logs
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Metric(id) => write!(f, "{}", id),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Neg => write!(f, "(-{})", expr),
                UnaryOp::Plus => write!(f, "{}", expr),
            },
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            },
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_deduplicated() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::metric("a.b.c"),
            Expr::call(
                Function::Max,
                vec![Expr::metric("a.b.c"), Expr::metric("a.b.d")],
            ),
        );
        let ids: Vec<String> = expr.identifiers().iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, vec!["a.b.c", "a.b.d"]);
    }

    #[test]
    fn test_display() {
        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::unary(UnaryOp::Neg, Expr::number(2)),
            Expr::call(Function::Abs, vec![Expr::metric("a.b.c")]),
        );
        assert_eq!(expr.to_string(), "((-2) * abs(a.b.c))");
    }
}
