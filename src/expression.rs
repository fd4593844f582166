use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One-argument functions known to the generator library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Reciprocal,
    Sqrt,
    Exp,
    Log,
    Abs,
    Sign,
    Floor,
    Ceil,
    Sin,
    Cos,
    Tan,
    Atan,
}

/// Two-argument functions known to the generator library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Plus,
    Minus,
    Mult,
    Div,
    Pow,
    Min,
    Max,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 12] = [
        UnaryOp::Reciprocal,
        UnaryOp::Sqrt,
        UnaryOp::Exp,
        UnaryOp::Log,
        UnaryOp::Abs,
        UnaryOp::Sign,
        UnaryOp::Floor,
        UnaryOp::Ceil,
        UnaryOp::Sin,
        UnaryOp::Cos,
        UnaryOp::Tan,
        UnaryOp::Atan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Reciprocal => "1/",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Abs => "abs",
            UnaryOp::Sign => "sgn",
            UnaryOp::Floor => "floor",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Atan => "atan",
        }
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            UnaryOp::Reciprocal => 1.0 / x,
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sign => {
                if x.is_nan() {
                    f64::NAN
                } else if x == 0.0 {
                    0.0
                } else {
                    x.signum()
                }
            }
            UnaryOp::Floor => x.floor(),
            UnaryOp::Ceil => x.ceil(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Atan => x.atan(),
        }
    }
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 7] = [
        BinaryOp::Plus,
        BinaryOp::Minus,
        BinaryOp::Mult,
        BinaryOp::Div,
        BinaryOp::Pow,
        BinaryOp::Min,
        BinaryOp::Max,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Mult => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "pow",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }

    /// Whether the function is written between its arguments
    pub fn is_infix(&self) -> bool {
        matches!(self, BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Mult | BinaryOp::Div)
    }

    /// Whether swapping the inputs can change the result
    pub fn is_commutative(&self) -> bool {
        matches!(self, BinaryOp::Plus | BinaryOp::Mult | BinaryOp::Min | BinaryOp::Max)
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Plus => a + b,
            BinaryOp::Minus => a - b,
            BinaryOp::Mult => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }
}

/// Construction expression of a feature.
///
/// Original features are a bare [`Expr::Attribute`]; every synthesized feature
/// records the full tree it was computed from so it can be re-evaluated
/// against any other set of base values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Attribute(String),
    Constant(f64),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn attribute(name: &str) -> Expr {
        Expr::Attribute(name.to_string())
    }

    pub fn unary(op: UnaryOp, arg: Expr) -> Expr {
        Expr::Unary(op, Box::new(arg))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    /// True for original (non-constructed) features
    pub fn is_simple(&self) -> bool {
        matches!(self, Expr::Attribute(_))
    }

    /// Names of the original features the expression is built from
    pub fn base_attributes(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_attributes(&mut names);
        names
    }

    fn collect_attributes<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Attribute(name) => {
                names.insert(name.as_str());
            }
            Expr::Constant(_) => {}
            Expr::Unary(_, arg) => arg.collect_attributes(names),
            Expr::Binary(_, l, r) => {
                l.collect_attributes(names);
                r.collect_attributes(names);
            }
        }
    }

    /// Evaluates the expression for one row, `None` when a base attribute is unknown.
    pub fn eval_row<F>(&self, lookup: &F) -> Option<f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Attribute(name) => lookup(name),
            Expr::Constant(c) => Some(*c),
            Expr::Unary(op, arg) => arg.eval_row(lookup).map(|x| op.apply(x)),
            Expr::Binary(op, l, r) => {
                let a = l.eval_row(lookup)?;
                let b = r.eval_row(lookup)?;
                Some(op.apply(a, b))
            }
        }
    }

    /// Evaluates the expression over whole columns of base values.
    pub fn evaluate(&self, base: &BTreeMap<String, Vec<f64>>, rows: usize) -> Result<Vec<f64>, GenerationError> {
        for name in self.base_attributes() {
            match base.get(name) {
                Some(column) if column.len() == rows => {}
                _ => {
                    return Err(GenerationError::DegenerateSample(format!(
                        "no values for base feature {}",
                        name
                    )))
                }
            }
        }
        Ok((0..rows)
            .map(|row| {
                self.eval_row(&|name: &str| base.get(name).map(|c| c[row]))
                    .unwrap_or(f64::NAN)
            })
            .collect())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Attribute(name) => write!(f, "{}", name),
            Expr::Constant(c) => write!(f, "{}", c),
            Expr::Unary(UnaryOp::Reciprocal, arg) => write!(f, "1/({})", arg),
            Expr::Unary(op, arg) => write!(f, "{}({})", op.name(), arg),
            Expr::Binary(op, l, r) if op.is_infix() => write!(f, "({}){}({})", l, op.name(), r),
            Expr::Binary(op, l, r) => write!(f, "{}({},{})", op.name(), l, r),
        }
    }
}
