//! Owned expression trees.
//!
//! Every node owns its children (`Box`/`Vec`), so `Clone` is a full deep
//! copy: a cloned tree shares no node with its source and can be renamed
//! in place without touching the original.

use std::collections::HashMap;
use std::fmt;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "^",
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div => lhs / rhs,
            BinOp::Pow => lhs.powf(rhs),
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => PREC_SUM,
            BinOp::Mul | BinOp::Div => PREC_PRODUCT,
            BinOp::Pow => PREC_POWER,
        }
    }
}

/// Built-in functions callable from rule text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Tan,
    Min,
    Max,
    Pow,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "exp" => Func::Exp,
            "ln" | "log" => Func::Ln,
            "log10" => Func::Log10,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "min" => Func::Min,
            "max" => Func::Max,
            "pow" => Func::Pow,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Exp => "exp",
            Func::Ln => "ln",
            Func::Log10 => "log10",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Min => "min",
            Func::Max => "max",
            Func::Pow => "pow",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max | Func::Pow => 2,
            _ => 1,
        }
    }

    /// Apply to already-evaluated arguments. `args.len()` equals `arity()`.
    pub fn apply(self, args: &[f64]) -> f64 {
        match self {
            Func::Exp => args[0].exp(),
            Func::Ln => args[0].ln(),
            Func::Log10 => args[0].log10(),
            Func::Sqrt => args[0].sqrt(),
            Func::Abs => args[0].abs(),
            Func::Sin => args[0].sin(),
            Func::Cos => args[0].cos(),
            Func::Tan => args[0].tan(),
            Func::Min => args[0].min(args[1]),
            Func::Max => args[0].max(args[1]),
            Func::Pow => args[0].powf(args[1]),
        }
    }
}

const PREC_SUM: u8 = 1;
const PREC_PRODUCT: u8 = 2;
const PREC_UNARY: u8 = 3;
const PREC_POWER: u8 = 4;
const PREC_ATOM: u8 = 5;

/// Expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Num(f64),
    /// Reference to a named symbol (species, parameter or template-local name).
    Sym(String),
    /// Unary negation.
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn zero() -> Self {
        Expr::Num(0.0)
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Expr::Sym(name.into())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Additive node `lhs + rhs`.
    pub fn sum(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Add, lhs, rhs)
    }

    /// Name of this node if it is a symbol reference.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Sym(name) => Some(name),
            _ => None,
        }
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Num(_) | Expr::Sym(_) => {}
            Expr::Neg(inner) => inner.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }

    /// Pre-order traversal with mutable access to every node.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Expr)) {
        visit(self);
        match self {
            Expr::Num(_) | Expr::Sym(_) => {}
            Expr::Neg(inner) => inner.walk_mut(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk_mut(visit);
                rhs.walk_mut(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk_mut(visit);
                }
            }
        }
    }

    /// Collect every node matching `predicate`, in pre-order.
    pub fn filter(&self, mut predicate: impl FnMut(&Expr) -> bool) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if predicate(node) {
                out.push(node);
            }
        });
        out
    }

    /// Distinct symbol names in first-seen (pre-order, left to right) order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for node in self.filter(|n| matches!(n, Expr::Sym(_))) {
            if let Some(name) = node.as_symbol() {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        out
    }

    /// Rename, in place, every symbol whose name is a key of `table`.
    ///
    /// Symbols not in the table and numeric literals are left untouched.
    /// Returns the number of nodes rewritten.
    pub fn rename_symbols(&mut self, table: &HashMap<String, String>) -> usize {
        let mut renamed = 0;
        self.walk_mut(&mut |node| {
            if let Expr::Sym(name) = node {
                if let Some(target) = table.get(name.as_str()) {
                    *name = target.clone();
                    renamed += 1;
                }
            }
        });
        renamed
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(v) if *v < 0.0 => PREC_UNARY,
            Expr::Num(_) | Expr::Sym(_) | Expr::Call { .. } => PREC_ATOM,
            Expr::Neg(_) => PREC_UNARY,
            Expr::Binary { op, .. } => op.precedence(),
        }
    }
}

fn write_child(f: &mut fmt::Formatter<'_>, child: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(v) => write!(f, "{v}"),
            Expr::Sym(name) => f.write_str(name),
            Expr::Neg(inner) => {
                f.write_str("-")?;
                write_child(f, inner, inner.precedence() < PREC_UNARY)
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                if *op == BinOp::Pow {
                    // right-associative
                    write_child(f, lhs, lhs.precedence() <= prec)?;
                    f.write_str("^")?;
                    write_child(f, rhs, rhs.precedence() < prec)
                } else {
                    write_child(f, lhs, lhs.precedence() < prec)?;
                    write!(f, " {} ", op.symbol())?;
                    write_child(f, rhs, rhs.precedence() <= prec)
                }
            }
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
