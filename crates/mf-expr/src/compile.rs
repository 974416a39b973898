//! Compilation of expression trees into slot-indexed evaluators.
//!
//! A `Scope` fixes the mapping from names to value slots. Compiling an
//! `Expr` resolves every symbol to its slot once, so evaluation is a plain
//! tree walk over a `&[f64]` with no string lookups.

use std::collections::HashMap;

use crate::ast::{BinOp, Expr, Func};
use crate::error::{ExprError, ExprResult};

/// Ordered set of names that an evaluator may reference.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: Vec<String>,
    slots: HashMap<String, usize>,
}

impl Scope {
    /// Build a scope; slot order is iteration order. Names must be distinct.
    pub fn new<I, S>(names: I) -> ExprResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope = Scope::default();
        for name in names {
            let name = name.into();
            if scope.slots.contains_key(&name) {
                return Err(ExprError::DuplicateName { name });
            }
            scope.slots.insert(name.clone(), scope.names.len());
            scope.names.push(name);
        }
        Ok(scope)
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    Slot(usize),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

impl Node {
    fn eval(&self, values: &[f64]) -> f64 {
        match self {
            Node::Const(v) => *v,
            Node::Slot(i) => values[*i],
            Node::Neg(inner) => -inner.eval(values),
            Node::Binary(op, lhs, rhs) => op.apply(lhs.eval(values), rhs.eval(values)),
            Node::Call(func, args) => match args.as_slice() {
                [a] => func.apply(&[a.eval(values)]),
                [a, b] => func.apply(&[a.eval(values), b.eval(values)]),
                _ => {
                    let evaluated: Vec<f64> = args.iter().map(|a| a.eval(values)).collect();
                    func.apply(&evaluated)
                }
            },
        }
    }
}

/// Compiled, evaluable form of an expression bound to a `Scope` layout.
#[derive(Debug, Clone)]
pub struct Evaluator {
    root: Node,
    width: usize,
    /// (slot, name) for every distinct symbol the expression references.
    referenced: Vec<(usize, String)>,
}

impl Evaluator {
    /// Evaluate with one value per scope slot, in scope order.
    pub fn eval(&self, values: &[f64]) -> ExprResult<f64> {
        if values.len() != self.width {
            return Err(ExprError::ScopeMismatch {
                expected: self.width,
                actual: values.len(),
            });
        }
        Ok(self.root.eval(values))
    }

    /// Evaluate against a name → value map.
    ///
    /// Every referenced name must be present; a missing one is an
    /// `UndefinedSymbol` error, never a silent zero.
    pub fn eval_named(&self, vars: &HashMap<String, f64>) -> ExprResult<f64> {
        let mut values = vec![f64::NAN; self.width];
        for (slot, name) in &self.referenced {
            let value = vars
                .get(name)
                .ok_or_else(|| ExprError::UndefinedSymbol { name: name.clone() })?;
            values[*slot] = *value;
        }
        Ok(self.root.eval(&values))
    }

    /// Names this evaluator reads.
    pub fn referenced(&self) -> impl Iterator<Item = &str> {
        self.referenced.iter().map(|(_, name)| name.as_str())
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl Expr {
    /// Resolve every symbol against `scope` and produce an evaluator.
    pub fn compile(&self, scope: &Scope) -> ExprResult<Evaluator> {
        let mut referenced = Vec::new();
        let root = lower(self, scope, &mut referenced)?;
        Ok(Evaluator {
            root,
            width: scope.len(),
            referenced,
        })
    }
}

fn lower(expr: &Expr, scope: &Scope, referenced: &mut Vec<(usize, String)>) -> ExprResult<Node> {
    let node = match expr {
        Expr::Num(v) => Node::Const(*v),
        Expr::Sym(name) => {
            let slot = scope
                .slot(name)
                .ok_or_else(|| ExprError::UndefinedSymbol { name: name.clone() })?;
            if !referenced.iter().any(|(s, _)| *s == slot) {
                referenced.push((slot, name.clone()));
            }
            Node::Slot(slot)
        }
        Expr::Neg(inner) => Node::Neg(Box::new(lower(inner, scope, referenced)?)),
        Expr::Binary { op, lhs, rhs } => Node::Binary(
            *op,
            Box::new(lower(lhs, scope, referenced)?),
            Box::new(lower(rhs, scope, referenced)?),
        ),
        Expr::Call { func, args } if args.len() != func.arity() => {
            return Err(ExprError::CallArity {
                func: func.name(),
                expected: func.arity(),
                actual: args.len(),
            });
        }
        Expr::Call { func, args } => Node::Call(
            *func,
            args.iter()
                .map(|a| lower(a, scope, referenced))
                .collect::<ExprResult<Vec<_>>>()?,
        ),
    };
    Ok(node)
}
