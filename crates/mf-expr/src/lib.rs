//! mf-expr: symbolic expression trees for rate-law terms.
//!
//! Provides:
//! - Tokenizer and Pratt parser for infix arithmetic (`-k * a`, `vmax * s / (km + s)`)
//! - Owned expression trees (`Expr`) with symbol scanning, filtering and in-place renaming
//! - Compilation against a named `Scope` into a slot-indexed `Evaluator`
//!
//! This is not a computer-algebra system: there is no simplification or
//! differentiation, only the operations needed to substitute symbols and
//! sum terms.
//!
//! # Example
//!
//! ```
//! use mf_expr::{parse, Scope};
//!
//! let expr = parse("-k * a").unwrap();
//! let scope = Scope::new(["a", "k"]).unwrap();
//! let eval = expr.compile(&scope).unwrap();
//! assert_eq!(eval.eval(&[2.0, 0.5]).unwrap(), -1.0);
//! ```

pub mod ast;
pub mod compile;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{BinOp, Expr, Func};
pub use compile::{Evaluator, Scope};
pub use error::{ExprError, ExprResult};
pub use parser::parse;
