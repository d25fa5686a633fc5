#![forbid(unsafe_code)]

//! Expression model for the symbolic execution engine.
//!
//! Programs are built directly as [`Expr`] trees; there is no concrete syntax.
//! Statements and expressions share one closed sum type so every analysis is an
//! exhaustive `match`.

use std::fmt;

use serde::{Deserialize, Serialize};

mod scope;

pub use scope::NegateError;

/// A program variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// A placeholder for an unknown program input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbolic(pub String);

impl Symbolic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,

    Eq,
    Ne,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne)
    }

    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Mul => 3,
            BinOp::Add | BinOp::Sub => 2,
            BinOp::Eq | BinOp::Ne => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Const(i64),
    Var(Var),
    Symbolic(Symbolic),
    /// Binds `target` for the remainder of the enclosing sequence.
    Let {
        target: Var,
        value: Box<Expr>,
    },
    /// Sequential composition. Blocks are not scoping barriers: a `Let` inside
    /// a block stays visible to the statements that follow the block.
    Block(Vec<Expr>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assert(Box<Expr>),
}

impl Expr {
    pub fn constant(n: i64) -> Self {
        Expr::Const(n)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(Var::new(name))
    }

    pub fn symbolic(name: impl Into<String>) -> Self {
        Expr::Symbolic(Symbolic::new(name))
    }

    /// `name = value`
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Expr::Let {
            target: Var::new(name),
            value: Box::new(value),
        }
    }

    pub fn block(stmts: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Block(stmts.into_iter().collect())
    }

    pub fn if_then(cond: Expr, then_branch: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: None,
        }
    }

    pub fn if_else(cond: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::Add, left, right)
    }

    pub fn sub(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::Sub, left, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::Mul, left, right)
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::Eq, left, right)
    }

    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::binary(BinOp::Ne, left, right)
    }

    pub fn assert(constraint: Expr) -> Self {
        Expr::Assert(Box::new(constraint))
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Expr::Const(n) => Some(*n),
            _ => None,
        }
    }

    /// Splits an `==`/`!=` node into its operator and operands.
    pub fn as_comparison(&self) -> Option<(BinOp, &Expr, &Expr)> {
        match self {
            Expr::Binary { op, left, right } if op.is_comparison() => Some((*op, left, right)),
            _ => None,
        }
    }

    /// Short variant name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Const(_) => "constant",
            Expr::Var(_) => "variable",
            Expr::Symbolic(_) => "symbolic value",
            Expr::Let { .. } => "let binding",
            Expr::Block(_) => "block",
            Expr::If { .. } => "if",
            Expr::Binary { op, .. } if op.is_comparison() => "comparison",
            Expr::Binary { .. } => "arithmetic expression",
            Expr::Assert(_) => "assert",
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Symbolic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(n) => write!(f, "{n}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Symbolic(s) => write!(f, "{s}"),
            Expr::Let { target, value } => write!(f, "{target} = {value}"),
            Expr::Block(stmts) => {
                if stmts.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, s) in stmts.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{s}")?;
                }
                f.write_str(" }")
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                write!(f, "if {cond} ")?;
                write_braced(f, then_branch)?;
                if let Some(e) = else_branch {
                    f.write_str(" else ")?;
                    write_braced(f, e)?;
                }
                Ok(())
            }
            Expr::Binary { op, left, right } => {
                write_operand(f, left, op.precedence(), false)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, op.precedence(), true)
            }
            Expr::Assert(c) => write!(f, "assert({c})"),
        }
    }
}

fn write_braced(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match e {
        Expr::Block(_) => write!(f, "{e}"),
        _ => write!(f, "{{ {e} }}"),
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr, parent: u8, right: bool) -> fmt::Result {
    let needs_parens = match e {
        Expr::Binary { op, .. } => {
            let p = op.precedence();
            p < parent || (right && p == parent)
        }
        Expr::Let { .. } | Expr::If { .. } => true,
        _ => false,
    };
    if needs_parens {
        write!(f, "({e})")
    } else {
        write!(f, "{e}")
    }
}
